//! Domain types: the forecast as fetched and the reading as persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One forecast record as returned by the weather API.
///
/// The upstream serializer is case-insensitive about property names. serde
/// matches exact names only, so the aliases cover the lowercase, PascalCase,
/// and all-caps spellings. A `Default` value is the "no data" record the
/// fetch path returns for empty responses.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Forecast {
    #[serde(default, alias = "Latitude", alias = "LATITUDE")]
    pub latitude: f64,
    #[serde(default, alias = "Longitude", alias = "LONGITUDE")]
    pub longitude: f64,
    #[serde(default, alias = "Hourly", alias = "HOURLY")]
    pub hourly: Option<Hourly>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Hourly {
    #[serde(default, alias = "Time", alias = "TIME")]
    pub time: Vec<String>,
    #[serde(
        default,
        rename = "temperature2m",
        alias = "Temperature2m",
        alias = "TEMPERATURE2M",
        alias = "temperature_2m"
    )]
    pub temperature_2m: Vec<f64>,
}

impl Forecast {
    /// Returns the first (time, temperature) pair when the hourly series is
    /// usable: both vectors non-empty and of equal length. Anything else is
    /// treated as a record with no data point.
    pub fn first_reading(&self) -> Option<(&str, f64)> {
        let hourly = self.hourly.as_ref()?;
        if hourly.time.is_empty() || hourly.time.len() != hourly.temperature_2m.len() {
            return None;
        }
        Some((hourly.time[0].as_str(), hourly.temperature_2m[0]))
    }
}

/// One row persisted per successful poll cycle. Immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    /// UTC date of the write, `YYYYMMDD`. Groups rows by day.
    pub partition_key: String,
    /// Freshly generated UUID, unique within the partition.
    pub row_key: String,
    pub recorded_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub forecast_time: String,
    pub temperature: f64,
}

impl Reading {
    /// Derives the persisted row from a forecast, or `None` when the forecast
    /// carries no usable data point.
    pub fn from_forecast(forecast: &Forecast) -> Option<Self> {
        let (forecast_time, temperature) = forecast.first_reading()?;
        let now = Utc::now();
        Some(Self {
            partition_key: now.format("%Y%m%d").to_string(),
            row_key: Uuid::new_v4().to_string(),
            recorded_at: now,
            latitude: forecast.latitude,
            longitude: forecast.longitude,
            forecast_time: forecast_time.to_string(),
            temperature,
        })
    }
}
