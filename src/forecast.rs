//! Forecast acquisition: client-credentials token exchange followed by an
//! authenticated GET against the forecast API.
//!
//! The token is re-acquired on every cycle. There is deliberately no caching
//! or expiry tracking; a cycle either gets a fresh token or fails.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{CLIENT_SECRET_KEY, SECRET_PATH, Settings};
use crate::error::CycleError;
use crate::model::Forecast;
use crate::secrets::SecretStore;

/// Source of forecast records, one per poll cycle.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch(&self) -> Result<Forecast, CycleError>;
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    audience: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

pub struct ForecastClient {
    client: reqwest::Client,
    settings: Arc<Settings>,
    secrets: Arc<dyn SecretStore>,
}

impl ForecastClient {
    pub fn new(settings: Arc<Settings>, secrets: Arc<dyn SecretStore>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            settings,
            secrets,
        })
    }

    /// Trades the configured client id/secret for a bearer token.
    ///
    /// All four inputs (domain, client id, audience, client secret) must be
    /// present before any request goes out; a missing one is an auth failure
    /// for the cycle, not a transport error.
    async fn exchange_token(&self) -> Result<String, CycleError> {
        let domain = self
            .settings
            .auth_domain
            .as_deref()
            .ok_or_else(|| CycleError::Auth("AUTH0_DOMAIN is not configured".to_string()))?;
        let client_id = self
            .settings
            .auth_client_id
            .as_deref()
            .ok_or_else(|| CycleError::Auth("AUTH0_CLIENT_ID is not configured".to_string()))?;
        let audience = self
            .settings
            .auth_audience
            .as_deref()
            .ok_or_else(|| CycleError::Auth("AUTH0_AUDIENCE is not configured".to_string()))?;

        let client_secret = self
            .secrets
            .get_secret(SECRET_PATH, CLIENT_SECRET_KEY)
            .await
            .ok_or_else(|| {
                CycleError::Auth(format!(
                    "client secret missing at {SECRET_PATH}/{CLIENT_SECRET_KEY}"
                ))
            })?;

        // Plain domains get the conventional https token URL; a domain that
        // already carries a scheme is used as the base verbatim.
        let token_url = if domain.contains("://") {
            format!("{domain}/oauth/token")
        } else {
            format!("https://{domain}/oauth/token")
        };

        debug!(%token_url, audience, "Requesting access token");

        let response = self
            .client
            .post(&token_url)
            .json(&TokenRequest {
                grant_type: "client_credentials",
                client_id,
                client_secret: &client_secret,
                audience,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Token exchange rejected");
            return Err(CycleError::http(status, "token endpoint"));
        }

        let token: TokenResponse = serde_json::from_str(&response.text().await?)?;
        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CycleError::Auth("token response has no access_token".to_string()))
    }
}

#[async_trait]
impl ForecastSource for ForecastClient {
    async fn fetch(&self) -> Result<Forecast, CycleError> {
        let token = self.exchange_token().await?;

        let api_url = self
            .settings
            .weather_api_url
            .as_deref()
            .ok_or_else(|| CycleError::Config("WEATHER_API_URL".to_string()))?;

        info!(api_url, "Fetching forecast");

        let response = self
            .client
            .get(api_url)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CycleError::http(status, "forecast API"));
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            warn!("Forecast API returned an empty body");
            return Ok(Forecast::default());
        }

        // The upstream serializer may emit a literal `null` for "no data";
        // it means the same thing as an empty array.
        let forecasts: Option<Vec<Forecast>> = serde_json::from_str(&body)?;
        let mut forecasts = forecasts.unwrap_or_default();
        if forecasts.is_empty() {
            warn!("No forecast records in API response");
            return Ok(Forecast::default());
        }

        // Only the first record matters; the API may return several.
        Ok(forecasts.swap_remove(0))
    }
}
