//! Environment-backed runtime settings.
//!
//! Everything is read once at startup (after `dotenvy` has loaded `.env`).
//! Optional values stay `Option` so each poll cycle can report exactly which
//! setting is missing instead of failing at boot.

use std::env;

/// KV v2 mount the application secrets live under.
pub const SECRET_MOUNT: &str = "secret";
/// Logical path holding both application secrets.
pub const SECRET_PATH: &str = "myweatherapp";
/// Key of the OAuth client secret under [`SECRET_PATH`].
pub const CLIENT_SECRET_KEY: &str = "Auth0ClientSecret";
/// Key of the table-store connection string under [`SECRET_PATH`].
pub const STORAGE_SECRET_KEY: &str = "StorageConnectionString";

const DEFAULT_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_VAULT_ADDR: &str = "http://localhost:8200";
const DEFAULT_VAULT_TOKEN: &str = "myroot";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Seconds between poll cycles.
    pub interval_seconds: u64,
    /// Forecast API endpoint, queried with a bearer token.
    pub weather_api_url: Option<String>,
    /// Token-endpoint domain (`https://{domain}/oauth/token`).
    pub auth_domain: Option<String>,
    pub auth_client_id: Option<String>,
    pub auth_audience: Option<String>,
    /// Name of the table readings are persisted into.
    pub table_name: Option<String>,
    /// Secret-store address and bootstrap token. These default to the local
    /// development endpoint so a bare checkout runs against a dev Vault.
    pub vault_addr: String,
    pub vault_token: String,
}

impl Settings {
    /// Reads all recognized variables from the process environment.
    pub fn from_env() -> Self {
        let interval_seconds = env::var("POLL_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_INTERVAL_SECONDS);

        Self {
            interval_seconds,
            weather_api_url: non_empty(env::var("WEATHER_API_URL").ok()),
            auth_domain: non_empty(env::var("AUTH0_DOMAIN").ok()),
            auth_client_id: non_empty(env::var("AUTH0_CLIENT_ID").ok()),
            auth_audience: non_empty(env::var("AUTH0_AUDIENCE").ok()),
            table_name: non_empty(env::var("STORAGE_TABLE_NAME").ok()),
            vault_addr: env::var("VAULT_ADDR")
                .unwrap_or_else(|_| DEFAULT_VAULT_ADDR.to_string()),
            vault_token: env::var("VAULT_TOKEN")
                .unwrap_or_else(|_| DEFAULT_VAULT_TOKEN.to_string()),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            weather_api_url: None,
            auth_domain: None,
            auth_client_id: None,
            auth_audience: None,
            table_name: None,
            vault_addr: DEFAULT_VAULT_ADDR.to_string(),
            vault_token: DEFAULT_VAULT_TOKEN.to_string(),
        }
    }
}

/// Treats empty strings the same as unset variables.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
