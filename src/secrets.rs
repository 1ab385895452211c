//! Secret resolution.
//!
//! [`SecretStore`] is the async trait for looking up a named secret value.
//! [`VaultStore`] implements it against the Vault KV v2 HTTP API. Values are
//! never cached: every call is one round-trip, so rotated secrets are picked
//! up on the next cycle.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::config::SECRET_MOUNT;

/// Resolves a `(path, key)` pair into a plaintext secret.
///
/// A missing key and a failed fetch both yield `None`; the caller decides
/// how severe an absent secret is.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, path: &str, key: &str) -> Option<String>;
}

/// KV v2 read payload: the secret map is nested one level down.
#[derive(Deserialize)]
struct KvReadResponse {
    data: KvReadData,
}

#[derive(Deserialize)]
struct KvReadData {
    data: HashMap<String, serde_json::Value>,
}

/// Vault-backed [`SecretStore`] using a bootstrap token.
pub struct VaultStore {
    client: reqwest::Client,
    addr: String,
    token: String,
}

impl VaultStore {
    pub fn new(addr: String, token: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            addr: addr.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn read_path(&self, path: &str) -> anyhow::Result<HashMap<String, serde_json::Value>> {
        let url = format!("{}/v1/{}/data/{}", self.addr, SECRET_MOUNT, path);

        let response = self
            .client
            .get(&url)
            .header("X-Vault-Token", &self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("vault returned status {} for '{}'", response.status(), path);
        }

        let body: KvReadResponse = response.json().await?;
        Ok(body.data.data)
    }
}

#[async_trait]
impl SecretStore for VaultStore {
    async fn get_secret(&self, path: &str, key: &str) -> Option<String> {
        match self.read_path(path).await {
            Ok(data) => data.get(key).map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            Err(e) => {
                warn!(path, key, error = %e, "Secret fetch failed");
                None
            }
        }
    }
}
