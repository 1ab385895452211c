//! Table-store seam and its DynamoDB implementation.
//!
//! [`TableStore`] is the write-side trait: insert one [`Reading`] keyed by
//! `(partition_key, row_key)`. [`TableConnector`] constructs a store from a
//! connection string and performs the idempotent table create, so the
//! persistence handler can stay ignorant of the backend wiring.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::Reading;

#[derive(Error, Debug)]
pub enum TableError {
    /// A row with the same composite key already exists. Practically
    /// unreachable with random row keys, handled anyway.
    #[error("row already exists")]
    Conflict,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Durable key-value table holding one row per persisted reading.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn insert(&self, reading: &Reading) -> Result<(), TableError>;
}

/// Builds a ready-to-use [`TableStore`], ensuring the target table exists.
#[async_trait]
pub trait TableConnector: Send + Sync {
    async fn connect(
        &self,
        connection_string: &str,
        table_name: &str,
    ) -> Result<std::sync::Arc<dyn TableStore>>;
}

/// `Key=Value` pairs separated by `;`, e.g.
/// `Region=eu-central-1;AccessKeyId=AKIA..;SecretAccessKey=..;Endpoint=http://localhost:8000`.
///
/// Explicit keys take precedence; anything omitted falls back to the ambient
/// AWS configuration (env vars, instance profile).
#[derive(Debug, Default, PartialEq)]
pub struct ConnectionString {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint: Option<String>,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parsed = Self::default();
        for segment in raw.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment
                .split_once('=')
                .with_context(|| format!("connection string segment '{segment}' has no '='"))?;
            match key.trim() {
                "Region" => parsed.region = Some(value.trim().to_string()),
                "AccessKeyId" => parsed.access_key_id = Some(value.trim().to_string()),
                "SecretAccessKey" => parsed.secret_access_key = Some(value.trim().to_string()),
                "Endpoint" => parsed.endpoint = Some(value.trim().to_string()),
                other => debug!(key = other, "Ignoring unknown connection string key"),
            }
        }
        Ok(parsed)
    }
}

/// DynamoDB-backed table store.
pub struct DynamoTable {
    client: Client,
    table: String,
}

impl DynamoTable {
    async fn client_from(conn: &ConnectionString) -> Result<Client> {
        if let (Some(access_key), Some(secret_key)) =
            (conn.access_key_id.as_deref(), conn.secret_access_key.as_deref())
        {
            let mut builder = aws_sdk_dynamodb::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new(
                    conn.region.clone().unwrap_or_else(|| "us-east-1".to_string()),
                ))
                .credentials_provider(Credentials::new(
                    access_key,
                    secret_key,
                    None,
                    None,
                    "connection-string",
                ));
            if let Some(endpoint) = &conn.endpoint {
                builder = builder.endpoint_url(endpoint);
            }
            return Ok(Client::from_conf(builder.build()));
        }

        // No explicit keys: lean on the ambient AWS configuration and only
        // apply the overrides the connection string carries.
        let sdk_config = aws_config::load_from_env().await;
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(region) = &conn.region {
            builder = builder.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &conn.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        Ok(Client::from_conf(builder.build()))
    }

    /// Creates the table with the composite `(partition_key, row_key)` schema,
    /// treating "already exists" as success.
    async fn ensure_table(client: &Client, table: &str) -> Result<()> {
        let result = client
            .create_table()
            .table_name(table)
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("partition_key")
                    .attribute_type(ScalarAttributeType::S)
                    .build()?,
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("row_key")
                    .attribute_type(ScalarAttributeType::S)
                    .build()?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("partition_key")
                    .key_type(KeyType::Hash)
                    .build()?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("row_key")
                    .key_type(KeyType::Range)
                    .build()?,
            )
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(table, "Table created");
                Ok(())
            }
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_resource_in_use_exception() {
                    debug!(table, "Table already exists");
                    Ok(())
                } else {
                    Err(anyhow::Error::new(service_err))
                        .with_context(|| format!("creating table '{table}'"))
                }
            }
        }
    }
}

#[async_trait]
impl TableStore for DynamoTable {
    async fn insert(&self, reading: &Reading) -> Result<(), TableError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table)
            .item("partition_key", AttributeValue::S(reading.partition_key.clone()))
            .item("row_key", AttributeValue::S(reading.row_key.clone()))
            .item("recorded_at", AttributeValue::S(reading.recorded_at.to_rfc3339()))
            .item("latitude", AttributeValue::N(reading.latitude.to_string()))
            .item("longitude", AttributeValue::N(reading.longitude.to_string()))
            .item("forecast_time", AttributeValue::S(reading.forecast_time.clone()))
            .item("temperature", AttributeValue::N(reading.temperature.to_string()))
            .condition_expression("attribute_not_exists(partition_key) AND attribute_not_exists(row_key)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_conditional_check_failed_exception() {
                    Err(TableError::Conflict)
                } else {
                    Err(TableError::Backend(anyhow::Error::new(service_err)))
                }
            }
        }
    }
}

/// Production [`TableConnector`] producing [`DynamoTable`] instances.
pub struct DynamoConnector;

#[async_trait]
impl TableConnector for DynamoConnector {
    async fn connect(
        &self,
        connection_string: &str,
        table_name: &str,
    ) -> Result<std::sync::Arc<dyn TableStore>> {
        let conn = ConnectionString::parse(connection_string)?;
        let client = DynamoTable::client_from(&conn).await?;
        DynamoTable::ensure_table(&client, table_name).await?;
        Ok(std::sync::Arc::new(DynamoTable {
            client,
            table: table_name.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_connection_string() {
        let conn = ConnectionString::parse(
            "Region=eu-central-1;AccessKeyId=AKIA123;SecretAccessKey=abc;Endpoint=http://localhost:8000",
        )
        .unwrap();
        assert_eq!(conn.region.as_deref(), Some("eu-central-1"));
        assert_eq!(conn.access_key_id.as_deref(), Some("AKIA123"));
        assert_eq!(conn.secret_access_key.as_deref(), Some("abc"));
        assert_eq!(conn.endpoint.as_deref(), Some("http://localhost:8000"));
    }

    #[test]
    fn test_parse_tolerates_whitespace_and_trailing_semicolon() {
        let conn = ConnectionString::parse(" Region = us-east-1 ; ").unwrap();
        assert_eq!(conn.region.as_deref(), Some("us-east-1"));
        assert!(conn.endpoint.is_none());
    }

    #[test]
    fn test_parse_ignores_unknown_keys() {
        let conn = ConnectionString::parse("Region=us-east-1;Flavor=vanilla").unwrap();
        assert_eq!(conn.region.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn test_parse_rejects_segment_without_equals() {
        assert!(ConnectionString::parse("Region").is_err());
    }

    #[test]
    fn test_parse_empty_string_is_all_defaults() {
        assert_eq!(ConnectionString::parse("").unwrap(), ConnectionString::default());
    }
}
