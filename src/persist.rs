//! Result handling: lazily initialize the table store, then write one
//! reading per cycle.
//!
//! Initialization is guarded so that concurrent callers construct the
//! backing client at most once per process: a fast read path when Ready,
//! and a double-checked async lock around the one-time setup. A failed
//! initialization leaves the state Uninitialized, so the next cycle simply
//! tries again.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{SECRET_PATH, STORAGE_SECRET_KEY, Settings};
use crate::model::{Forecast, Reading};
use crate::secrets::SecretStore;
use crate::table::{TableConnector, TableError, TableStore};

/// Consumer of per-cycle forecast results. All failures are absorbed here;
/// a poll cycle never fails because persistence did.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn handle(&self, forecast: &Forecast);
}

enum TableState {
    Uninitialized,
    Ready(Arc<dyn TableStore>),
}

pub struct ResultHandler {
    state: RwLock<TableState>,
    init_lock: Mutex<()>,
    settings: Arc<Settings>,
    secrets: Arc<dyn SecretStore>,
    connector: Arc<dyn TableConnector>,
}

impl ResultHandler {
    pub fn new(
        settings: Arc<Settings>,
        secrets: Arc<dyn SecretStore>,
        connector: Arc<dyn TableConnector>,
    ) -> Self {
        Self {
            state: RwLock::new(TableState::Uninitialized),
            init_lock: Mutex::new(()),
            settings,
            secrets,
            connector,
        }
    }

    /// Returns the shared store handle, constructing it on first use.
    ///
    /// First caller wins; everyone else waits on the lock and then finds the
    /// state Ready. Any failure aborts quietly and leaves initialization to
    /// a later call.
    async fn ensure_ready(&self) -> Option<Arc<dyn TableStore>> {
        if let TableState::Ready(store) = &*self.state.read() {
            return Some(store.clone());
        }

        let _guard = self.init_lock.lock().await;

        // A caller that held the lock before us may have finished the job.
        if let TableState::Ready(store) = &*self.state.read() {
            return Some(store.clone());
        }

        info!("Initializing table store");

        let Some(connection_string) = self
            .secrets
            .get_secret(SECRET_PATH, STORAGE_SECRET_KEY)
            .await
        else {
            error!(
                path = SECRET_PATH,
                key = STORAGE_SECRET_KEY,
                "Connection string not available from secret store"
            );
            return None;
        };

        let Some(table_name) = self.settings.table_name.as_deref() else {
            error!("STORAGE_TABLE_NAME is not configured");
            return None;
        };

        match self.connector.connect(&connection_string, table_name).await {
            Ok(store) => {
                info!(table_name, "Table store initialized");
                *self.state.write() = TableState::Ready(store.clone());
                Some(store)
            }
            Err(e) => {
                error!(table_name, error = %e, "Table store initialization failed");
                None
            }
        }
    }
}

#[async_trait]
impl ResultSink for ResultHandler {
    async fn handle(&self, forecast: &Forecast) {
        let Some(store) = self.ensure_ready().await else {
            error!("Skipping persistence, table store is unavailable");
            return;
        };

        let Some(reading) = Reading::from_forecast(forecast) else {
            warn!(
                latitude = forecast.latitude,
                longitude = forecast.longitude,
                "No usable data point in forecast, nothing persisted"
            );
            return;
        };

        info!(
            forecast_time = %reading.forecast_time,
            temperature = reading.temperature,
            "Next forecast data point"
        );

        // One attempt per cycle; the next cycle generates a fresh row key.
        match store.insert(&reading).await {
            Ok(()) => info!(
                partition_key = %reading.partition_key,
                row_key = %reading.row_key,
                "Reading persisted"
            ),
            Err(TableError::Conflict) => warn!(
                partition_key = %reading.partition_key,
                row_key = %reading.row_key,
                "Row already exists, skipping"
            ),
            Err(TableError::Backend(e)) => error!(error = %e, "Failed to persist reading"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Hourly;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticSecrets(Option<String>);

    #[async_trait]
    impl SecretStore for StaticSecrets {
        async fn get_secret(&self, _path: &str, _key: &str) -> Option<String> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        inserts: AtomicUsize,
        fail_with: std::sync::Mutex<Option<fn() -> TableError>>,
    }

    #[async_trait]
    impl TableStore for RecordingStore {
        async fn insert(&self, _reading: &Reading) -> Result<(), TableError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            match *self.fail_with.lock().unwrap() {
                Some(make_err) => Err(make_err()),
                None => Ok(()),
            }
        }
    }

    struct CountingConnector {
        connects: AtomicUsize,
        fail_first: usize,
        store: Arc<RecordingStore>,
    }

    impl CountingConnector {
        fn new(store: Arc<RecordingStore>) -> Self {
            Self {
                connects: AtomicUsize::new(0),
                fail_first: 0,
                store,
            }
        }

        fn failing_first(store: Arc<RecordingStore>, n: usize) -> Self {
            Self {
                connects: AtomicUsize::new(0),
                fail_first: n,
                store,
            }
        }
    }

    #[async_trait]
    impl TableConnector for CountingConnector {
        async fn connect(
            &self,
            _connection_string: &str,
            _table_name: &str,
        ) -> anyhow::Result<Arc<dyn TableStore>> {
            let attempt = self.connects.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                return Err(anyhow!("backend unreachable"));
            }
            Ok(self.store.clone())
        }
    }

    fn settings_with_table() -> Arc<Settings> {
        Arc::new(Settings {
            table_name: Some("readings".to_string()),
            ..Settings::default()
        })
    }

    fn usable_forecast() -> Forecast {
        Forecast {
            latitude: 52.52,
            longitude: 13.41,
            hourly: Some(Hourly {
                time: vec!["2024-01-01T00:00:00Z".to_string()],
                temperature_2m: vec![7.5],
            }),
        }
    }

    fn handler(connector: Arc<dyn TableConnector>) -> ResultHandler {
        ResultHandler::new(
            settings_with_table(),
            Arc::new(StaticSecrets(Some("Region=us-east-1".to_string()))),
            connector,
        )
    }

    #[tokio::test]
    async fn test_initializes_exactly_once_under_concurrency() {
        let store = Arc::new(RecordingStore::default());
        let connector = Arc::new(CountingConnector::new(store.clone()));
        let handler = Arc::new(handler(connector.clone()));

        let mut tasks = vec![];
        for _ in 0..16 {
            let handler = handler.clone();
            tasks.push(tokio::spawn(async move {
                handler.handle(&usable_forecast()).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(store.inserts.load(Ordering::SeqCst), 16);
    }

    #[tokio::test]
    async fn test_no_write_for_forecast_without_data() {
        let store = Arc::new(RecordingStore::default());
        let handler = handler(Arc::new(CountingConnector::new(store.clone())));

        handler.handle(&Forecast::default()).await;

        assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_write_for_mismatched_series() {
        let store = Arc::new(RecordingStore::default());
        let handler = handler(Arc::new(CountingConnector::new(store.clone())));

        let mut forecast = usable_forecast();
        forecast.hourly.as_mut().unwrap().temperature_2m.push(1.0);
        handler.handle(&forecast).await;

        assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_conflict_is_swallowed() {
        let store = Arc::new(RecordingStore::default());
        *store.fail_with.lock().unwrap() = Some(|| TableError::Conflict);
        let handler = handler(Arc::new(CountingConnector::new(store.clone())));

        // Must not panic or surface anything.
        handler.handle(&usable_forecast()).await;
        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backend_error_is_swallowed() {
        let store = Arc::new(RecordingStore::default());
        *store.fail_with.lock().unwrap() = Some(|| TableError::Backend(anyhow!("throttled")));
        let handler = handler(Arc::new(CountingConnector::new(store.clone())));

        handler.handle(&usable_forecast()).await;
        // One attempt, no retry within the cycle.
        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_connection_secret_skips_init() {
        let store = Arc::new(RecordingStore::default());
        let connector = Arc::new(CountingConnector::new(store.clone()));
        let handler = ResultHandler::new(
            settings_with_table(),
            Arc::new(StaticSecrets(None)),
            connector.clone(),
        );

        handler.handle(&usable_forecast()).await;

        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_table_name_skips_init() {
        let store = Arc::new(RecordingStore::default());
        let connector = Arc::new(CountingConnector::new(store.clone()));
        let handler = ResultHandler::new(
            Arc::new(Settings::default()),
            Arc::new(StaticSecrets(Some("Region=us-east-1".to_string()))),
            connector.clone(),
        );

        handler.handle(&usable_forecast()).await;

        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_init_is_retried_next_call() {
        let store = Arc::new(RecordingStore::default());
        let connector = Arc::new(CountingConnector::failing_first(store.clone(), 1));
        let handler = handler(connector.clone());

        handler.handle(&usable_forecast()).await;
        assert_eq!(store.inserts.load(Ordering::SeqCst), 0);

        handler.handle(&usable_forecast()).await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);

        // Ready state is reused, no third connect.
        handler.handle(&usable_forecast()).await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }
}
