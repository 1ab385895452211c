//! The polling loop: fetch, hand off, sleep, repeat.
//!
//! Failures inside one cycle are logged and contained so the loop itself
//! never dies; only cancellation stops it.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::forecast::ForecastSource;
use crate::persist::ResultSink;

pub struct Poller {
    source: Arc<dyn ForecastSource>,
    sink: Arc<dyn ResultSink>,
    interval: Duration,
}

impl Poller {
    pub fn new(source: Arc<dyn ForecastSource>, sink: Arc<dyn ResultSink>, interval: Duration) -> Self {
        Self {
            source,
            sink,
            interval,
        }
    }

    /// Runs until `cancel` fires. Cancellation interrupts both an in-flight
    /// cycle and the sleep between cycles.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Polling started");

        while !cancel.is_cancelled() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.cycle() => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Polling stopped");
    }

    /// One fetch-then-persist cycle. Never propagates an error.
    pub async fn cycle(&self) {
        info!("Querying the weather API");
        match self.source.fetch().await {
            Ok(forecast) => self.sink.handle(&forecast).await,
            Err(e) => error!(error = %e, "Poll cycle failed"),
        }
    }
}
