//! CLI entry point for the weather poller.
//!
//! Provides a `run` subcommand driving the periodic fetch-and-persist loop
//! and a `once` subcommand for a single cycle.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use weather_poller::config::Settings;
use weather_poller::forecast::ForecastClient;
use weather_poller::persist::ResultHandler;
use weather_poller::poller::Poller;
use weather_poller::secrets::VaultStore;
use weather_poller::table::DynamoConnector;

#[derive(Parser)]
#[command(name = "weather_poller")]
#[command(about = "Polls a weather API and persists one reading per cycle", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the polling loop until interrupted
    Run {
        /// Seconds between cycles, overriding POLL_INTERVAL_SECONDS
        #[arg(short, long)]
        interval: Option<u64>,

        /// Seconds to wait before the first secret-store access
        #[arg(long, default_value_t = 10)]
        startup_delay: u64,
    },
    /// Execute a single fetch-and-persist cycle, then exit
    Once,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/weather_poller.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("weather_poller.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let settings = Arc::new(Settings::from_env());
    let secrets = Arc::new(VaultStore::new(
        settings.vault_addr.clone(),
        settings.vault_token.clone(),
    )?);
    let source = Arc::new(ForecastClient::new(settings.clone(), secrets.clone())?);
    let sink = Arc::new(ResultHandler::new(
        settings.clone(),
        secrets,
        Arc::new(DynamoConnector),
    ));

    match cli.command {
        Commands::Run {
            interval,
            startup_delay,
        } => {
            let interval = Duration::from_secs(interval.unwrap_or(settings.interval_seconds));
            let poller = Poller::new(source, sink, interval);

            if startup_delay > 0 {
                info!(startup_delay, "Waiting before first secret-store access");
                tokio::time::sleep(Duration::from_secs(startup_delay)).await;
            }

            let cancel = CancellationToken::new();
            let signal_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown signal received");
                    signal_cancel.cancel();
                }
            });

            poller.run(cancel).await;
        }
        Commands::Once => {
            let interval = Duration::from_secs(settings.interval_seconds);
            Poller::new(source, sink, interval).cycle().await;
        }
    }

    Ok(())
}
