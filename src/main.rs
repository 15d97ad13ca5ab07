//! assetstamp -- content-addressed asset publishing server.
//!
//! SIGTERM/SIGINT stop accepting connections and wait up to
//! `server.shutdown_timeout` seconds for in-flight uploads before exiting.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use assetstamp::config::LoggingConfig;

/// Command-line arguments for the assetstamp server.
#[derive(Parser, Debug)]
#[command(
    name = "assetstamp",
    version,
    about = "Content-addressed asset publishing server"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "assetstamp.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = assetstamp::config::load_config(&cli.config)?;
    init_tracing(&config.logging);
    info!("Loaded configuration from {}", cli.config);

    config.validate()?;

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        assetstamp::metrics::init_metrics()?;
        assetstamp::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    if let Some(dir) = &config.server.spool_dir {
        std::fs::create_dir_all(dir)?;
    }

    let metadata = assetstamp::metadata::from_config(&config.metadata)?;
    info!(
        "Metadata store [{}] holds {} named asset(s)",
        config.metadata.engine,
        metadata.count_asset_names().await?
    );
    let storage = assetstamp::storage::from_config(&config.storage).await?;
    info!(
        "Publishing to container [{}] at {}",
        config.storage.container,
        storage.cdn_base_uri()
    );

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(assetstamp::AppState::new(config, metadata, storage));
    let app = assetstamp::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("assetstamp listening on {}", bind_addr);

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stop_tx.send(());
        })
        .into_future();

    // Once the signal arrives, in-flight requests get `shutdown_timeout` to drain.
    let drain_deadline = async move {
        if stop_rx.await.is_ok() {
            tokio::time::sleep(shutdown_timeout).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => result?,
        _ = drain_deadline => warn!("Shutdown timeout elapsed with requests still in flight"),
    }

    info!("assetstamp shut down");

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` overrides `logging.level`.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
