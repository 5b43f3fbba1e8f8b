//! eve-marketwatch entry point.

use std::env;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use esi::EsiConfig;
use marketwatch::MarketWatch;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("starting eve-marketwatch");

    let ws_port: u16 = env::var("WS_PORT")
        .unwrap_or_else(|_| "3005".to_string())
        .parse()
        .context("WS_PORT must be a number")?;
    let metrics_port: u16 = env::var("METRICS_PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .context("METRICS_PORT must be a number")?;
    let user_agent = env::var("ESI_USER_AGENT")
        .unwrap_or_else(|_| "eve-marketwatch (admin@eve.watch)".to_string());
    let verbose = env::var("DEBUG").map(|v| v == "true").unwrap_or(false);

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], metrics_port))
        .install()
        .context("failed to start Prometheus exporter")?;
    info!(metrics_port, "metrics server started");

    let watch = MarketWatch::new(EsiConfig {
        user_agent,
        verbose,
        ..EsiConfig::default()
    })?;
    let ws_addr = SocketAddr::from(([0, 0, 0, 0], ws_port));

    tokio::select! {
        result = watch.run(ws_addr) => result,
        _ = shutdown_signal() => {
            info!("shutting down");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received terminate signal"),
    }
}
