use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::rest::{self, AppState};
use crate::client::HttpNodeAgent;
use crate::config::Config;
use crate::domain::fleet_service::FleetService;
use crate::domain::scheduler::RefreshTrigger;

pub async fn run(config: Config) -> Result<()> {
    init_tracing(&config.daemon.log_level, &config.daemon.log_format);

    info!(version = env!("CARGO_PKG_VERSION"), "fleetview daemon starting");

    let agent = HttpNodeAgent::new(&config.registry, &config.agent)
        .context("building registry and agent client")?;
    let fleet = Arc::new(FleetService::new(
        Arc::new(agent),
        config.aggregation_settings(),
    ));

    let app = rest::router(AppState {
        fleet: fleet.clone(),
    })
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http());

    // Bind HTTP listener
    let http_addr = &config.daemon.http_addr;
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding to {}", http_addr))?;

    info!(addr = %http_addr, registry = %config.registry.url, "HTTP server listening");

    // Periodic refresh fires its first tick immediately, so the startup
    // refresh runs in the background and the daemon serves `loading` until
    // it lands.
    match config.refresh_interval() {
        Some(interval) => fleet.start(interval),
        None => {
            warn!("periodic refresh disabled, running startup refresh only");
            fleet.scheduler().trigger(RefreshTrigger::Startup);
        }
    }

    // Run HTTP server with graceful shutdown
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    fleet.reset();
    info!("fleetview daemon stopped");
    Ok(())
}

fn init_tracing(level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        "pretty" => builder.pretty().init(),
        _ => builder.json().init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, shutting down"); },
        _ = terminate => { info!("Received SIGTERM, shutting down"); },
    }
}
