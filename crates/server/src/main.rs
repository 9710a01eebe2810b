// SPDX-License-Identifier: MIT

//! gueridond — the session broker daemon.
//!
//! Listens for browser clients over HTTP/WebSocket/SSE, spawns and
//! supervises one agent child per project folder, and reaps orphaned
//! children left behind by a prior, uncleanly-terminated run.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use gueridon_core::BrokerConfig;
use gueridon_server::{logging, reaper, routes, AppState, SessionRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = BrokerConfig::from_env()?;

    let _log_guard = logging::init_logging(&config.config_dir)?;
    info!("starting gueridond");

    // Must run before the listener starts accepting connections (spec.md
    // §4.H): any child still alive from a prior process gets SIGTERM'd
    // here, not raced against a fresh client attaching to its folder.
    reaper::reap_on_startup(&config.sessions_file());

    let sessions_path = config.sessions_file();
    let registry = Arc::new(SessionRegistry::new(config.clone()));
    let reaper_task = tokio::spawn(reaper::run(Arc::clone(&registry), sessions_path.clone()));

    let app_state = AppState::new(registry);
    let router = routes::build_router(app_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr, "failed to bind listener");
            return Err(e.into());
        }
    };
    info!(addr, "gueridond ready");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                _ = sigint.recv() => info!("received SIGINT, shutting down"),
            }
        })
        .await?;

    reaper_task.abort();
    reaper::clear_on_shutdown(&sessions_path);
    info!("gueridond stopped");
    Ok(())
}
