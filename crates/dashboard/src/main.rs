mod config;
mod poller;
mod state;
mod view;
mod web;

use anyhow::{Context, Result};
use std::{env, sync::Arc};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use state::DashboardState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "dashboard.toml".to_string());
    let cfg = config::load(&config_path)?;
    let port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    // ── Shared state (what the web UI renders) ──────────────────────
    let shared = DashboardState::shared();
    shared
        .write()
        .await
        .record_system("dashboard started".to_string());

    let (config_tx, config_rx) = watch::channel(cfg);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Web server ──────────────────────────────────────────────────
    let listener = web::bind(port).await?;
    let app = web::AppState::new(Arc::clone(&shared), Arc::new(config_tx));
    let web_task = tokio::spawn(web::serve(listener, app, shutdown_rx.clone()));

    // ── Polling loop ────────────────────────────────────────────────
    let poller_task = tokio::spawn(poller::run(config_rx, Arc::clone(&shared), shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    shutdown_tx.send_replace(true);

    poller_task.await.context("poller task panicked")?;
    web_task.await.context("web task panicked")??;
    info!("dashboard stopped");
    Ok(())
}
