//! Dashboard loop: fetch the store, normalize, build a render snapshot and
//! publish it into shared state, then wait `refresh_secs`.  Also hosts the
//! background task that drives a dashboard-triggered simulation.
//!
//! ## Modes
//!
//! ```text
//! Idle ──[store.base_url set]──────▶ Polling ──┐
//!  ▲                                    ▲      │ fetch → snapshot → wait
//!  └────[store.base_url cleared]────────┤      │
//!                                       └──────┘
//! ```
//!
//! A config change wakes the loop immediately; a shutdown signal ends it.
//! Fetch failures never end it: they become a diagnostic next to the last
//! good snapshot.  Switching to a different store URL drops that snapshot.

use agrimek_store::{normalize, Endpoint, Simulation, StoreClient};
use anyhow::{Context, Result};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{Config, DashboardConfig};
use crate::state::{Mode, SharedState};
use crate::view;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run the polling loop until `shutdown` flips (or its sender goes away).
/// Intended to be `tokio::spawn`-ed from main.
pub async fn run(
    mut config: watch::Receiver<Config>,
    shared: SharedState,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut client: Option<StoreClient> = None;
    info!("poller started");

    loop {
        let cfg = config.borrow_and_update().clone();

        let wait = match cfg.store.endpoint() {
            None => {
                client = None;
                shared.write().await.set_mode(Mode::Idle);
                None
            }
            Some(endpoint) => {
                let switched = client
                    .as_ref()
                    .is_some_and(|c| c.endpoint().url() != endpoint.url());
                {
                    let mut st = shared.write().await;
                    st.set_mode(Mode::Polling);
                    if switched {
                        info!(url = %endpoint.url(), "store changed, dropping previous data");
                        st.reset_for_new_store(&endpoint.url());
                    }
                }
                match client_for(&mut client, endpoint) {
                    Ok(c) => poll_once(c, &cfg.dashboard, &shared).await,
                    Err(e) => {
                        error!("poller: {e:#}");
                        shared.write().await.record_error(format!("{e:#}"));
                    }
                }
                Some(Duration::from_secs(cfg.dashboard.refresh_secs))
            }
        };

        tokio::select! {
            _ = shutdown.changed() => {
                info!("poller stopping");
                break;
            }
            changed = config.changed() => {
                if changed.is_err() {
                    info!("config channel closed, poller stopping");
                    break;
                }
                debug!("config changed, re-evaluating");
            }
            _ = pause(wait) => {}
        }
    }
}

/// Sleep for `wait`, or forever when idle (only a config change or shutdown
/// can wake an idle loop).
async fn pause(wait: Option<Duration>) {
    match wait {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

/// Reuse the cached client unless the endpoint changed.
fn client_for(slot: &mut Option<StoreClient>, endpoint: Endpoint) -> Result<&StoreClient> {
    let client = match slot.take() {
        Some(c) if *c.endpoint() == endpoint => c,
        _ => {
            info!(url = %endpoint.url(), "connecting to store");
            StoreClient::new(endpoint).context("failed to build store HTTP client")?
        }
    };
    Ok(slot.insert(client))
}

// ---------------------------------------------------------------------------
// One polling cycle
// ---------------------------------------------------------------------------

/// Fetch → normalize → snapshot → publish.  The table is rebuilt from
/// scratch every time.
pub async fn poll_once(client: &StoreClient, cfg: &DashboardConfig, shared: &SharedState) {
    match client.read().await {
        Ok(records) => {
            let readings = normalize(records);
            let snapshot = view::build(readings, cfg, OffsetDateTime::now_utc());
            if snapshot.is_empty() {
                debug!("store returned no readings");
            }
            info!(
                rows = snapshot.total_rows,
                undated = snapshot.undated_rows,
                incomplete = snapshot.incomplete_rows,
                recommendation = %snapshot.recommendation,
                "poll complete"
            );
            shared.write().await.record_snapshot(snapshot);
        }
        Err(e) => {
            warn!(status = ?e.status, "poll failed: {}", e.message);
            shared.write().await.record_fetch_error(&e);
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation task
// ---------------------------------------------------------------------------

/// Drain `sim`, reporting every outcome into shared state.  The caller has
/// already marked the simulation as running.
pub async fn run_simulation(mut sim: Simulation, shared: SharedState) {
    while let Some(outcome) = sim.next().await {
        let summary = sim.summary();
        shared.write().await.record_sim_outcome(&outcome, summary);
    }

    let summary = sim.summary();
    info!(
        attempted = summary.attempted,
        sent = summary.sent,
        failed = summary.failed,
        "simulation finished"
    );
    shared.write().await.finish_simulation();
}

// ===========================================================================
// Tests
// ===========================================================================
