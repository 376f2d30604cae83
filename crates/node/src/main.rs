//! Stand-alone simulator: writes synthetic readings into the store so the
//! dashboard has data to show without field hardware.

use agrimek_store::client::DEFAULT_RESOURCE;
use agrimek_store::{simulate, Credential, CredentialTransport, Endpoint, SimPlan, StoreClient};
use anyhow::{anyhow, bail, Context, Result};
use std::{env, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct NodeSettings {
    endpoint: Endpoint,
    plan: SimPlan,
}

fn non_blank(v: String) -> Option<String> {
    let t = v.trim();
    (!t.is_empty()).then(|| t.to_string())
}

/// Read settings from the environment.  `lookup` is `std::env::var` in
/// production and a map in tests.
fn settings_from<F>(lookup: F) -> Result<NodeSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let base = lookup("STORE_URL")
        .and_then(non_blank)
        .context("STORE_URL is not set")?;
    let resource = lookup("STORE_RESOURCE")
        .and_then(non_blank)
        .unwrap_or_else(|| DEFAULT_RESOURCE.to_string());

    let transport = match lookup("STORE_AUTH_TRANSPORT").and_then(non_blank).as_deref() {
        None | Some("query") => CredentialTransport::Query,
        Some("bearer") => CredentialTransport::Bearer,
        Some(other) => bail!("STORE_AUTH_TRANSPORT must be query or bearer, got {other:?}"),
    };
    let credential = lookup("STORE_AUTH_TOKEN")
        .and_then(non_blank)
        .map(|t| Credential::new(t, transport));

    let count: u32 = match lookup("SIM_COUNT") {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("SIM_COUNT is not an integer: {v:?}"))?,
        None => 10,
    };
    let delay_s: f64 = match lookup("SIM_DELAY_S") {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("SIM_DELAY_S is not a number: {v:?}"))?,
        None => 1.0,
    };
    let delay = Duration::try_from_secs_f64(delay_s)
        .map_err(|_| anyhow!("SIM_DELAY_S must be a non-negative number of seconds, got {delay_s}"))?;

    let plan = SimPlan { count, delay };
    plan.check().map_err(|e| anyhow!("invalid simulation: {e}"))?;

    Ok(NodeSettings {
        endpoint: Endpoint::new(base)
            .with_resource(resource)
            .with_credential(credential),
        plan,
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = settings_from(|k| env::var(k).ok())?;
    info!(
        url = %settings.endpoint.url(),
        count = settings.plan.count,
        delay = ?settings.plan.delay,
        "simulating sensor node"
    );

    let client = StoreClient::new(settings.endpoint).context("failed to build HTTP client")?;
    let mut sim = simulate(client, settings.plan);

    loop {
        tokio::select! {
            outcome = sim.next() => {
                if outcome.is_none() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted");
                break;
            }
        }
    }

    let summary = sim.summary();
    info!(
        attempted = summary.attempted,
        sent = summary.sent,
        failed = summary.failed,
        "done"
    );
    if summary.attempted > 0 && summary.sent == 0 {
        bail!("all {} write(s) failed", summary.attempted);
    }
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
