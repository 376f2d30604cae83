use agrimek_store::{simulate, StoreClient};
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{Config, SimulationConfig};
use crate::poller;
use crate::state::SharedState;

const INDEX_HTML: &str = include_str!("ui/index.html");

#[derive(Clone)]
pub struct AppState {
    pub shared: SharedState,
    /// Live configuration.  The poller watches the receiving side.
    pub config: Arc<watch::Sender<Config>>,
}

impl AppState {
    pub fn new(shared: SharedState, config: Arc<watch::Sender<Config>>) -> Self {
        Self { shared, config }
    }
}

/// Config as shown to the browser: the token itself never leaves the
/// process.
#[derive(Serialize)]
struct ConfigView<'a> {
    #[serde(flatten)]
    config: &'a Config,
    has_auth_token: bool,
}

#[derive(Debug, Default, Deserialize)]
struct SimulateRequest {
    count: Option<u32>,
    delay_secs: Option<f64>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(api_status))
        .route("/api/config", get(get_config).put(put_config))
        .route("/api/simulate", post(start_simulation))
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], INDEX_HTML)
}

async fn api_status(State(app): State<AppState>) -> impl IntoResponse {
    let st = app.shared.read().await;
    Json(st.to_status())
}

async fn get_config(State(app): State<AppState>) -> Response {
    let cfg = app.config.borrow().clone();
    config_json(&cfg)
}

fn config_json(cfg: &Config) -> Response {
    Json(ConfigView {
        config: cfg,
        has_auth_token: cfg.store.auth_token.is_some(),
    })
    .into_response()
}

/// Replace the live config.  An omitted `auth_token` keeps the current one;
/// an empty string clears it.
async fn put_config(State(app): State<AppState>, Json(mut next): Json<Config>) -> Response {
    if next.store.auth_token.is_none() {
        next.store.auth_token = app.config.borrow().store.auth_token.clone();
    }
    next.normalize();

    if let Err(e) = next.validate() {
        warn!("rejected config update: {e}");
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }

    info!(
        store = next.store.base_url.as_deref().unwrap_or("<unset>"),
        refresh_secs = next.dashboard.refresh_secs,
        threshold_pct = next.dashboard.moisture_threshold_pct,
        "config updated"
    );
    app.shared
        .write()
        .await
        .record_system("config updated".to_string());

    let response = config_json(&next);
    app.config.send_replace(next);
    response
}

/// Kick off a background simulation against the configured store.
/// Defaults come from `[simulation]`; the body may override either value.
async fn start_simulation(
    State(app): State<AppState>,
    body: Bytes,
) -> Response {
    let req: SimulateRequest = if body.is_empty() {
        SimulateRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, format!("invalid request body: {e}"))
            }
        }
    };
    let mut cfg = app.config.borrow().clone();

    let Some(endpoint) = cfg.store.endpoint() else {
        return error_response(StatusCode::CONFLICT, "no store configured");
    };

    cfg.simulation = SimulationConfig {
        count: req.count.unwrap_or(cfg.simulation.count),
        delay_secs: req.delay_secs.unwrap_or(cfg.simulation.delay_secs),
    };
    if let Err(e) = cfg.validate() {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }
    let plan = cfg.simulation.plan();

    let client = match StoreClient::new(endpoint) {
        Ok(c) => c,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to build store client: {e}"),
            )
        }
    };

    {
        let mut st = app.shared.write().await;
        if st.simulation.running {
            return error_response(StatusCode::CONFLICT, "a simulation is already running");
        }
        st.start_simulation(plan);
    }

    info!(count = plan.count, delay = ?plan.delay, "simulation requested");
    tokio::spawn(poller::run_simulation(
        simulate(client, plan),
        Arc::clone(&app.shared),
    ));

    (
        StatusCode::ACCEPTED,
        Json(json!({ "planned": plan.count, "delay_secs": plan.delay.as_secs_f64() })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;
    info!("web ui listening on http://{addr}");
    Ok(listener)
}

/// Serve until `shutdown` flips.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
