use agrimek_store::{FetchError, SimOutcome, SimPlan, SimSummary};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::view::Snapshot;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<DashboardState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// No store configured: no network calls, UI prompts for a URL.
    Idle,
    Polling,
}

pub struct DashboardState {
    pub started_at: Instant,
    pub mode: Mode,
    pub snapshot: Option<Snapshot>,
    pub fetch_error: Option<Diagnostic>,
    pub simulation: SimulationStatus,
    pub events: VecDeque<DashboardEvent>,
}

/// Inline diagnostic shown next to the affected panel.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub status: Option<u16>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationStatus {
    pub running: bool,
    pub planned: u32,
    pub attempted: u32,
    pub sent: u32,
    pub failed: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Poll,
    Simulation,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub mode: Mode,
    pub snapshot: Option<Snapshot>,
    pub fetch_error: Option<Diagnostic>,
    pub simulation: SimulationStatus,
    pub events: Vec<DashboardEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl DashboardState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            mode: Mode::Idle,
            snapshot: None,
            fetch_error: None,
            simulation: SimulationStatus::default(),
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn shared() -> SharedState {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Switch mode.  Going idle drops whatever was fetched from the old
    /// store.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        if mode == Mode::Idle {
            self.snapshot = None;
            self.fetch_error = None;
        }
        let detail = match mode {
            Mode::Idle => "idle: no store configured",
            Mode::Polling => "polling store",
        };
        self.push_event(EventKind::System, detail.to_string());
    }

    /// Drop everything fetched from the previous store.  Called when the
    /// poller switches to a different store URL while polling.
    pub fn reset_for_new_store(&mut self, url: &str) {
        self.snapshot = None;
        self.fetch_error = None;
        self.push_event(EventKind::System, format!("store changed to {url}"));
    }

    /// Publish the result of a successful polling cycle.
    pub fn record_snapshot(&mut self, snapshot: Snapshot) {
        let detail = format!(
            "{} row(s), recommendation: {}",
            snapshot.total_rows, snapshot.recommendation
        );
        self.fetch_error = None;
        self.snapshot = Some(snapshot);
        self.push_event(EventKind::Poll, detail);
    }

    /// Record a failed read.  The previous snapshot stays on screen.
    pub fn record_fetch_error(&mut self, err: &FetchError) {
        self.fetch_error = Some(Diagnostic {
            at: OffsetDateTime::now_utc(),
            status: err.status,
            message: err.message.clone(),
        });
        self.push_event(EventKind::Error, err.to_string());
    }

    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    pub fn start_simulation(&mut self, plan: SimPlan) {
        self.simulation = SimulationStatus {
            running: true,
            planned: plan.count,
            ..SimulationStatus::default()
        };
        self.push_event(
            EventKind::Simulation,
            format!("simulation started: {} reading(s), {:?} apart", plan.count, plan.delay),
        );
    }

    pub fn record_sim_outcome(&mut self, outcome: &SimOutcome, summary: SimSummary) {
        self.simulation.attempted = summary.attempted;
        self.simulation.sent = summary.sent;
        self.simulation.failed = summary.failed;

        let planned = self.simulation.planned;
        let moisture = outcome.record().soil_moisture_pct;
        match outcome {
            SimOutcome::Sent { .. } => self.push_event(
                EventKind::Simulation,
                format!("{}/{planned} sent (moisture {moisture})", summary.attempted),
            ),
            SimOutcome::Failed { error, .. } => {
                self.simulation.last_error = Some(error.to_string());
                self.push_event(
                    EventKind::Error,
                    format!("{}/{planned} failed: {error}", summary.attempted),
                );
            }
        }
    }

    pub fn finish_simulation(&mut self) {
        self.simulation.running = false;
        let s = &self.simulation;
        let detail = format!(
            "simulation finished: {} sent, {} failed",
            s.sent, s.failed
        );
        self.push_event(EventKind::Simulation, detail);
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            mode: self.mode,
            snapshot: self.snapshot.clone(),
            fetch_error: self.fetch_error.clone(),
            simulation: self.simulation.clone(),
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(DashboardEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
