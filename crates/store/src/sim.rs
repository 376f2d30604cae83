//! Synthetic sensor data for exercising the dashboard without hardware.
//!
//! A [`Simulation`] is a lazy sequence: every call to
//! [`Simulation::next`] draws one reading, writes it to the store and
//! yields the outcome.  Write failures are reported per item and never stop
//! the run.

use std::ops::RangeInclusive;
use std::time::Duration;
use time::OffsetDateTime;

use crate::client::{Ack, StoreClient, WriteError};
use crate::record::SensorRecord;

/// Largest batch a single simulation may write.
pub const MAX_COUNT: u32 = 1000;

/// Longest pause allowed between two writes.
pub const MAX_DELAY: Duration = Duration::from_secs(60);

const TEMPERATURE_C: RangeInclusive<f64> = 20.0..=35.0;
const HUMIDITY_PCT: RangeInclusive<f64> = 40.0..=80.0;
const SOIL_MOISTURE_PCT: RangeInclusive<f64> = 20.0..=60.0;

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// How many readings to write and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimPlan {
    pub count: u32,
    pub delay: Duration,
}

impl SimPlan {
    /// Returns a description of the first violated bound, if any.
    pub fn check(&self) -> Result<(), String> {
        if self.count == 0 || self.count > MAX_COUNT {
            return Err(format!(
                "count {} out of range [1, {MAX_COUNT}]",
                self.count
            ));
        }
        if self.delay > MAX_DELAY {
            return Err(format!(
                "delay {:?} exceeds maximum {MAX_DELAY:?}",
                self.delay
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

fn uniform(range: &RangeInclusive<f64>) -> f64 {
    let v = range.start() + fastrand::f64() * (range.end() - range.start());
    // One decimal, like a real sensor display.
    ((v * 10.0).round() / 10.0).clamp(*range.start(), *range.end())
}

/// Draw one synthetic reading stamped with the current time.
pub fn random_record() -> SensorRecord {
    SensorRecord {
        timestamp: OffsetDateTime::now_utc(),
        temperature_c: uniform(&TEMPERATURE_C),
        humidity_pct: uniform(&HUMIDITY_PCT),
        soil_moisture_pct: uniform(&SOIL_MOISTURE_PCT),
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Result of one simulated write.
#[derive(Debug, Clone, PartialEq)]
pub enum SimOutcome {
    Sent { record: SensorRecord, ack: Ack },
    Failed { record: SensorRecord, error: WriteError },
}

impl SimOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }

    pub fn record(&self) -> &SensorRecord {
        match self {
            Self::Sent { record, .. } | Self::Failed { record, .. } => record,
        }
    }
}

/// Running totals of a simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimSummary {
    pub attempted: u32,
    pub sent: u32,
    pub failed: u32,
}

pub struct Simulation {
    client: StoreClient,
    plan: SimPlan,
    summary: SimSummary,
}

/// Start a simulation that will write `plan.count` readings through
/// `client`.  Nothing happens until the sequence is polled.
pub fn simulate(client: StoreClient, plan: SimPlan) -> Simulation {
    Simulation {
        client,
        plan,
        summary: SimSummary::default(),
    }
}

impl Simulation {
    pub fn plan(&self) -> SimPlan {
        self.plan
    }

    pub fn summary(&self) -> SimSummary {
        self.summary
    }

    /// Write the next reading, waiting `plan.delay` first unless this is the
    /// first one.  Returns `None` once `plan.count` writes were attempted.
    pub async fn next(&mut self) -> Option<SimOutcome> {
        if self.summary.attempted >= self.plan.count {
            return None;
        }
        if self.summary.attempted > 0 && !self.plan.delay.is_zero() {
            tokio::time::sleep(self.plan.delay).await;
        }

        let record = random_record();
        self.summary.attempted += 1;
        let index = self.summary.attempted;

        let outcome = match self.client.write(&record).await {
            Ok(ack) => {
                self.summary.sent += 1;
                let key = ack.key().unwrap_or_default();
                tracing::info!(
                    index,
                    of = self.plan.count,
                    moisture = record.soil_moisture_pct,
                    key = %key,
                    "simulated reading sent"
                );
                SimOutcome::Sent { record, ack }
            }
            Err(error) => {
                self.summary.failed += 1;
                tracing::warn!(index, of = self.plan.count, "simulated reading failed: {error}");
                SimOutcome::Failed { record, error }
            }
        };
        Some(outcome)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Endpoint;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn spawn_store(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// A store that rejects the write whose 1-based position is `fail_at`.
    async fn flaky_store(fail_at: usize) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/sensors",
                post(move |State(hits): State<Arc<AtomicUsize>>| async move {
                    let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == fail_at {
                        (StatusCode::SERVICE_UNAVAILABLE, "try later".to_string())
                    } else {
                        (StatusCode::OK, format!(r#"{{"name":"key-{n}"}}"#))
                    }
                }),
            )
            .with_state(Arc::clone(&hits));
        (spawn_store(router).await, hits)
    }

    fn plan(count: u32, delay_ms: u64) -> SimPlan {
        SimPlan {
            count,
            delay: Duration::from_millis(delay_ms),
        }
    }

    #[test]
    fn random_records_stay_in_range() {
        for _ in 0..2000 {
            let r = random_record();
            assert!(TEMPERATURE_C.contains(&r.temperature_c), "temp {}", r.temperature_c);
            assert!(HUMIDITY_PCT.contains(&r.humidity_pct), "hum {}", r.humidity_pct);
            assert!(
                SOIL_MOISTURE_PCT.contains(&r.soil_moisture_pct),
                "moisture {}",
                r.soil_moisture_pct
            );
        }
    }

    #[test]
    fn random_records_vary() {
        let a: Vec<f64> = (0..20).map(|_| random_record().soil_moisture_pct).collect();
        assert!(a.windows(2).any(|w| w[0] != w[1]), "all 20 draws identical");
    }

    #[test]
    fn plan_bounds() {
        plan(1, 0).check().unwrap();
        plan(MAX_COUNT, 60_000).check().unwrap();
        assert!(plan(0, 0).check().unwrap_err().contains("count 0"));
        assert!(plan(MAX_COUNT + 1, 0).check().is_err());
        assert!(plan(1, 60_001).check().unwrap_err().contains("delay"));
    }

    #[tokio::test]
    async fn failure_mid_batch_does_not_abort() {
        let (base, hits) = flaky_store(2).await;
        let client = StoreClient::new(Endpoint::new(&base)).unwrap();

        let mut sim = simulate(client, plan(3, 0));
        let mut outcomes = Vec::new();
        while let Some(o) = sim.next().await {
            outcomes.push(o);
        }

        let sent: Vec<bool> = outcomes.iter().map(SimOutcome::is_sent).collect();
        assert_eq!(sent, [true, false, true]);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(
            sim.summary(),
            SimSummary {
                attempted: 3,
                sent: 2,
                failed: 1
            }
        );

        match &outcomes[1] {
            SimOutcome::Failed { error, .. } => assert_eq!(error.status, Some(503)),
            other => panic!("expected failure, got {other:?}"),
        }
        match &outcomes[2] {
            SimOutcome::Sent { ack, .. } => assert_eq!(ack.key().as_deref(), Some("key-3")),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sequence_is_lazy_and_ends() {
        let (base, hits) = flaky_store(0).await;
        let client = StoreClient::new(Endpoint::new(&base)).unwrap();

        let mut sim = simulate(client, plan(2, 0));
        assert_eq!(hits.load(Ordering::SeqCst), 0, "nothing written before polling");

        assert!(sim.next().await.is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(sim.next().await.is_some());
        assert!(sim.next().await.is_none());
        assert!(sim.next().await.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn waits_between_items() {
        let (base, _hits) = flaky_store(0).await;
        let client = StoreClient::new(Endpoint::new(&base)).unwrap();
        let mut sim = simulate(client, plan(3, 200));

        let start = std::time::Instant::now();
        while sim.next().await.is_some() {}
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn single_item_never_waits() {
        let (base, _hits) = flaky_store(0).await;
        let client = StoreClient::new(Endpoint::new(&base)).unwrap();
        let mut sim = simulate(client, plan(1, 30_000));

        let start = std::time::Instant::now();
        assert!(sim.next().await.is_some());
        assert!(sim.next().await.is_none());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn unreachable_store_fails_every_item() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = StoreClient::new(Endpoint::new(format!("http://{addr}"))).unwrap();

        let mut sim = simulate(client, plan(2, 0));
        while let Some(o) = sim.next().await {
            assert!(!o.is_sent());
        }
        assert_eq!(sim.summary().failed, 2);
    }
}
