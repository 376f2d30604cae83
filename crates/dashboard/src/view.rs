//! Render model for one polling cycle.
//!
//! The poller builds a [`Snapshot`] from the freshly normalized readings and
//! publishes it into shared state; the web UI only ever draws snapshots.

use agrimek_store::{
    latest_with_moisture, order_by, recommend, Direction, Recommendation, SensorReading,
};
use serde::Serialize;
use time::OffsetDateTime;

use crate::config::{DashboardConfig, RecentOrder};

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// "Last updated" marker.
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,
    pub total_rows: usize,
    pub undated_rows: usize,
    pub incomplete_rows: usize,
    /// Most recent rows, bounded to `table_rows`, in `recent_order`.
    pub recent: Vec<SensorReading>,
    pub recent_order: RecentOrder,
    /// Dated rows only, oldest first, bounded to `chart_points`.
    pub trend: Vec<SensorReading>,
    /// Latest reading that has a moisture value.
    pub latest: Option<SensorReading>,
    pub threshold_pct: f64,
    pub recommendation: Recommendation,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.total_rows == 0
    }
}

pub fn build(
    readings: Vec<SensorReading>,
    cfg: &DashboardConfig,
    fetched_at: OffsetDateTime,
) -> Snapshot {
    let total_rows = readings.len();
    let undated_rows = readings.iter().filter(|r| r.timestamp.is_none()).count();
    let incomplete_rows = readings.iter().filter(|r| r.has_missing_field()).count();

    let latest = latest_with_moisture(&readings).cloned();
    let recommendation = latest
        .as_ref()
        .map(|r| recommend(r, cfg.moisture_threshold_pct))
        .unwrap_or(Recommendation::Unknown);

    let mut recent: Vec<SensorReading> = order_by(readings.clone(), Direction::Descending)
        .into_iter()
        .take(cfg.table_rows)
        .collect();
    if cfg.recent_order == RecentOrder::OldestFirst {
        recent = order_by(recent, Direction::Ascending);
    }

    let dated: Vec<SensorReading> = readings
        .into_iter()
        .filter(|r| r.timestamp.is_some())
        .collect();
    let mut trend = order_by(dated, Direction::Ascending);
    let excess = trend.len().saturating_sub(cfg.chart_points);
    trend.drain(..excess);

    Snapshot {
        fetched_at,
        total_rows,
        undated_rows,
        incomplete_rows,
        recent,
        recent_order: cfg.recent_order,
        trend,
        latest,
        threshold_pct: cfg.moisture_threshold_pct,
        recommendation,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
