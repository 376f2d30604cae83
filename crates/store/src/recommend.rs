//! Threshold-based irrigation recommendation.
//!
//! Policy: below the moisture threshold, water
//! `0.5 + 0.1 * (threshold - moisture)` litres per square metre, rounded to
//! two decimals.  Changing those constants is a policy change.

use serde::Serialize;
use std::fmt;

use crate::record::SensorReading;

/// Litres per m² applied whenever watering is recommended at all.
const BASE_LITERS: f64 = 0.5;

/// Additional litres per m² per percentage point of moisture deficit.
const LITERS_PER_DEFICIT_POINT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Recommendation {
    /// No moisture value to judge from.
    Unknown,
    /// Moisture is at or above the threshold.
    Ok,
    /// Moisture is below the threshold; water roughly `liters` per m².
    Water { liters: f64 },
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown (no moisture reading)"),
            Self::Ok => write!(f, "ok, no watering needed"),
            Self::Water { liters } => write!(f, "water ~{liters} L/m² (low moisture)"),
        }
    }
}

/// Classify `reading` against `threshold_pct`.
pub fn recommend(reading: &SensorReading, threshold_pct: f64) -> Recommendation {
    match reading.soil_moisture_pct {
        None => Recommendation::Unknown,
        Some(m) if m < threshold_pct => Recommendation::Water {
            liters: round2(BASE_LITERS + LITERS_PER_DEFICIT_POINT * (threshold_pct - m)),
        },
        Some(_) => Recommendation::Ok,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// The most recent reading that has a moisture value.
///
/// Dated readings win over undated ones; an undated reading is only picked
/// when no dated reading has moisture.  Among undated readings the last one
/// in `readings` is taken.
pub fn latest_with_moisture(readings: &[SensorReading]) -> Option<&SensorReading> {
    let with_moisture = || readings.iter().filter(|r| r.soil_moisture_pct.is_some());

    // max_by_key keeps the last of equal maxima, i.e. the later row.
    with_moisture()
        .filter(|r| r.timestamp.is_some())
        .max_by_key(|r| r.timestamp)
        .or_else(|| with_moisture().last())
}

// ===========================================================================
// Tests
// ===========================================================================
