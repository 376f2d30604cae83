//! Turns raw keyed store records into typed [`SensorReading`]s.
//!
//! Nothing in here fails: values that cannot be coerced become `None` and
//! the row is kept, so the row count a user sees always matches the store.

use serde_json::Value;
use std::cmp::Ordering;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::record::{RawRecord, SensorReading};

/// Epoch values above this are taken to be milliseconds (10^11 seconds is
/// the year 5138).
const EPOCH_MILLIS_CUTOFF: f64 = 1e11;

/// Sort direction for [`order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Oldest first: trend charts.
    Ascending,
    /// Newest first: "most recent" listings.
    Descending,
}

/// Normalize every `(store key, record)` pair into a reading, in input
/// order.
pub fn normalize(records: Vec<(String, RawRecord)>) -> Vec<SensorReading> {
    records
        .into_iter()
        .map(|(key, rec)| normalize_one(key, rec))
        .collect()
}

fn normalize_one(key: String, rec: RawRecord) -> SensorReading {
    let timestamp = match &rec.timestamp {
        Some(v) => parse_timestamp_value(v),
        None => parse_timestamp(&key),
    };
    if timestamp.is_none() {
        tracing::debug!(key = %key, raw = ?rec.timestamp, "unparseable timestamp");
    }

    let soil_moisture_pct = field_number(&key, "soil_moisture_pct", rec.soil_moisture_pct.as_ref());
    let temperature_c = field_number(&key, "temperature_C", rec.temperature_c.as_ref());
    let humidity_pct = field_number(&key, "humidity_pct", rec.humidity_pct.as_ref());

    SensorReading {
        key,
        timestamp,
        soil_moisture_pct,
        temperature_c,
        humidity_pct,
    }
}

fn field_number(key: &str, field: &str, value: Option<&Value>) -> Option<f64> {
    let value = value?;
    let n = coerce_number(value);
    if n.is_none() {
        tracing::debug!(key = %key, field, raw = %value, "non-numeric value coerced to missing");
    }
    n
}

/// Parse-or-missing numeric coercion: JSON numbers pass through, strings are
/// trimmed and parsed, everything else (and NaN/inf) is missing.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn parse_timestamp_value(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        _ => None,
    }
}

fn from_epoch(v: f64) -> Option<OffsetDateTime> {
    if !v.is_finite() {
        return None;
    }
    let secs = if v.abs() > EPOCH_MILLIS_CUTOFF { v / 1000.0 } else { v };
    let nanos = (secs * 1e9).round() as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}

/// Parse the timestamp formats sensors and the simulator are known to
/// write: RFC 3339, ISO-8601 without an offset (taken as UTC, `T` or space
/// separated, optional fraction), or a bare date.
pub fn parse_timestamp(s: &str) -> Option<OffsetDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(t) = OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339) {
        return Some(t);
    }

    let naive = PrimitiveDateTime::parse(
        s,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            s,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        )
    })
    .or_else(|_| {
        PrimitiveDateTime::parse(
            s,
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        )
    })
    .or_else(|_| {
        PrimitiveDateTime::parse(
            s,
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        )
    });
    if let Ok(t) = naive {
        return Some(t.assume_utc());
    }

    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc())
}

/// Stable sort by timestamp.  Readings without a timestamp go last in both
/// directions and keep their relative order.
pub fn order_by(mut readings: Vec<SensorReading>, direction: Direction) -> Vec<SensorReading> {
    readings.sort_by(|a, b| match (a.timestamp, b.timestamp) {
        (Some(x), Some(y)) => match direction {
            Direction::Ascending => x.cmp(&y),
            Direction::Descending => y.cmp(&x),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    readings
}

// ===========================================================================
// Tests
// ===========================================================================
