//! Record types on both sides of the store boundary: what comes back from a
//! read (`RawRecord`), what goes out on a write (`SensorRecord`), and the
//! normalized `SensorReading` the dashboard works with.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

// ---------------------------------------------------------------------------
// Read side
// ---------------------------------------------------------------------------

/// One store entry as returned by a read, before any coercion.
///
/// Every field keeps its raw JSON value so that a string `"25"`, a number
/// `25` and garbage can all be told apart by the normalizer.  A field that
/// is absent from the entry is `None`; a field explicitly set to `null` is
/// `Some(Value::Null)`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawRecord {
    #[serde(default, deserialize_with = "present")]
    pub timestamp: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub soil_moisture_pct: Option<Value>,
    #[serde(default, rename = "temperature_C", deserialize_with = "present")]
    pub temperature_c: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub humidity_pct: Option<Value>,
}

/// Keeps an explicit `null` distinguishable from a missing key.
fn present<'de, D>(de: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(de).map(Some)
}

impl RawRecord {
    /// Decode one store entry.  Entries that are not JSON objects decode to
    /// an all-absent record rather than failing the whole read.
    pub fn from_value(value: Value) -> Self {
        if !value.is_object() {
            return Self::default();
        }
        serde_json::from_value(value).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Write side
// ---------------------------------------------------------------------------

/// A reading as written to the store by the simulator (or real hardware).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(rename = "temperature_C")]
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub soil_moisture_pct: f64,
}

// ---------------------------------------------------------------------------
// Normalized
// ---------------------------------------------------------------------------

/// One normalized sensor sample.  Identity is the store key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub key: String,
    /// `None` when neither the record nor its key held a parseable time.
    #[serde(with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    pub soil_moisture_pct: Option<f64>,
    #[serde(rename = "temperature_C")]
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
}

impl SensorReading {
    /// True when at least one measurement coerced to missing.
    pub fn has_missing_field(&self) -> bool {
        self.soil_moisture_pct.is_none()
            || self.temperature_c.is_none()
            || self.humidity_pct.is_none()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
