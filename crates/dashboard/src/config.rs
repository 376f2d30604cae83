//! Dashboard configuration: TOML file, environment overrides, and bound
//! validation.  The validated [`Config`] is the only place settings live;
//! it is handed to the poller and the web layer explicitly.

use agrimek_store::client::DEFAULT_RESOURCE;
use agrimek_store::sim::{MAX_COUNT, MAX_DELAY};
use agrimek_store::{Credential, CredentialTransport, Endpoint, SimPlan};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

pub const REFRESH_SECS: RangeInclusive<u64> = 5..=60;
pub const MOISTURE_THRESHOLD_PCT: RangeInclusive<f64> = 5.0..=30.0;
pub const TABLE_ROWS: RangeInclusive<usize> = 10..=50;
pub const CHART_POINTS: RangeInclusive<usize> = 10..=1000;
pub const REQUEST_TIMEOUT_SECS: RangeInclusive<u64> = 1..=60;

// ---------------------------------------------------------------------------
// Config structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub dashboard: DashboardConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store root, e.g. `https://my-db.firebaseio.com`.  Unset means the
    /// dashboard stays idle.
    pub base_url: Option<String>,
    /// Path under `base_url`.  Firebase needs the `.json` suffix
    /// (`sensors.json`).
    pub resource: String,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    pub credential_transport: CredentialTransport,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub refresh_secs: u64,
    pub moisture_threshold_pct: f64,
    pub table_rows: usize,
    pub chart_points: usize,
    pub recent_order: RecentOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub count: u32,
    pub delay_secs: f64,
}

/// Row order of the "recent readings" table.  Both orders show the same
/// most recent rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecentOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            resource: DEFAULT_RESOURCE.to_string(),
            auth_token: None,
            credential_transport: CredentialTransport::Query,
            request_timeout_secs: 8,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_secs: 10,
            moisture_threshold_pct: 30.0,
            table_rows: 50,
            chart_points: 200,
            recent_order: RecentOrder::NewestFirst,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            count: 10,
            delay_secs: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived values
// ---------------------------------------------------------------------------

impl StoreConfig {
    /// Endpoint to poll, or `None` while no store is configured.
    pub fn endpoint(&self) -> Option<Endpoint> {
        let base = self.base_url.as_deref()?;
        let credential = self
            .auth_token
            .as_ref()
            .map(|t| Credential::new(t.clone(), self.credential_transport));
        Some(
            Endpoint::new(base)
                .with_resource(self.resource.clone())
                .with_credential(credential)
                .with_timeout(Duration::from_secs(self.request_timeout_secs)),
        )
    }
}

impl SimulationConfig {
    pub fn plan(&self) -> SimPlan {
        SimPlan {
            count: self.count,
            delay: Duration::try_from_secs_f64(self.delay_secs).unwrap_or(Duration::ZERO),
        }
    }
}

fn blank_to_none(v: &mut Option<String>) {
    if let Some(s) = v {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            *v = None;
        } else if trimmed.len() != s.len() {
            *v = Some(trimmed.to_string());
        }
    }
}

fn valid_base_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    matches!(rest, Some(r) if !r.is_empty() && !r.starts_with('/') && !r.contains(char::is_whitespace))
}

// ---------------------------------------------------------------------------
// Normalization, overrides, validation
// ---------------------------------------------------------------------------

impl Config {
    /// Trim string settings; blank URL or token means "unset".
    pub fn normalize(&mut self) {
        blank_to_none(&mut self.store.base_url);
        blank_to_none(&mut self.store.auth_token);
        self.store.resource = self.store.resource.trim().to_string();
    }

    /// Apply environment overrides.  `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("STORE_URL") {
            self.store.base_url = Some(v);
        }
        if let Some(v) = lookup("STORE_RESOURCE") {
            self.store.resource = v;
        }
        if let Some(v) = lookup("STORE_AUTH_TOKEN") {
            self.store.auth_token = Some(v);
        }
        if let Some(v) = lookup("REFRESH_SECS") {
            self.dashboard.refresh_secs = v
                .trim()
                .parse()
                .with_context(|| format!("REFRESH_SECS is not an integer: {v:?}"))?;
        }
        if let Some(v) = lookup("MOISTURE_THRESHOLD") {
            self.dashboard.moisture_threshold_pct = v
                .trim()
                .parse()
                .with_context(|| format!("MOISTURE_THRESHOLD is not a number: {v:?}"))?;
        }
        Ok(())
    }

    /// Validate every bound.  Returns `Ok(())` or an error listing every
    /// violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_store(&mut errors);
        self.validate_dashboard(&mut errors);
        self.validate_simulation(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_store(&self, errors: &mut Vec<String>) {
        let s = &self.store;

        if let Some(url) = &s.base_url {
            if !valid_base_url(url) {
                errors.push(format!(
                    "store.base_url {url:?} must be an http:// or https:// URL"
                ));
            }
        }
        if s.resource.trim().is_empty() {
            errors.push("store.resource is empty".to_string());
        } else if s.resource.starts_with('/') {
            errors.push(format!(
                "store.resource {:?} must not start with '/'",
                s.resource
            ));
        }
        if !REQUEST_TIMEOUT_SECS.contains(&s.request_timeout_secs) {
            errors.push(format!(
                "store.request_timeout_secs {} out of range [{}, {}]",
                s.request_timeout_secs,
                REQUEST_TIMEOUT_SECS.start(),
                REQUEST_TIMEOUT_SECS.end()
            ));
        }
    }

    fn validate_dashboard(&self, errors: &mut Vec<String>) {
        let d = &self.dashboard;

        if !REFRESH_SECS.contains(&d.refresh_secs) {
            errors.push(format!(
                "dashboard.refresh_secs {} out of range [{}, {}]",
                d.refresh_secs,
                REFRESH_SECS.start(),
                REFRESH_SECS.end()
            ));
        }
        if !MOISTURE_THRESHOLD_PCT.contains(&d.moisture_threshold_pct) {
            errors.push(format!(
                "dashboard.moisture_threshold_pct {} out of range [{}, {}]",
                d.moisture_threshold_pct,
                MOISTURE_THRESHOLD_PCT.start(),
                MOISTURE_THRESHOLD_PCT.end()
            ));
        }
        if !TABLE_ROWS.contains(&d.table_rows) {
            errors.push(format!(
                "dashboard.table_rows {} out of range [{}, {}]",
                d.table_rows,
                TABLE_ROWS.start(),
                TABLE_ROWS.end()
            ));
        }
        if !CHART_POINTS.contains(&d.chart_points) {
            errors.push(format!(
                "dashboard.chart_points {} out of range [{}, {}]",
                d.chart_points,
                CHART_POINTS.start(),
                CHART_POINTS.end()
            ));
        }
    }

    fn validate_simulation(&self, errors: &mut Vec<String>) {
        let s = &self.simulation;
        let max_delay = MAX_DELAY.as_secs_f64();

        if s.count == 0 || s.count > MAX_COUNT {
            errors.push(format!(
                "simulation.count {} out of range [1, {MAX_COUNT}]",
                s.count
            ));
        }
        if !(0.0..=max_delay).contains(&s.delay_secs) {
            errors.push(format!(
                "simulation.delay_secs {} out of range [0, {max_delay}]",
                s.delay_secs
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Parse TOML config text.
pub fn parse(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents)?;
    Ok(config)
}

/// Read the config file (defaults when it does not exist), apply
/// environment overrides, normalize, and validate.
pub fn load(path: &str) -> Result<Config> {
    load_with(path, |k| std::env::var(k).ok())
}

/// [`load`] with an injected environment lookup.
pub fn load_with<F>(path: &str, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;
        parse(&contents).with_context(|| format!("failed to parse config: {path}"))?
    } else {
        tracing::warn!(path, "config file not found, using defaults");
        Config::default()
    };

    config
        .apply_env(lookup)
        .context("invalid environment override")?;
    config.normalize();
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;

    tracing::info!(
        store = config.store.base_url.as_deref().unwrap_or("<unset>"),
        resource = %config.store.resource,
        refresh_secs = config.dashboard.refresh_secs,
        threshold_pct = config.dashboard.moisture_threshold_pct,
        "config loaded"
    );
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_full_config() {
        let cfg = parse(
            r#"
[store]
base_url = "https://agrimek-demo.firebaseio.com"
resource = "sensors.json"
auth_token = "secret"
credential_transport = "bearer"
request_timeout_secs = 5

[dashboard]
refresh_secs = 15
moisture_threshold_pct = 25.0
table_rows = 20
chart_points = 100
recent_order = "oldest_first"

[simulation]
count = 5
delay_secs = 0.5
"#,
        )
        .unwrap();

        assert_eq!(
            cfg.store.base_url.as_deref(),
            Some("https://agrimek-demo.firebaseio.com")
        );
        assert_eq!(cfg.store.resource, "sensors.json");
        assert_eq!(cfg.store.auth_token.as_deref(), Some("secret"));
        assert_eq!(cfg.store.credential_transport, CredentialTransport::Bearer);
        assert_eq!(cfg.dashboard.refresh_secs, 15);
        assert_eq!(cfg.dashboard.recent_order, RecentOrder::OldestFirst);
        assert_eq!(cfg.simulation.count, 5);
        cfg.validate().unwrap();
    }

    #[test]
    fn parse_empty_config_is_default() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.store.base_url, None);
        assert_eq!(cfg.store.resource, "sensors");
        assert_eq!(cfg.dashboard.moisture_threshold_pct, 30.0);
    }

    #[test]
    fn parse_partial_section_keeps_other_defaults() {
        let cfg = parse("[dashboard]\nrefresh_secs = 30\n").unwrap();
        assert_eq!(cfg.dashboard.refresh_secs, 30);
        assert_eq!(cfg.dashboard.table_rows, 50);
    }

    #[test]
    fn parse_unknown_order_fails() {
        assert!(parse("[dashboard]\nrecent_order = \"sideways\"\n").is_err());
    }

    #[test]
    fn token_is_never_serialized() {
        let mut cfg = Config::default();
        cfg.store.auth_token = Some("secret".into());
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("secret"), "token leaked: {json}");
    }

    // -- Defaults & normalization -------------------------------------------

    #[test]
    fn default_config_passes() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn blank_strings_become_unset() {
        let mut cfg = Config::default();
        cfg.store.base_url = Some("   ".into());
        cfg.store.auth_token = Some("".into());
        cfg.store.resource = " sensors.json ".into();
        cfg.normalize();
        assert_eq!(cfg.store.base_url, None);
        assert_eq!(cfg.store.auth_token, None);
        assert_eq!(cfg.store.resource, "sensors.json");
    }

    #[test]
    fn normalize_trims_url() {
        let mut cfg = Config::default();
        cfg.store.base_url = Some(" https://x.firebaseio.com ".into());
        cfg.normalize();
        assert_eq!(cfg.store.base_url.as_deref(), Some("https://x.firebaseio.com"));
    }

    // -- Env overrides ------------------------------------------------------

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[
            ("STORE_URL", "http://localhost:9000"),
            ("STORE_AUTH_TOKEN", "tok"),
            ("REFRESH_SECS", "20"),
            ("MOISTURE_THRESHOLD", "12.5"),
        ]))
        .unwrap();

        assert_eq!(cfg.store.base_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(cfg.store.auth_token.as_deref(), Some("tok"));
        assert_eq!(cfg.dashboard.refresh_secs, 20);
        assert_eq!(cfg.dashboard.moisture_threshold_pct, 12.5);
    }

    #[test]
    fn env_override_garbage_number_fails() {
        let mut cfg = Config::default();
        let err = cfg.apply_env(env(&[("REFRESH_SECS", "soon")])).unwrap_err();
        assert!(format!("{err:#}").contains("REFRESH_SECS"));
    }

    #[test]
    fn env_override_out_of_range_caught_by_validate() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[("REFRESH_SECS", "2")])).unwrap();
        assert_validation_err(&cfg, "dashboard.refresh_secs 2 out of range [5, 60]");
    }

    // -- Store ----------------------------------------------------------------

    #[test]
    fn store_url_scheme_required() {
        let mut cfg = Config::default();
        cfg.store.base_url = Some("my-db.firebaseio.com".into());
        assert_validation_err(&cfg, "must be an http:// or https:// URL");
    }

    #[test]
    fn store_url_host_required() {
        let mut cfg = Config::default();
        cfg.store.base_url = Some("https://".into());
        assert_validation_err(&cfg, "store.base_url");
    }

    #[test]
    fn store_empty_resource_rejected() {
        let mut cfg = Config::default();
        cfg.store.resource = "".into();
        assert_validation_err(&cfg, "store.resource is empty");
    }

    #[test]
    fn store_resource_leading_slash_rejected() {
        let mut cfg = Config::default();
        cfg.store.resource = "/sensors.json".into();
        assert_validation_err(&cfg, "must not start with '/'");
    }

    #[test]
    fn store_timeout_bounds() {
        let mut cfg = Config::default();
        cfg.store.request_timeout_secs = 0;
        assert_validation_err(&cfg, "request_timeout_secs 0");
    }

    #[test]
    fn endpoint_absent_without_url() {
        assert!(Config::default().store.endpoint().is_none());
    }

    #[test]
    fn endpoint_carries_settings() {
        let mut cfg = Config::default();
        cfg.store.base_url = Some("https://x.firebaseio.com/".into());
        cfg.store.resource = "sensors.json".into();
        cfg.store.auth_token = Some("tok".into());
        cfg.store.request_timeout_secs = 3;

        let ep = cfg.store.endpoint().unwrap();
        assert_eq!(ep.url(), "https://x.firebaseio.com/sensors.json");
        assert_eq!(ep.timeout, Duration::from_secs(3));
        assert_eq!(
            ep.credential.map(|c| c.transport()),
            Some(CredentialTransport::Query)
        );
    }

    // -- Dashboard bounds ---------------------------------------------------

    #[test]
    fn refresh_bounds() {
        let mut cfg = Config::default();
        cfg.dashboard.refresh_secs = 5;
        cfg.validate().unwrap();
        cfg.dashboard.refresh_secs = 60;
        cfg.validate().unwrap();
        cfg.dashboard.refresh_secs = 61;
        assert_validation_err(&cfg, "refresh_secs 61");
    }

    #[test]
    fn threshold_bounds() {
        let mut cfg = Config::default();
        cfg.dashboard.moisture_threshold_pct = 5.0;
        cfg.validate().unwrap();
        cfg.dashboard.moisture_threshold_pct = 4.9;
        assert_validation_err(&cfg, "moisture_threshold_pct 4.9");
        cfg.dashboard.moisture_threshold_pct = 30.5;
        assert_validation_err(&cfg, "moisture_threshold_pct 30.5");
    }

    #[test]
    fn threshold_nan_rejected() {
        let mut cfg = Config::default();
        cfg.dashboard.moisture_threshold_pct = f64::NAN;
        assert_validation_err(&cfg, "moisture_threshold_pct");
    }

    #[test]
    fn table_and_chart_bounds() {
        let mut cfg = Config::default();
        cfg.dashboard.table_rows = 9;
        cfg.dashboard.chart_points = 5000;
        assert_validation_err(&cfg, "table_rows 9");
        assert_validation_err(&cfg, "chart_points 5000");
    }

    // -- Simulation bounds --------------------------------------------------

    #[test]
    fn simulation_bounds() {
        let mut cfg = Config::default();
        cfg.simulation.count = 0;
        assert_validation_err(&cfg, "simulation.count 0");

        let mut cfg = Config::default();
        cfg.simulation.delay_secs = -1.0;
        assert_validation_err(&cfg, "simulation.delay_secs -1");

        let mut cfg = Config::default();
        cfg.simulation.delay_secs = 61.0;
        assert_validation_err(&cfg, "simulation.delay_secs 61");
    }

    #[test]
    fn simulation_plan_from_config() {
        let cfg = SimulationConfig {
            count: 3,
            delay_secs: 0.25,
        };
        let plan = cfg.plan();
        assert_eq!(plan.count, 3);
        assert_eq!(plan.delay, Duration::from_millis(250));
    }

    // -- Multiple errors reported at once -----------------------------------

    #[test]
    fn multiple_errors_collected() {
        let mut cfg = Config::default();
        cfg.store.base_url = Some("ftp://nope".into());
        cfg.dashboard.refresh_secs = 0;
        cfg.simulation.count = 0;

        let msg = format!("{:#}", cfg.validate().unwrap_err());
        assert!(msg.contains("3 errors"), "in: {msg}");
        assert!(msg.contains("store.base_url"), "in: {msg}");
        assert!(msg.contains("refresh_secs"), "in: {msg}");
        assert!(msg.contains("simulation.count"), "in: {msg}");
    }

    // -- Load -----------------------------------------------------------------

    #[test]
    fn load_missing_file_uses_defaults() {
        let cfg = load_with("/nonexistent/agrimek/dashboard.toml", env(&[])).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn load_applies_env_before_validation() {
        let cfg = load_with(
            "/nonexistent/agrimek/dashboard.toml",
            env(&[("STORE_URL", " http://store.local "), ("REFRESH_SECS", "30")]),
        )
        .unwrap();
        assert_eq!(cfg.store.base_url.as_deref(), Some("http://store.local"));
        assert_eq!(cfg.dashboard.refresh_secs, 30);

        let err = load_with("/nonexistent/agrimek/dashboard.toml", env(&[("REFRESH_SECS", "2")]))
            .unwrap_err();
        assert!(format!("{err:#}").contains("refresh_secs 2"));
    }

    #[test]
    fn load_reads_and_validates_file() {
        let path = std::env::temp_dir().join(format!("agrimek-cfg-{}.toml", std::process::id()));
        std::fs::write(&path, "[dashboard]\nrefresh_secs = 1\n").unwrap();

        let err = load_with(path.to_str().unwrap(), env(&[])).unwrap_err();
        assert!(format!("{err:#}").contains("refresh_secs 1"));

        std::fs::remove_file(&path).unwrap();
    }
}
