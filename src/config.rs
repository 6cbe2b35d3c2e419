//! Service configuration read from the process environment.
//!
//! Host settings (`HOST`, `PORT`, `RUST_LOG`) and the `ASSESS_*` engine
//! overrides are parsed here so the assessment module stays free of
//! environment access. Unparseable values fall back to the defaults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use crate::assessment::EngineConfig;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub log_filter: String,
    pub engine: EngineConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let host = parse(&lookup, "HOST").unwrap_or_else(|| defaults.bind.ip());
        let port = parse(&lookup, "PORT").unwrap_or(DEFAULT_PORT);
        let log_filter = lookup("RUST_LOG")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.log_filter);

        Self {
            bind: SocketAddr::new(host, port),
            log_filter,
            engine: engine_from_lookup(&lookup),
        }
    }
}

fn engine_from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> EngineConfig {
    let mut engine = EngineConfig::default();

    if let Some(val) = parse(lookup, "ASSESS_CALIBRATION_THRESHOLD") {
        engine.calibration.delta_threshold = val;
    }
    if let Some(val) = parse(lookup, "ASSESS_MIN_CORRELATION_SAMPLES") {
        engine.calibration.min_correlation_samples = val;
    }
    if let Some(val) = parse(lookup, "ASSESS_DIFFICULTY_BAND") {
        engine.difficulty.band_half_width = val;
    }
    if let Some(val) = parse(lookup, "ASSESS_LOGISTIC_SCALE") {
        engine.knowledge.logistic_scale = val;
    }
    if let Some(val) = parse(lookup, "ASSESS_STOP_CI_WIDTH") {
        engine.knowledge.stop_ci_width = val;
    }
    if let Some(val) = parse(lookup, "ASSESS_MASTERY_HIGH_SCORE") {
        engine.mastery.high_score = val;
    }
    if let Some(val) = parse(lookup, "ASSESS_MASTERY_MIN_DIFFICULTY") {
        engine.mastery.min_difficulty = val;
    }
    if let Some(val) = parse(lookup, "ASSESS_MASTERY_SPAN_HOURS") {
        engine.mastery.min_span_hours = val;
    }

    engine
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
