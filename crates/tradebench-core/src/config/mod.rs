pub mod io;
pub mod validation;

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use io::{read_config, write_config};
pub use validation::validate_config;

/// Category name that expands to every registered scenario.
pub const ALL_CATEGORIES: &str = "all";

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// Immutable configuration for one harness run, shared read-only by every
/// scenario instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RunConfig {
    /// A scenario category, a registered scenario name, or `"all"`.
    pub category: String,
    /// Number of concurrent virtual users for load scenarios.
    pub users: u32,
    /// Wall-clock bound for each virtual user, in seconds.
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Period over which virtual users are started, in seconds.
    #[serde(with = "duration_secs")]
    pub ramp_up: Duration,
    /// Parent directory for timestamped run directories.
    pub output_dir: PathBuf,
    /// A previous `report.json` (or its run directory) to compare against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compare_with: Option<PathBuf>,
    /// Percent increase of a latency statistic that counts as a regression.
    pub regression_threshold_pct: f64,
    /// Base seed for every random choice made during the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(flatten)]
    pub options: ScenarioOptions,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            category: ALL_CATEGORIES.to_string(),
            users: 10,
            duration: Duration::from_secs(60),
            ramp_up: Duration::from_secs(10),
            output_dir: PathBuf::from("reports"),
            compare_with: None,
            regression_threshold_pct: 10.0,
            seed: None,
            options: ScenarioOptions::default(),
        }
    }
}

impl RunConfig {
    /// Iteration count for single-pass scenarios, falling back to the
    /// scenario's own default.
    pub fn iterations_or(&self, default: u32) -> u32 {
        self.options.iterations.unwrap_or(default)
    }

    /// Inclusive range of the pause a virtual user takes between operations.
    pub fn think_time(&self) -> RangeInclusive<Duration> {
        Duration::from_millis(self.options.think_time_min_ms)
            ..=Duration::from_millis(self.options.think_time_max_ms)
    }

    /// The configured seed, drawing and storing a random one if unset so the
    /// run can be reproduced from its report.
    pub fn resolve_seed(&mut self) -> u64 {
        *self.seed.get_or_insert_with(rand::random)
    }
}

// ---------------------------------------------------------------------------
// ScenarioOptions
// ---------------------------------------------------------------------------

/// Scenario-specific keys. Flattened into [`RunConfig`] so config files keep
/// them at the top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ScenarioOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    pub use_limit_orders: bool,
    pub speech_engine: String,
    pub speech_engines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_samples_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labeled_samples_dir: Option<PathBuf>,
    pub think_time_min_ms: u64,
    pub think_time_max_ms: u64,
    /// Optional cap on operations per virtual user, on top of the deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operations_per_user: Option<u64>,
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self {
            iterations: None,
            use_limit_orders: false,
            speech_engine: "whisper".to_string(),
            speech_engines: vec!["google".to_string(), "whisper".to_string()],
            voice_samples_dir: None,
            labeled_samples_dir: None,
            think_time_min_ms: 100,
            think_time_max_ms: 500,
            operations_per_user: None,
        }
    }
}

/// Serialize a [`Duration`] as (fractional) seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.category, "all");
        assert_eq!(cfg.users, 10);
        assert_eq!(cfg.duration, Duration::from_secs(60));
        assert_eq!(cfg.ramp_up, Duration::from_secs(10));
        assert_eq!(cfg.options.speech_engine, "whisper");
        assert_eq!(cfg.options.speech_engines, vec!["google", "whisper"]);
        assert!(!cfg.options.use_limit_orders);
    }

    #[test]
    fn scenario_keys_are_read_from_top_level() {
        let json = r#"{
            "category": "order_processing",
            "iterations": 10,
            "use_limit_orders": true,
            "duration": 1.5
        }"#;
        let cfg: RunConfig = serde_json::from_str(json).expect("config should parse");
        assert_eq!(cfg.category, "order_processing");
        assert_eq!(cfg.options.iterations, Some(10));
        assert!(cfg.options.use_limit_orders);
        assert_eq!(cfg.duration, Duration::from_millis(1500));
        // Unspecified keys keep their defaults.
        assert_eq!(cfg.users, 10);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let result = serde_json::from_str::<RunConfig>(r#"{"duration": -1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn iterations_or_prefers_configured_value() {
        let mut cfg = RunConfig::default();
        assert_eq!(cfg.iterations_or(100), 100);
        cfg.options.iterations = Some(7);
        assert_eq!(cfg.iterations_or(100), 7);
    }

    #[test]
    fn resolve_seed_is_stable_once_drawn() {
        let mut cfg = RunConfig::default();
        let first = cfg.resolve_seed();
        assert_eq!(cfg.seed, Some(first));
        assert_eq!(cfg.resolve_seed(), first);

        cfg.seed = Some(42);
        assert_eq!(cfg.resolve_seed(), 42);
    }

    #[test]
    fn think_time_range_uses_millis() {
        let mut cfg = RunConfig::default();
        cfg.options.think_time_min_ms = 5;
        cfg.options.think_time_max_ms = 20;
        let range = cfg.think_time();
        assert_eq!(*range.start(), Duration::from_millis(5));
        assert_eq!(*range.end(), Duration::from_millis(20));
    }
}
