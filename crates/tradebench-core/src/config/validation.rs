use std::time::Duration;

use crate::config::RunConfig;
use crate::error::BenchError;

/// Upper bound for `duration` and `ramp_up` (a little over 136 years).
pub const MAX_DURATION: Duration = Duration::from_secs(u32::MAX as u64);

/// Validate a [`RunConfig`] and return every problem found.
///
/// An empty `Vec` means the configuration is usable. Whether `category`
/// names a registered scenario is checked by the registry, not here.
pub fn validate_config(config: &RunConfig) -> Vec<BenchError> {
    let mut errors = Vec::new();

    if config.category.trim().is_empty() {
        errors.push(BenchError::Config("category must not be empty".to_string()));
    }

    if config.users == 0 {
        errors.push(BenchError::Config("users must be at least 1".to_string()));
    }

    if config.duration.is_zero() {
        errors.push(BenchError::Config("duration must be greater than zero".to_string()));
    }

    for (field, value) in [("duration", config.duration), ("ramp_up", config.ramp_up)] {
        if value > MAX_DURATION {
            errors.push(BenchError::Config(format!(
                "{field} must not exceed {}s, got {}s",
                MAX_DURATION.as_secs(),
                value.as_secs()
            )));
        }
    }

    if !config.regression_threshold_pct.is_finite() || config.regression_threshold_pct < 0.0 {
        errors.push(BenchError::Config(format!(
            "regression_threshold_pct must be a non-negative number, got {}",
            config.regression_threshold_pct
        )));
    }

    let opts = &config.options;

    if opts.iterations == Some(0) {
        errors.push(BenchError::Config("iterations must be at least 1".to_string()));
    }

    if opts.operations_per_user == Some(0) {
        errors.push(BenchError::Config(
            "operations_per_user must be at least 1".to_string(),
        ));
    }

    if opts.think_time_min_ms > opts.think_time_max_ms {
        errors.push(BenchError::Config(format!(
            "think_time_min_ms ({}) must not exceed think_time_max_ms ({})",
            opts.think_time_min_ms, opts.think_time_max_ms
        )));
    }

    if opts.speech_engine.trim().is_empty() {
        errors.push(BenchError::Config("speech_engine must not be empty".to_string()));
    }

    if opts.speech_engines.is_empty() {
        errors.push(BenchError::Config(
            "speech_engines must list at least one engine".to_string(),
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&RunConfig::default()).is_empty());
    }

    #[test]
    fn zero_users_is_rejected() {
        let cfg = RunConfig { users: 0, ..RunConfig::default() };
        let errors = validate_config(&cfg);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("users"));
    }

    #[test]
    fn zero_duration_is_rejected() {
        let cfg = RunConfig { duration: Duration::ZERO, ..RunConfig::default() };
        assert!(validate_config(&cfg)
            .iter()
            .any(|e| e.to_string().contains("duration")));
    }

    #[test]
    fn unbounded_durations_are_rejected() {
        let cfg = RunConfig {
            duration: Duration::from_secs(u64::MAX / 2),
            ramp_up: Duration::MAX,
            ..RunConfig::default()
        };
        let errors = validate_config(&cfg);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].to_string().contains("duration must not exceed"));
        assert!(errors[1].to_string().contains("ramp_up must not exceed"));

        let at_limit = RunConfig {
            duration: MAX_DURATION,
            ..RunConfig::default()
        };
        assert!(validate_config(&at_limit).is_empty());
    }

    #[test]
    fn inverted_think_time_is_rejected() {
        let mut cfg = RunConfig::default();
        cfg.options.think_time_min_ms = 50;
        cfg.options.think_time_max_ms = 10;
        assert!(validate_config(&cfg)
            .iter()
            .any(|e| e.to_string().contains("think_time_min_ms")));
    }

    #[test]
    fn all_violations_are_reported_together() {
        let mut cfg = RunConfig {
            users: 0,
            regression_threshold_pct: -5.0,
            ..RunConfig::default()
        };
        cfg.options.iterations = Some(0);
        cfg.options.speech_engines.clear();
        let errors = validate_config(&cfg);
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().all(BenchError::is_fatal));
    }
}
