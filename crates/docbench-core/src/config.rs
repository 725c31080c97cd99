//! Configuration for evaluation thresholds

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Default score a `document_type` field must exceed to count as a correct classification.
pub const DEFAULT_CLASSIFICATION_THRESHOLD: f64 = 0.8;

/// Default score a field must reach to count as a correct prediction.
pub const DEFAULT_FIELD_THRESHOLD: f64 = 0.75;

/// Score thresholds used by the metrics aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// `document_type` score must be strictly above this (0.0-1.0)
    pub classification_threshold: f64,

    /// Field score must be at or above this (0.0-1.0)
    pub field_threshold: f64,
}

impl EvaluationConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `DOCBENCH_CLASSIFICATION_THRESHOLD`: 0.0-1.0 (default: 0.8)
    /// - `DOCBENCH_FIELD_THRESHOLD`: 0.0-1.0 (default: 0.75)
    ///
    /// Unparseable values fall back to the defaults.
    #[must_use = "creates config from environment variables"]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply any threshold environment variables on top of `self`.
    #[must_use = "returns config with environment overrides applied"]
    pub fn with_env_overrides(self) -> Self {
        let classification_threshold = env::var("DOCBENCH_CLASSIFICATION_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(self.classification_threshold);

        let field_threshold = env::var("DOCBENCH_FIELD_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(self.field_threshold);

        Self {
            classification_threshold,
            field_threshold,
        }
    }

    /// Check that both thresholds are finite values in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] naming the offending threshold.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("classification_threshold", self.classification_threshold),
            ("field_threshold", self.field_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(BenchError::Config(format!(
                    "{name} must be between 0.0 and 1.0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for EvaluationConfig {
    #[inline]
    fn default() -> Self {
        Self {
            classification_threshold: DEFAULT_CLASSIFICATION_THRESHOLD,
            field_threshold: DEFAULT_FIELD_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EvaluationConfig::default();
        assert_eq!(config.classification_threshold, 0.8);
        assert_eq!(config.field_threshold, 0.75);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env() {
        env::set_var("DOCBENCH_CLASSIFICATION_THRESHOLD", "0.9");
        env::set_var("DOCBENCH_FIELD_THRESHOLD", "not-a-number");

        let config = EvaluationConfig::from_env();
        assert_eq!(config.classification_threshold, 0.9);
        assert_eq!(config.field_threshold, 0.75);

        env::remove_var("DOCBENCH_CLASSIFICATION_THRESHOLD");
        env::remove_var("DOCBENCH_FIELD_THRESHOLD");
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = EvaluationConfig {
            classification_threshold: 0.8,
            field_threshold: -0.1,
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("field_threshold"));
    }

    #[test]
    fn test_validate_rejects_nan() {
        let config = EvaluationConfig {
            classification_threshold: f64::NAN,
            field_threshold: 0.75,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_like_deserialize_uses_defaults() {
        let config: EvaluationConfig =
            serde_json::from_str(r#"{"field_threshold": 0.6}"#).unwrap();
        assert_eq!(config.classification_threshold, 0.8);
        assert_eq!(config.field_threshold, 0.6);
    }
}
