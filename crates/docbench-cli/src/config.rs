//! `.docbench.toml` discovery and threshold resolution.
//!
//! Configuration files can be placed in:
//! - User home directory: `~/.docbench.toml` (user defaults)
//! - Project directory: `./.docbench.toml` (project defaults)
//!
//! Precedence order (highest to lowest):
//! 1. Command-line flags (`--classification-threshold`, `--field-threshold`)
//! 2. Environment (`DOCBENCH_CLASSIFICATION_THRESHOLD`, `DOCBENCH_FIELD_THRESHOLD`)
//! 3. Project config
//! 4. User config
//! 5. Built-in defaults

use anyhow::{Context, Result};
use colored::Colorize;
use docbench_core::EvaluationConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the configuration file in the home and project directories.
pub const CONFIG_FILE_NAME: &str = ".docbench.toml";

/// Configuration file structure for `.docbench.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Score thresholds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<ThresholdConfig>,

    /// Default settings for the batch command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// `document_type` score must exceed this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_threshold: Option<f64>,

    /// Field score must reach this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Default output directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Default cumulative metrics file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_into: Option<PathBuf>,
}

impl Config {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content).map_err(|e| {
            eprintln!(
                "{} Failed to parse config file: {}",
                "Error:".red().bold(),
                path.display()
            );
            eprintln!("{} {}", "Parse error:".yellow().bold(), e);
            eprintln!();
            eprintln!("{} Configuration file syntax:", "Help:".cyan().bold());
            eprintln!("  [thresholds]");
            eprintln!("  classification_threshold = 0.8");
            eprintln!("  field_threshold = 0.75");
            anyhow::anyhow!("Failed to parse config file: {e}")
        })
    }

    /// Load and merge the user and project configs.
    pub fn discover() -> Self {
        let user = dirs::home_dir().and_then(|home| Self::load_optional(&home.join(CONFIG_FILE_NAME)));
        let project = Self::load_optional(Path::new(CONFIG_FILE_NAME));
        Self::merge(user, project)
    }

    fn load_optional(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match Self::load_from_file(path) {
            Ok(config) => Some(config),
            Err(e) => {
                eprintln!(
                    "{} Failed to load config from {}: {}",
                    "Warning:".yellow().bold(),
                    path.display(),
                    e
                );
                None
            }
        }
    }

    /// Merge configs field by field, project over user.
    pub fn merge(user_config: Option<Self>, project_config: Option<Self>) -> Self {
        let mut merged = user_config.unwrap_or_default();

        if let Some(project) = project_config {
            if let Some(thresholds) = project.thresholds {
                let mut merged_thresholds = merged.thresholds.unwrap_or_default();
                if let Some(value) = thresholds.classification_threshold {
                    merged_thresholds.classification_threshold = Some(value);
                }
                if let Some(value) = thresholds.field_threshold {
                    merged_thresholds.field_threshold = Some(value);
                }
                merged.thresholds = Some(merged_thresholds);
            }

            if let Some(batch) = project.batch {
                let mut merged_batch = merged.batch.unwrap_or_default();
                if let Some(output) = batch.output {
                    merged_batch.output = Some(output);
                }
                if let Some(merge_into) = batch.merge_into {
                    merged_batch.merge_into = Some(merge_into);
                }
                merged.batch = Some(merged_batch);
            }
        }

        merged
    }

    /// Thresholds from this config, then environment, then flags, validated.
    pub fn evaluation_config(
        &self,
        classification_flag: Option<f64>,
        field_flag: Option<f64>,
    ) -> Result<EvaluationConfig> {
        let mut config = EvaluationConfig::default();
        if let Some(thresholds) = self.thresholds {
            if let Some(value) = thresholds.classification_threshold {
                config.classification_threshold = value;
            }
            if let Some(value) = thresholds.field_threshold {
                config.field_threshold = value;
            }
        }

        let mut config = config.with_env_overrides();
        if let Some(value) = classification_flag {
            config.classification_threshold = value;
        }
        if let Some(value) = field_flag {
            config.field_threshold = value;
        }

        config.validate().context("Invalid evaluation thresholds")?;
        Ok(config)
    }
}
