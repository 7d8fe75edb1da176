//! JSON pipeline configuration.
//!
//! ```json
//! {
//!   "sample": "HepG2",
//!   "source": "rnavcf",
//!   "batch_size": 10000,
//!   "chrom_style": "prefixed",
//!   "stages": [
//!     { "stage": "etfilter", "params": { "ref_alt": "AG" } },
//!     { "stage": "qcfilter", "params": { "quality": "20", "depth": "6" }, "dedup": true }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::DEFAULT_BATCH_SIZE;
use crate::site::ChromStyle;

/// Errors raised while reading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Config path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid configuration JSON.
    #[error("invalid config {path}: {source}")]
    Parse {
        /// Config path.
        path: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// Parsed, but semantically unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_source() -> String {
    "rnavcf".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// One stage of a configured pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage tag, e.g. `qcfilter`.
    pub stage: String,
    /// Parameters, validated by the stage constructor.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Collapse duplicate rows of the stage output.
    #[serde(default)]
    pub dedup: bool,
}

/// A sample's pipeline definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Sample name; the first part of every table name.
    pub sample: String,
    /// Input source tag (`rnavcf` or `dnavcf`).
    #[serde(default = "default_source")]
    pub source: String,
    /// Rows per committed insert batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Chromosome naming used at import.
    #[serde(default)]
    pub chrom_style: ChromStyle,
    /// Stages in application order.
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
    /// An empty pipeline for `sample` with default settings.
    pub fn new(sample: &str) -> Self {
        Self {
            sample: sample.to_string(),
            source: default_source(),
            batch_size: DEFAULT_BATCH_SIZE,
            chrom_style: ChromStyle::default(),
            stages: Vec::new(),
        }
    }

    /// Parse and validate a configuration document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sample.trim().is_empty() {
            return Err(ConfigError::Invalid("sample must not be empty".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if let Some(blank) = self.stages.iter().position(|s| s.stage.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("stage #{} has no name", blank + 1)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = PipelineConfig::from_json(r#"{"sample": "s1", "stages": [{"stage": "etfilter", "params": {"ref_alt": "AG"}}]}"#).unwrap();
        assert_eq!(config.source, "rnavcf");
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.chrom_style, ChromStyle::Prefixed);
        assert!(!config.stages[0].dedup);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"sample": "s1", "chrom_style": "bare", "batch_size": 5, "stages": [{{"stage": "qcfilter", "params": {{"quality": "20", "depth": "6"}}, "dedup": true}}]}}"#
        )
        .unwrap();
        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.chrom_style, ChromStyle::Bare);
        assert_eq!(config.batch_size, 5);
        assert!(config.stages[0].dedup);
    }

    #[test]
    fn rejects_unusable_configs() {
        assert!(matches!(
            PipelineConfig::from_json(r#"{"sample": " "}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json(r#"{"sample": "s", "batch_size": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json("{"),
            Err(ConfigError::Parse { .. })
        ));
    }
}
