use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use crate::error::{FilterError, Result};

/// String parameters for one stage, as supplied by a config or the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageParams {
    stage: String,
    values: BTreeMap<String, String>,
}

impl StageParams {
    /// Wrap a parameter map for `stage`.
    pub fn new(stage: &str, values: BTreeMap<String, String>) -> Self {
        Self {
            stage: stage.to_string(),
            values,
        }
    }

    /// Build from `(key, value)` pairs.
    pub fn from_pairs(stage: &str, pairs: &[(&str, &str)]) -> Self {
        Self::new(
            stage,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// Stage these parameters belong to.
    pub fn stage(&self) -> &str {
        &self.stage
    }

    fn raw(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str, raw: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        raw.parse::<T>()
            .map_err(|e| FilterError::invalid(&self.stage, key, format!("'{raw}': {e}")))
    }

    /// A required, parsed parameter.
    pub fn required<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.raw(key).ok_or_else(|| FilterError::MissingParameter {
            stage: self.stage.clone(),
            parameter: key.to_string(),
        })?;
        self.parse(key, raw)
    }

    /// An optional, parsed parameter with a default.
    pub fn optional<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.raw(key) {
            Some(raw) => self.parse(key, raw),
            None => Ok(default),
        }
    }

    /// A required table name.
    pub fn table(&self, key: &str) -> Result<String> {
        self.required::<String>(key)
    }
}
