//! Chromosome naming.
//!
//! Sample tables and reference tables disagree on the `chr` prefix often
//! enough that every join goes through [`ChromKey`], which compares names
//! with the prefix stripped.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const PREFIX: &str = "chr";

/// Naming convention applied to chromosome names on import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChromStyle {
    /// `chr1`, `chrX`, ...
    #[default]
    Prefixed,
    /// `1`, `X`, ...
    Bare,
}

impl FromStr for ChromStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prefixed" | "chr" => Ok(ChromStyle::Prefixed),
            "bare" | "none" => Ok(ChromStyle::Bare),
            other => Err(format!("unknown chromosome style '{other}'")),
        }
    }
}

fn strip_prefix(name: &str) -> &str {
    match name.get(..PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(PREFIX) && name.len() > PREFIX.len() => {
            &name[PREFIX.len()..]
        }
        _ => name,
    }
}

/// Rewrite `name` to follow `style`.
pub fn normalize_chrom(name: &str, style: ChromStyle) -> String {
    let bare = strip_prefix(name.trim());
    match style {
        ChromStyle::Prefixed => format!("{PREFIX}{bare}"),
        ChromStyle::Bare => bare.to_string(),
    }
}

/// Prefix-insensitive chromosome identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChromKey(String);

impl ChromKey {
    /// Key for `name`, with or without the `chr` prefix.
    pub fn new(name: &str) -> Self {
        ChromKey(strip_prefix(name.trim()).to_string())
    }
}

impl fmt::Display for ChromKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Join key for `(chromosome, position)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteKey {
    /// Chromosome identity.
    pub chrom: ChromKey,
    /// 1-based coordinate.
    pub position: u64,
}

impl SiteKey {
    /// Key for a chromosome name and position.
    pub fn new(chrom: &str, position: u64) -> Self {
        Self {
            chrom: ChromKey::new(chrom),
            position,
        }
    }
}
