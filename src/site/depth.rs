use std::fmt;
use std::str::FromStr;

use crate::error::FilterError;

/// Read counts supporting the reference and the alternate base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AlleleDepth {
    /// Reads supporting the reference base.
    pub ref_count: u32,
    /// Reads supporting the alternate base.
    pub alt_count: u32,
}

impl AlleleDepth {
    /// Construct from counts.
    pub fn new(ref_count: u32, alt_count: u32) -> Self {
        Self {
            ref_count,
            alt_count,
        }
    }

    /// `ref + alt`.
    pub fn total(&self) -> u64 {
        self.ref_count as u64 + self.alt_count as u64
    }

    /// `alt / (ref + alt)`, or `None` for zero depth.
    pub fn editing_level(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.alt_count as f64 / total as f64),
        }
    }

    /// From the integer `AD` vector of one VCF sample.
    ///
    /// Counts past the first alternate allele are ignored. Missing values
    /// (decoded as negative sentinels) are rejected.
    pub fn from_ad(values: &[i32]) -> Result<Self, FilterError> {
        let count = |i: usize| {
            values
                .get(i)
                .and_then(|&v| u32::try_from(v).ok())
                .ok_or_else(|| FilterError::Data(format!("incomplete AD values {values:?}")))
        };
        Ok(Self::new(count(0)?, count(1)?))
    }

    /// Parse `"ref/alt"` or the VCF `AD` form `"ref,alt[,...]"`.
    ///
    /// Extra alternate counts in the VCF form are ignored; only the first
    /// alternate allele is tracked.
    pub fn parse(raw: &str) -> Result<Self, FilterError> {
        let raw = raw.trim();
        let mut parts = raw.split(['/', ',']);
        let mut next = || -> Result<u32, FilterError> {
            parts
                .next()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(|| FilterError::Data(format!("malformed allele depth '{raw}'")))
        };
        let ref_count = next()?;
        let alt_count = next()?;
        if raw.contains('/') && raw.contains(',') {
            return Err(FilterError::Data(format!("malformed allele depth '{raw}'")));
        }
        Ok(Self::new(ref_count, alt_count))
    }
}

impl FromStr for AlleleDepth {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AlleleDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ref_count, self.alt_count)
    }
}
