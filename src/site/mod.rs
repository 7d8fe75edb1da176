//! Candidate editing-site records and the canonical site table layout.

mod chrom;
mod depth;

pub use chrom::{normalize_chrom, ChromKey, ChromStyle, SiteKey};
pub use depth::AlleleDepth;

use crate::error::FilterError;
use crate::store::{ColumnSpec, ColumnType, Row, Schema, Value};

/// Column names of the canonical site table.
#[allow(missing_docs)]
pub mod columns {
    pub const CHROM: &str = "CHROM";
    pub const POS: &str = "POS";
    pub const ID: &str = "ID";
    pub const REF: &str = "REF";
    pub const ALT: &str = "ALT";
    pub const QUAL: &str = "QUAL";
    pub const FILTER: &str = "FILTER";
    pub const INFO: &str = "INFO";
    pub const GT: &str = "GT";
    pub const REF_COUNT: &str = "REF_COUNT";
    pub const ALT_COUNT: &str = "ALT_COUNT";
    pub const DP: &str = "DP";
    pub const GQ: &str = "GQ";
    pub const PL: &str = "PL";
    pub const ALU: &str = "ALU";
    pub const STRAND: &str = "STRAND";
    pub const P_VALUE: &str = "P_VALUE";
    pub const FDR: &str = "FDR";
    pub const LEVEL: &str = "LEVEL";
}

/// Stored value of a derived statistic that has not been computed.
pub const UNSET_STAT: f64 = -1.0;

/// Schema shared by every site table in a pipeline.
pub fn site_schema() -> Schema {
    use columns::*;
    Schema::new(vec![
        ColumnSpec::new(CHROM, ColumnType::Text),
        ColumnSpec::new(POS, ColumnType::Int),
        ColumnSpec::new(ID, ColumnType::Text),
        ColumnSpec::new(REF, ColumnType::Text),
        ColumnSpec::new(ALT, ColumnType::Text),
        ColumnSpec::new(QUAL, ColumnType::Float),
        ColumnSpec::new(FILTER, ColumnType::Text),
        ColumnSpec::new(INFO, ColumnType::Text),
        ColumnSpec::new(GT, ColumnType::Text),
        ColumnSpec::new(REF_COUNT, ColumnType::Int),
        ColumnSpec::new(ALT_COUNT, ColumnType::Int),
        ColumnSpec::new(DP, ColumnType::Int),
        ColumnSpec::new(GQ, ColumnType::Text),
        ColumnSpec::new(PL, ColumnType::Text),
        ColumnSpec::new(ALU, ColumnType::Text).with_default("F"),
        ColumnSpec::new(STRAND, ColumnType::Text).with_default("+"),
        ColumnSpec::new(P_VALUE, ColumnType::Float).with_default(UNSET_STAT),
        ColumnSpec::new(FDR, ColumnType::Float).with_default(UNSET_STAT),
        ColumnSpec::new(LEVEL, ColumnType::Float).with_default(UNSET_STAT),
    ])
}

/// Strand a site is read from after editing-type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    /// Forward genomic strand.
    Forward,
    /// Reverse-complement strand.
    Reverse,
}

impl Strand {
    /// Stored symbol (`+` or `-`).
    pub fn symbol(self) -> &'static str {
        match self {
            Strand::Forward => "+",
            Strand::Reverse => "-",
        }
    }
}

/// One candidate variant / editing site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    /// Chromosome name as stored.
    pub chromosome: String,
    /// 1-based coordinate.
    pub position: u64,
    /// Variant identifier (`.` when absent in the source).
    pub id: Option<String>,
    /// Reference base.
    pub reference_base: char,
    /// Alternate base.
    pub alternate_base: char,
    /// Phred-scaled site quality.
    pub quality: f64,
    /// FILTER column, e.g. `PASS`.
    pub filter_status: String,
    /// Raw INFO blob.
    pub info: String,
    /// Genotype call, e.g. `0/1`.
    pub genotype: String,
    /// Reads supporting the reference and the alternate base.
    pub allele_depth: AlleleDepth,
    /// Total read depth (`DP`).
    pub total_depth: Option<u32>,
    /// Passthrough `GQ` field.
    pub genotype_quality: Option<String>,
    /// Passthrough `PL` field.
    pub phred_likelihoods: Option<String>,
    /// Site lies inside a SINE/Alu repeat.
    pub is_alu: bool,
    /// Strand the editing type was matched on.
    pub strand: Strand,
    /// Fisher's exact test p-value, once computed.
    pub p_value: Option<f64>,
    /// Benjamini-Hochberg adjusted p-value, once computed.
    pub fdr: Option<f64>,
}

impl SiteRecord {
    /// Editing level, always derived from the allele counts.
    pub fn editing_level(&self) -> Option<f64> {
        self.allele_depth.editing_level()
    }

    /// Prefix-insensitive `(chromosome, position)` key.
    pub fn key(&self) -> SiteKey {
        SiteKey::new(&self.chromosome, self.position)
    }

    /// Row in [`site_schema`] column order.
    pub fn to_row(&self) -> Row {
        let stat = |v: Option<f64>| Value::Float(v.unwrap_or(UNSET_STAT));
        vec![
            Value::Text(self.chromosome.clone()),
            Value::Int(self.position as i64),
            Value::Text(self.id.clone().unwrap_or_else(|| ".".to_string())),
            Value::from(self.reference_base),
            Value::from(self.alternate_base),
            Value::Float(self.quality),
            Value::Text(self.filter_status.clone()),
            Value::Text(self.info.clone()),
            Value::Text(self.genotype.clone()),
            Value::Int(self.allele_depth.ref_count as i64),
            Value::Int(self.allele_depth.alt_count as i64),
            Value::from(self.total_depth),
            Value::from(self.genotype_quality.clone()),
            Value::from(self.phred_likelihoods.clone()),
            Value::from(if self.is_alu { "T" } else { "F" }),
            Value::from(self.strand.symbol()),
            stat(self.p_value),
            stat(self.fdr),
            stat(self.editing_level()),
        ]
    }

    /// Rebuild a record from a full-width site row.
    pub fn from_row(row: &Row) -> Result<Self, FilterError> {
        let schema = site_schema();
        if row.len() != schema.len() {
            return Err(FilterError::Data(format!(
                "site row has {} cells, expected {}",
                row.len(),
                schema.len()
            )));
        }
        let text = |i: usize| row[i].as_str().map(str::to_string);
        let base = |i: usize, name: &str| {
            row[i]
                .as_str()
                .and_then(|s| s.chars().next())
                .ok_or_else(|| FilterError::Data(format!("missing {name} base")))
        };
        let count = |i: usize, name: &str| {
            row[i]
                .as_i64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| FilterError::Data(format!("{name} is not a non-negative integer")))
        };
        let stat = |i: usize| row[i].as_f64().filter(|v| *v != UNSET_STAT);

        let position = row[1]
            .as_i64()
            .filter(|p| *p >= 1)
            .ok_or_else(|| FilterError::Data(format!("invalid position {}", row[1])))?;

        Ok(Self {
            chromosome: text(0).ok_or_else(|| FilterError::Data("missing chromosome".into()))?,
            position: position as u64,
            id: text(2).filter(|id| id != "."),
            reference_base: base(3, "reference")?,
            alternate_base: base(4, "alternate")?,
            quality: row[5].as_f64().unwrap_or(0.0),
            filter_status: text(6).unwrap_or_default(),
            info: text(7).unwrap_or_default(),
            genotype: text(8).unwrap_or_default(),
            allele_depth: AlleleDepth::new(count(9, "REF_COUNT")?, count(10, "ALT_COUNT")?),
            total_depth: row[11].as_i64().and_then(|n| u32::try_from(n).ok()),
            genotype_quality: text(12),
            phred_likelihoods: text(13),
            is_alu: row[14].as_str() == Some("T"),
            strand: if row[15].as_str() == Some("-") {
                Strand::Reverse
            } else {
                Strand::Forward
            },
            p_value: stat(16),
            fdr: stat(17),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::site;
    use super::*;

    #[test]
    fn row_round_trip_preserves_record() {
        let mut record = site("chr1", 42, 3, 7, 30.0);
        record.is_alu = true;
        record.strand = Strand::Reverse;
        record.p_value = Some(0.01);
        let row = record.to_row();
        assert!(site_schema().validate("t", &row).is_ok());
        assert_eq!(SiteRecord::from_row(&row).unwrap(), record);
    }

    #[test]
    fn level_column_is_derived_from_counts() {
        let row = site("chr1", 1, 3, 1, 30.0).to_row();
        let level = row[site_schema().index_of(columns::LEVEL).unwrap()].as_f64();
        assert_eq!(level, Some(0.25));

        let zero = site("chr1", 1, 0, 0, 30.0).to_row();
        let level = zero[site_schema().index_of(columns::LEVEL).unwrap()].as_f64();
        assert_eq!(level, Some(UNSET_STAT));
    }

    #[test]
    fn from_row_rejects_bad_position() {
        let mut row = site("chr1", 1, 1, 1, 30.0).to_row();
        row[1] = Value::Int(0);
        assert!(matches!(SiteRecord::from_row(&row), Err(FilterError::Data(_))));
    }
}
