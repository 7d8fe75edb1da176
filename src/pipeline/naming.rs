use std::fmt;

/// Deterministic table name encoding a sample, its source and every stage
/// applied so far, e.g. `s1_rnavcf_etfilter_A_G_qcfilter_20_6`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

/// Keep ASCII alphanumerics and `_`; `.` becomes `p` and `-` becomes `m`.
pub fn sanitize_token(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            '.' => Some('p'),
            '-' => Some('m'),
            c if c.is_ascii_alphanumeric() || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}

impl TableName {
    /// `{sample}_{source}`.
    pub fn base(sample: &str, source: &str) -> Self {
        TableName(format!("{}_{}", sanitize_token(sample), sanitize_token(source)))
    }

    /// Name of the table produced by applying stage `tag` to this one.
    pub fn with_stage(&self, tag: &str, tokens: &[String]) -> Self {
        let mut name = format!("{}_{}", self.0, sanitize_token(tag));
        for token in tokens.iter().map(|t| sanitize_token(t)).filter(|t| !t.is_empty()) {
            name.push('_');
            name.push_str(&token);
        }
        TableName(name)
    }

    /// The name as stored.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_chain_names() {
        let name = TableName::base("HepG2", "rnavcf")
            .with_stage("etfilter", &["A".into(), "G".into()])
            .with_stage("qcfilter", &["20".into(), "6".into()]);
        assert_eq!(name.as_str(), "HepG2_rnavcf_etfilter_A_G_qcfilter_20_6");
    }

    #[test]
    fn tokens_are_sanitized() {
        assert_eq!(sanitize_token("0.01"), "0p01");
        assert_eq!(sanitize_token("-4.5"), "m4p5");
        assert_eq!(sanitize_token("a b/c"), "abc");
        let name = TableName::base("s", "rnavcf").with_stage("x", &["".into(), "?".into()]);
        assert_eq!(name.as_str(), "s_rnavcf_x");
    }
}
