#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use resift::filter::StageContext;
use resift::import::{import_vcf, ImportSummary, ReferenceKind};
use resift::site::ChromStyle;
use resift::store::{Query, TabularStore};

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("RESIFT_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set RESIFT_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

/// One candidate site as a single-sample VCF data line.
#[derive(Debug, Clone, Copy)]
pub struct Site {
    pub chrom: &'static str,
    pub pos: u64,
    pub reference: char,
    pub alternate: char,
    pub quality: f64,
    pub ref_count: u32,
    pub alt_count: u32,
}

impl Site {
    /// A heterozygous A>G call with quality 30.
    pub fn ag(pos: u64, ref_count: u32, alt_count: u32) -> Self {
        Self {
            chrom: "chr1",
            pos,
            reference: 'A',
            alternate: 'G',
            quality: 30.0,
            ref_count,
            alt_count,
        }
    }

    pub fn bases(mut self, reference: char, alternate: char) -> Self {
        self.reference = reference;
        self.alternate = alternate;
        self
    }

    pub fn quality(mut self, quality: f64) -> Self {
        self.quality = quality;
        self
    }

    pub fn vcf_line(&self) -> String {
        let genotype = match (self.ref_count, self.alt_count) {
            (_, 0) => "0/0",
            (0, _) => "1/1",
            _ => "0/1",
        };
        format!(
            "{}\t{}\t.\t{}\t{}\t{}\tPASS\t.\tGT:AD:DP\t{}:{},{}:{}",
            self.chrom,
            self.pos,
            self.reference,
            self.alternate,
            self.quality,
            genotype,
            self.ref_count,
            self.alt_count,
            self.ref_count + self.alt_count
        )
    }
}

const VCF_HEADER: &str = "##fileformat=VCFv4.2
##FILTER=<ID=PASS,Description=\"All filters passed\">
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
##FORMAT=<ID=AD,Number=R,Type=Integer,Description=\"Allelic depths\">
##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read depth\">
";

/// A single-sample VCF holding `sites`, with a contig line per chromosome.
pub fn vcf(sites: &[Site]) -> String {
    let mut text = String::from(VCF_HEADER);
    let mut contigs: Vec<&str> = Vec::new();
    for site in sites {
        if !contigs.contains(&site.chrom) {
            contigs.push(site.chrom);
        }
    }
    for contig in contigs {
        text.push_str(&format!("##contig=<ID={contig}>\n"));
    }
    text.push_str("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tsample\n");
    for site in sites {
        text.push_str(&site.vcf_line());
        text.push('\n');
    }
    text
}

pub fn import(store: &mut dyn TabularStore, table: &str, sites: &[Site]) -> ImportSummary {
    let mut file = tempfile::Builder::new()
        .suffix(".vcf")
        .tempfile()
        .expect("temp VCF");
    file.write_all(vcf(sites).as_bytes()).expect("write VCF");
    file.flush().expect("flush VCF");
    import_vcf(
        store,
        file.path(),
        table,
        ChromStyle::Prefixed,
        &StageContext::default(),
    )
    .expect("import VCF")
}

pub fn load_reference(store: &mut dyn TabularStore, kind: ReferenceKind, table: &str, text: &str) {
    kind.load(store, text.as_bytes(), table, &StageContext::default())
        .expect("load reference");
}

/// `(CHROM, POS)` of every row, in storage order.
pub fn keys(store: &dyn TabularStore, table: &str) -> Vec<(String, u64)> {
    store
        .select(&Query::table(table).columns(&["CHROM", "POS"]))
        .expect("select keys")
        .map(|row| {
            (
                row[0].as_str().expect("chrom").to_string(),
                row[1].as_i64().expect("pos") as u64,
            )
        })
        .collect()
}

pub fn positions(store: &dyn TabularStore, table: &str) -> Vec<u64> {
    keys(store, table).into_iter().map(|(_, pos)| pos).collect()
}

/// One text column of every row, in storage order.
pub fn text_column(store: &dyn TabularStore, table: &str, column: &str) -> Vec<String> {
    store
        .select(&Query::table(table).columns(&[column]))
        .expect("select column")
        .map(|row| row[0].as_str().unwrap_or_default().to_string())
        .collect()
}
