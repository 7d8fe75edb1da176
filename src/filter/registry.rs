use std::collections::{BTreeMap, HashMap};

use crate::error::{FilterError, Result};
use crate::filter::{
    DnaRnaFilter, EditingTypeFilter, FilterStage, FisherFdrFilter, KnownSnpFilter, LlrFilter,
    QualityFilter, RepeatRegionFilter, SpliceJunctionFilter, StageContext, StageOutcome,
    StageParams,
};
use crate::store::TabularStore;

type Constructor = fn(&StageParams) -> Result<Box<dyn FilterStage>>;

/// Metadata describing a registered stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInfo {
    /// Stage tag.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Accepted parameter keys.
    pub parameters: Vec<String>,
}

#[derive(Debug)]
struct StageEntry {
    description: &'static str,
    parameters: &'static [&'static str],
    build: Constructor,
}

/// Stage constructors keyed by tag.
#[derive(Debug, Default)]
pub struct StageRegistry {
    entries: HashMap<String, StageEntry>,
}

fn boxed<S: FilterStage + 'static>(stage: Result<S>) -> Result<Box<dyn FilterStage>> {
    stage.map(|s| Box::new(s) as Box<dyn FilterStage>)
}

impl StageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry holding every built-in stage.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            QualityFilter::NAME,
            QualityFilter::DESCRIPTION,
            &["quality", "depth"],
            |p| boxed(QualityFilter::from_params(p)),
        );
        registry.register(
            KnownSnpFilter::NAME,
            KnownSnpFilter::DESCRIPTION,
            &["reference"],
            |p| boxed(KnownSnpFilter::from_params(p)),
        );
        registry.register(
            RepeatRegionFilter::NAME,
            RepeatRegionFilter::DESCRIPTION,
            &["reference", "overlap"],
            |p| boxed(RepeatRegionFilter::from_params(p)),
        );
        registry.register(
            SpliceJunctionFilter::NAME,
            SpliceJunctionFilter::DESCRIPTION,
            &["reference", "edge"],
            |p| boxed(SpliceJunctionFilter::from_params(p)),
        );
        registry.register(
            EditingTypeFilter::NAME,
            EditingTypeFilter::DESCRIPTION,
            &["ref_alt"],
            |p| boxed(EditingTypeFilter::from_params(p)),
        );
        registry.register(
            DnaRnaFilter::NAME,
            DnaRnaFilter::DESCRIPTION,
            &["dna_table"],
            |p| boxed(DnaRnaFilter::from_params(p)),
        );
        registry.register(
            LlrFilter::NAME,
            LlrFilter::DESCRIPTION,
            &["dna_table", "threshold"],
            |p| boxed(LlrFilter::from_params(p)),
        );
        registry.register(
            FisherFdrFilter::NAME,
            FisherFdrFilter::DESCRIPTION,
            &["darned", "p_value", "fdr"],
            |p| boxed(FisherFdrFilter::from_params(p)),
        );
        registry
    }

    /// Register a constructor under `name`, replacing any previous entry.
    pub fn register(
        &mut self,
        name: &str,
        description: &'static str,
        parameters: &'static [&'static str],
        build: Constructor,
    ) {
        self.entries.insert(
            name.to_string(),
            StageEntry {
                description,
                parameters,
                build,
            },
        );
    }

    /// Build the stage `name`, validating its parameters.
    ///
    /// Keys the stage does not accept are rejected so typos fail fast.
    pub fn build(&self, name: &str, params: &BTreeMap<String, String>) -> Result<Box<dyn FilterStage>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| FilterError::UnknownStage(name.to_string()))?;
        if let Some(unknown) = params.keys().find(|k| !entry.parameters.iter().any(|p| *p == k.as_str())) {
            return Err(FilterError::invalid(
                name,
                unknown,
                format!("not accepted; expected one of {}", entry.parameters.join(", ")),
            ));
        }
        (entry.build)(&StageParams::new(name, params.clone()))
    }

    /// All registered stages, sorted by name.
    pub fn list(&self) -> Vec<StageInfo> {
        let mut stages: Vec<StageInfo> = self
            .entries
            .iter()
            .map(|(name, entry)| StageInfo {
                name: name.clone(),
                description: entry.description.to_string(),
                parameters: entry.parameters.iter().map(|p| p.to_string()).collect(),
            })
            .collect();
        stages.sort_by(|a, b| a.name.cmp(&b.name));
        stages
    }
}

/// Build the built-in stage `stage` and apply it from `previous` to `current`.
pub fn perform_filter(
    store: &mut dyn TabularStore,
    stage: &str,
    previous: &str,
    current: &str,
    params: &BTreeMap<String, String>,
) -> Result<StageOutcome> {
    let stage = StageRegistry::with_builtin().build(stage, params)?;
    stage.apply(store, previous, current, &StageContext::default())
}
