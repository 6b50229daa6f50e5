//! Counter extraction from a snapshot.

use tally_scrape::Snapshot;

/// The only family the accountant reads.
pub const ACTION_FAMILY: &str = "action";

/// Label that partitions samples by tenant.
pub const NAMESPACE_LABEL: &str = "namespace";

/// Namespace of the server's own internal workloads.
pub const DEFAULT_EXCLUDED_NAMESPACE: &str = "temporal_system";

/// Selects which `action` samples contribute to the count.
///
/// A sample in the excluded namespace never counts. When an include
/// namespace is set, only samples in that namespace count; otherwise every
/// non-excluded sample does, including ones without a namespace label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter {
    include: Option<String>,
    exclude: String,
}

impl Default for LabelFilter {
    fn default() -> Self {
        Self {
            include: None,
            exclude: DEFAULT_EXCLUDED_NAMESPACE.to_string(),
        }
    }
}

impl LabelFilter {
    /// An empty include namespace is the same as none.
    pub fn new(include: Option<String>, exclude: impl Into<String>) -> Self {
        Self {
            include: include.filter(|ns| !ns.is_empty()),
            exclude: exclude.into(),
        }
    }

    pub fn include(&self) -> Option<&str> {
        self.include.as_deref()
    }

    pub fn exclude(&self) -> &str {
        &self.exclude
    }

    pub fn admits(&self, namespace: Option<&str>) -> bool {
        if namespace == Some(self.exclude.as_str()) {
            return false;
        }
        match &self.include {
            Some(include) => namespace == Some(include.as_str()),
            None => true,
        }
    }
}

/// Sum the values of every qualifying sample in the `action` family.
///
/// Returns 0 when the family is absent or nothing qualifies.
pub fn extract(snapshot: &Snapshot, filter: &LabelFilter) -> f64 {
    snapshot
        .family(ACTION_FAMILY)
        .flat_map(|family| &family.samples)
        .filter(|sample| filter.admits(sample.label(NAMESPACE_LABEL)))
        .map(|sample| sample.value)
        .sum()
}
