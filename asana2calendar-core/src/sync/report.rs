use std::collections::BTreeMap;

/// Writes performed on one adapter during a pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AdapterCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl AdapterCounts {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Outcome of one pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PassReport {
    pub adapters: BTreeMap<String, AdapterCounts>,
    pub links_created: usize,
    pub links_removed: usize,
    /// Malformed or rejected records, retried next pass.
    pub skipped: usize,
    /// Links left unwritten because their newest sides share a timestamp.
    pub ties: usize,
    /// Links left untouched because an adapter they need was unavailable.
    pub deferred: usize,
    pub unavailable: Vec<String>,
    /// The subset of `unavailable` marked required.
    pub required_unavailable: Vec<String>,
}

impl PassReport {
    pub(crate) fn counts(&mut self, adapter: &str) -> &mut AdapterCounts {
        self.adapters.entry(adapter.to_string()).or_default()
    }

    pub(crate) fn mark_unavailable(&mut self, adapter: &str) {
        if !self.unavailable.iter().any(|a| a == adapter) {
            self.unavailable.push(adapter.to_string());
        }
    }

    /// Number of create, update and delete calls that succeeded.
    pub fn writes(&self) -> usize {
        self.adapters.values().map(AdapterCounts::total).sum()
    }

    pub fn is_quiet(&self) -> bool {
        self.writes() == 0 && self.links_created == 0 && self.links_removed == 0
    }

    pub fn failed(&self) -> bool {
        !self.required_unavailable.is_empty()
    }
}
