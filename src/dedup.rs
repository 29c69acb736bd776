//! Deduplication Tracker
//!
//! Two scopes of "already shown" bookkeeping over rendered responses:
//!
//! - session scope, keyed by the lower-cased query text, lives for the process
//! - persistent scope, keyed by category (or `intent:<name>`), is snapshotted
//!
//! A rendered response is available only when it is absent from both.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Session + persistent used-response sets
#[derive(Debug, Default, Clone)]
pub struct DedupTracker {
    session: HashMap<String, HashSet<String>>,
    persistent: BTreeMap<String, BTreeSet<String>>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `rendered` was already shown for this query text or scope
    pub fn is_used(&self, query_key: &str, scope_key: &str, rendered: &str) -> bool {
        self.session
            .get(query_key)
            .map_or(false, |set| set.contains(rendered))
            || self
                .persistent
                .get(scope_key)
                .map_or(false, |set| set.contains(rendered))
    }

    /// Record a shown response in both scopes
    ///
    /// Returns false when the persistent scope already held it.
    pub fn record(&mut self, query_key: &str, scope_key: &str, rendered: &str) -> bool {
        self.session
            .entry(query_key.to_string())
            .or_default()
            .insert(rendered.to_string());
        self.persistent
            .entry(scope_key.to_string())
            .or_default()
            .insert(rendered.to_string())
    }

    /// Responses ever shown for a scope
    pub fn persistent(&self, scope_key: &str) -> Option<&BTreeSet<String>> {
        self.persistent.get(scope_key)
    }

    /// Responses shown for one query text in this process
    pub fn session(&self, query_key: &str) -> Option<&HashSet<String>> {
        self.session.get(query_key)
    }

    /// Forget session-scope history; persistent history is untouched
    pub fn reset_session(&mut self) {
        self.session.clear();
    }

    /// Persistent sets for the snapshot
    pub fn export_persistent(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.persistent.clone()
    }

    /// Replace persistent sets from a snapshot
    pub fn restore_persistent(&mut self, persistent: BTreeMap<String, BTreeSet<String>>) {
        self.persistent = persistent;
    }

    /// Total number of persistent entries across scopes
    pub fn persistent_len(&self) -> usize {
        self.persistent.values().map(BTreeSet::len).sum()
    }
}
