//! Query Corpus
//!
//! Append-only history of accepted queries. Each record carries its cluster
//! label, so the query list and the label list cannot drift apart.

use serde::{Deserialize, Serialize};

/// Label of a query that has not been through a clustering pass
pub const UNCLUSTERED: i32 = -1;

/// One accepted query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    /// Trimmed query text as received
    pub raw: String,
    pub normalized: String,
    /// Category the router picked for this text
    pub category: Option<String>,
    pub cluster_label: i32,
}

/// Ordered query history
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    records: Vec<QueryRecord>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a corpus from snapshot lists
    ///
    /// Label lists that disagree with the query count are padded with
    /// [`UNCLUSTERED`] or truncated. Returns the corpus and whether a repair
    /// was needed.
    pub fn restore<F>(queries: Vec<String>, mut labels: Vec<i32>, mut annotate: F) -> (Self, bool)
    where
        F: FnMut(&str) -> (String, Option<String>),
    {
        let repaired = labels.len() != queries.len();
        labels.resize(queries.len(), UNCLUSTERED);

        let records = queries
            .into_iter()
            .zip(labels)
            .map(|(raw, cluster_label)| {
                let (normalized, category) = annotate(&raw);
                QueryRecord {
                    raw,
                    normalized,
                    category,
                    cluster_label,
                }
            })
            .collect();
        (Corpus { records }, repaired)
    }

    /// Append an unclustered query
    pub fn push(&mut self, raw: &str, normalized: String, category: Option<String>) -> &QueryRecord {
        self.records.push(QueryRecord {
            raw: raw.to_string(),
            normalized,
            category,
            cluster_label: UNCLUSTERED,
        });
        &self.records[self.records.len() - 1]
    }

    /// Replace every label from a full clustering pass
    ///
    /// Returns false, leaving labels untouched, if the pass covered a
    /// different number of queries.
    pub fn relabel(&mut self, labels: &[i32]) -> bool {
        if labels.len() != self.records.len() {
            return false;
        }
        for (record, &label) in self.records.iter_mut().zip(labels) {
            record.cluster_label = label;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&QueryRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[QueryRecord] {
        &self.records
    }

    /// Raw query texts in insertion order
    pub fn texts(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.raw.as_str()).collect()
    }

    /// Snapshot query list
    pub fn queries(&self) -> Vec<String> {
        self.records.iter().map(|r| r.raw.clone()).collect()
    }

    /// Snapshot label list
    pub fn labels(&self) -> Vec<i32> {
        self.records.iter().map(|r| r.cluster_label).collect()
    }

    /// Number of queries carrying a cluster label
    pub fn clustered_len(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.cluster_label != UNCLUSTERED)
            .count()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotate(raw: &str) -> (String, Option<String>) {
        (raw.to_lowercase(), None)
    }

    #[test]
    fn test_push_is_unclustered() {
        let mut corpus = Corpus::new();
        let record = corpus.push("Late bus", "late bus".into(), Some("bus_delay".into()));
        assert_eq!(record.cluster_label, UNCLUSTERED);
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.labels(), vec![-1]);
    }

    #[test]
    fn test_relabel_requires_full_pass() {
        let mut corpus = Corpus::new();
        corpus.push("a", "a".into(), None);
        corpus.push("b", "b".into(), None);

        assert!(!corpus.relabel(&[0]));
        assert_eq!(corpus.labels(), vec![-1, -1]);

        assert!(corpus.relabel(&[1, 0]));
        assert_eq!(corpus.labels(), vec![1, 0]);
        assert_eq!(corpus.clustered_len(), 2);
    }

    #[test]
    fn test_restore_pads_short_labels() {
        let (corpus, repaired) =
            Corpus::restore(vec!["a".into(), "b".into(), "c".into()], vec![2], annotate);
        assert!(repaired);
        assert_eq!(corpus.labels(), vec![2, -1, -1]);
    }

    #[test]
    fn test_restore_truncates_long_labels() {
        let (corpus, repaired) = Corpus::restore(vec!["A".into()], vec![0, 1, 2], annotate);
        assert!(repaired);
        assert_eq!(corpus.labels(), vec![0]);
        assert_eq!(corpus.get(0).unwrap().normalized, "a");
    }

    #[test]
    fn test_restore_matching_lengths() {
        let (corpus, repaired) =
            Corpus::restore(vec!["a".into(), "b".into()], vec![0, 0], annotate);
        assert!(!repaired);
        assert_eq!(corpus.queries(), vec!["a".to_string(), "b".to_string()]);
    }
}
