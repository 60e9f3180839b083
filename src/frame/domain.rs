//! Categorical domains: the sorted, deduplicated set of labels of a column.
//!
//! Codes are assigned in lexicographic label order, never in order of first
//! appearance, so the same multiset of labels always yields the same codes
//! regardless of row order.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    /// Labels sorted lexicographically; the position is the code.
    labels: Vec<String>,
    /// Reverse lookup: label -> code.
    index: HashMap<String, u32>,
}

impl Domain {
    /// Build a domain from any (possibly repeated, unordered) labels.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sorted: BTreeSet<String> = labels
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        let labels: Vec<String> = sorted.into_iter().collect();
        let index = labels
            .iter()
            .enumerate()
            .map(|(code, label)| (label.clone(), code as u32))
            .collect();
        Self { labels, index }
    }

    /// Sorted union of two domains.
    pub fn union(&self, other: &Domain) -> Self {
        Self::from_labels(self.labels.iter().chain(other.labels.iter()))
    }

    pub fn code_of(&self, label: &str) -> Option<u32> {
        self.index.get(label).copied()
    }

    pub fn label(&self, code: u32) -> Option<&str> {
        self.labels.get(code as usize).map(|s| s.as_str())
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Code translation table from this domain into `target`.
    /// Entry `i` is the target code of this domain's label `i`.
    pub fn remap_into(&self, target: &Domain) -> Vec<Option<u32>> {
        self.labels.iter().map(|l| target.code_of(l)).collect()
    }
}
