//! Diff calculation for change-gated notifications.
//!
//! Compares the disruption set fetched this run against the previous
//! snapshot, sorts every affected line into exactly one of new, updated,
//! resolved or unchanged, and decides whether anything is worth sending.

use std::collections::HashMap;

use crate::models::{DisruptionRecord, DisruptionSet};

/// Change bucket of a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    New,
    Updated,
    Resolved,
    Unchanged,
}

/// Per-line classification. New, updated and unchanged hold the current
/// record in current-set order; resolved holds the previous record in
/// previous-set order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub new: Vec<DisruptionRecord>,
    pub updated: Vec<DisruptionRecord>,
    pub resolved: Vec<DisruptionRecord>,
    pub unchanged: Vec<DisruptionRecord>,
}

impl Classification {
    /// Bucket a line landed in, if it appeared on either side.
    pub fn kind_of(&self, line_id: &str) -> Option<ChangeKind> {
        let in_bucket = |records: &[DisruptionRecord]| records.iter().any(|r| r.line_id == line_id);
        if in_bucket(&self.new) {
            Some(ChangeKind::New)
        } else if in_bucket(&self.updated) {
            Some(ChangeKind::Updated)
        } else if in_bucket(&self.resolved) {
            Some(ChangeKind::Resolved)
        } else if in_bucket(&self.unchanged) {
            Some(ChangeKind::Unchanged)
        } else {
            None
        }
    }

    fn line_ids(records: &[DisruptionRecord]) -> Vec<&str> {
        records.iter().map(|r| r.line_id.as_str()).collect()
    }

    pub fn new_ids(&self) -> Vec<&str> {
        Self::line_ids(&self.new)
    }

    pub fn updated_ids(&self) -> Vec<&str> {
        Self::line_ids(&self.updated)
    }

    pub fn resolved_ids(&self) -> Vec<&str> {
        Self::line_ids(&self.resolved)
    }

    pub fn unchanged_ids(&self) -> Vec<&str> {
        Self::line_ids(&self.unchanged)
    }
}

/// Classification plus the send decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub classification: Classification,
    pub should_notify: bool,
}

impl DiffResult {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        let c = &self.classification;
        !c.new.is_empty() || !c.updated.is_empty() || !c.resolved.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        let c = &self.classification;
        c.new.len() + c.updated.len() + c.resolved.len()
    }
}

/// Calculator for computing diffs between disruption sets.
#[derive(Debug, Clone)]
pub struct StateDiffer {
    /// Short-circuit identical serialized sets to "all unchanged"
    fast_path: bool,
}

impl StateDiffer {
    /// Create a differ that short-circuits identical sets.
    pub fn new() -> Self {
        Self { fast_path: true }
    }

    /// Create a differ that always compares line by line.
    pub fn itemized() -> Self {
        Self { fast_path: false }
    }

    /// Calculate the diff between the current set and the previous snapshot.
    pub fn calculate(&self, current: &DisruptionSet, previous: &DisruptionSet) -> DiffResult {
        if self.fast_path && current.fingerprint() == previous.fingerprint() {
            return DiffResult {
                classification: Classification {
                    unchanged: current.records().to_vec(),
                    ..Classification::default()
                },
                should_notify: false,
            };
        }

        let prev_map: HashMap<&str, &DisruptionRecord> =
            previous.iter().map(|r| (r.line_id.as_str(), r)).collect();
        let curr_map: HashMap<&str, &DisruptionRecord> =
            current.iter().map(|r| (r.line_id.as_str(), r)).collect();

        let mut classification = Classification::default();

        for record in current.iter() {
            match prev_map.get(record.line_id.as_str()) {
                None => classification.new.push(record.clone()),
                Some(prev) if prev.normalized_details() == record.normalized_details() => {
                    classification.unchanged.push(record.clone())
                }
                Some(_) => classification.updated.push(record.clone()),
            }
        }

        classification.resolved = previous
            .iter()
            .filter(|r| !curr_map.contains_key(r.line_id.as_str()))
            .cloned()
            .collect();

        let mut result = DiffResult {
            classification,
            should_notify: false,
        };
        result.should_notify = result.has_changes();
        result
    }
}

impl Default for StateDiffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to calculate a diff.
pub fn calculate_diff(current: &DisruptionSet, previous: &DisruptionSet) -> DiffResult {
    StateDiffer::new().calculate(current, previous)
}
