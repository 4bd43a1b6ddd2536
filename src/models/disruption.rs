// src/models/disruption.rs

//! Disruption records, sets, and the text reduction rules that make them
//! comparable across runs.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::LineRegistry;
use crate::utils::collapse_whitespace;

/// Separator placed between distinct upstream messages for one line.
pub const DETAILS_SEPARATOR: &str = " | ";

static SEPARATOR_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\|\s*").expect("valid separator pattern"));

/// One line's current disruption. Absence of a record means good service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisruptionRecord {
    #[serde(rename = "id")]
    pub line_id: String,

    #[serde(rename = "name")]
    pub line_name: String,

    pub details: String,
}

impl DisruptionRecord {
    pub fn new(
        line_id: impl Into<String>,
        line_name: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            line_id: line_id.into(),
            line_name: line_name.into(),
            details: details.into(),
        }
    }

    /// Details in comparison form, see [`normalize_details`].
    pub fn normalized_details(&self) -> String {
        normalize_details(&self.details)
    }
}

/// Reduce raw upstream messages for one line to a single details string.
///
/// Messages are trimmed, empties dropped, exact duplicates removed, then
/// sorted case-insensitively (ties broken by the exact text) and joined with
/// [`DETAILS_SEPARATOR`]. Deduplication is case-sensitive: "Delay" and
/// "delay" are both kept. Returns `None` when nothing is left.
pub fn reduce_messages<I, S>(messages: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut unique: Vec<String> = messages
        .into_iter()
        .map(|m| m.as_ref().trim().to_string())
        .filter(|m| !m.is_empty())
        .filter(|m| seen.insert(m.clone()))
        .collect();

    if unique.is_empty() {
        return None;
    }

    unique.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
    Some(unique.join(DETAILS_SEPARATOR))
}

/// Comparison form of a details string: whitespace collapsed, lowercased,
/// and separator spacing standardized.
pub fn normalize_details(details: &str) -> String {
    let collapsed = collapse_whitespace(details);
    SEPARATOR_SPACING
        .replace_all(&collapsed.to_lowercase(), DETAILS_SEPARATOR)
        .into_owned()
}

/// Ordered collection of disruption records with at most one record per line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<DisruptionRecord>", into = "Vec<DisruptionRecord>")]
pub struct DisruptionSet {
    records: Vec<DisruptionRecord>,
}

impl DisruptionSet {
    /// Build a set, keeping the first record seen for each line.
    pub fn new(records: impl IntoIterator<Item = DisruptionRecord>) -> Self {
        let mut seen = HashSet::new();
        let records = records
            .into_iter()
            .filter(|r| seen.insert(r.line_id.clone()))
            .collect();
        Self { records }
    }

    pub fn records(&self) -> &[DisruptionRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &DisruptionRecord> {
        self.records.iter()
    }

    pub fn get(&self, line_id: &str) -> Option<&DisruptionRecord> {
        self.records.iter().find(|r| r.line_id == line_id)
    }

    pub fn contains(&self, line_id: &str) -> bool {
        self.get(line_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copy of the set without the given lines.
    pub fn without(&self, line_ids: &[String]) -> Self {
        Self {
            records: self
                .records
                .iter()
                .filter(|r| !line_ids.contains(&r.line_id))
                .cloned()
                .collect(),
        }
    }

    /// Reorder records by registry position; unknown lines keep their
    /// relative order after all known lines.
    pub fn in_registry_order(mut self, registry: &LineRegistry) -> Self {
        self.records
            .sort_by_key(|r| registry.position(&r.line_id).unwrap_or(usize::MAX));
        self
    }

    /// SHA-256 hex digest of the serialized set.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(&self.records).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

impl From<Vec<DisruptionRecord>> for DisruptionSet {
    fn from(records: Vec<DisruptionRecord>) -> Self {
        Self::new(records)
    }
}

impl From<DisruptionSet> for Vec<DisruptionRecord> {
    fn from(set: DisruptionSet) -> Self {
        set.records
    }
}

impl FromIterator<DisruptionRecord> for DisruptionSet {
    fn from_iter<T: IntoIterator<Item = DisruptionRecord>>(iter: T) -> Self {
        Self::new(iter)
    }
}
