//! Storage abstractions for snapshot persistence.
//!
//! A snapshot is the disruption set observed by the previous run plus the
//! schedule position it was captured in:
//!
//! ```text
//! {
//!   "metadata": { "date": "2026-02-02", "block": "morning", "slot": 1 },
//!   "disruptions": [ { "id": "central", "name": "Central", "details": "..." } ]
//! }
//! ```
//!
//! Older files hold the bare `disruptions` array; both shapes load.
//!
//! Lines skipped because their fetch failed are kept out of `disruptions`.
//! Their last known records travel in `metadata.carried` and only serve as
//! the comparison baseline for the next run.

pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{DisruptionRecord, DisruptionSet, RunInfo};

// Re-export for convenience
pub use local::LocalSnapshotStore;

/// Schedule position a snapshot was captured in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotMetadata {
    /// UTC capture date
    pub date: NaiveDate,

    /// Period block (e.g., "morning")
    pub block: String,

    /// 1-based slot number, 0 for manual runs
    pub slot: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,

    /// Last known records of lines that could not be fetched this run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub carried: Vec<DisruptionRecord>,
}

impl SnapshotMetadata {
    pub fn for_run(run: &RunInfo, now: DateTime<Utc>) -> Self {
        Self {
            date: now.date_naive(),
            block: run.block.clone(),
            slot: run.slot,
            captured_at: Some(now),
            carried: Vec::new(),
        }
    }

    /// Attach records carried over for lines without data this run.
    pub fn with_carried(mut self, carried: Vec<DisruptionRecord>) -> Self {
        self.carried = carried;
        self
    }

    /// Whether this snapshot was captured in the same period as `run`.
    pub fn same_period(&self, run: &RunInfo, today: NaiveDate) -> bool {
        self.date == today && self.block == run.block
    }
}

/// Previous run's state. An absent or unreadable file is an empty snapshot
/// with `found` unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub metadata: Option<SnapshotMetadata>,
    pub disruptions: DisruptionSet,

    /// Whether a readable snapshot was loaded
    pub found: bool,
}

impl Snapshot {
    /// Parse either the wrapped or the bare-array shape.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let snapshot = match serde_json::from_slice(bytes)? {
            SnapshotFile::Wrapped {
                metadata,
                disruptions,
            } => Self {
                metadata,
                disruptions,
                found: true,
            },
            SnapshotFile::Bare(disruptions) => Self {
                metadata: None,
                disruptions,
                found: true,
            },
        };
        Ok(snapshot)
    }

    /// Set to compare the next run against: the observed disruptions plus
    /// any records carried over for skipped lines.
    pub fn baseline(&self) -> DisruptionSet {
        let carried = self
            .metadata
            .iter()
            .flat_map(|m| m.carried.iter().cloned());
        self.disruptions.iter().cloned().chain(carried).collect()
    }

    /// Serialize in the wrapped shape.
    pub fn to_vec(disruptions: &DisruptionSet, metadata: &SnapshotMetadata) -> Result<Vec<u8>> {
        let document = SnapshotDocument {
            metadata,
            disruptions,
        };
        Ok(serde_json::to_vec_pretty(&document)?)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Wrapped {
        #[serde(default)]
        metadata: Option<SnapshotMetadata>,
        disruptions: DisruptionSet,
    },
    Bare(DisruptionSet),
}

#[derive(Serialize)]
struct SnapshotDocument<'a> {
    metadata: &'a SnapshotMetadata,
    disruptions: &'a DisruptionSet,
}

/// Trait for snapshot storage backends.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the previous snapshot. Never fails: missing or corrupt state is
    /// reported as an empty snapshot.
    async fn load(&self) -> Snapshot;

    /// Replace the stored snapshot. Readers see either the old or the new
    /// snapshot, never a partial write.
    async fn save(&self, disruptions: &DisruptionSet, metadata: &SnapshotMetadata) -> Result<()>;

    /// Human-readable location for logs.
    fn location(&self) -> String;
}
