//! Local filesystem snapshot store.
//!
//! The snapshot lives in a single JSON file. Writes go to a uniquely named
//! sibling temp file that is renamed over the target, so a crash mid-write
//! leaves the old snapshot intact and overlapping writers never share a
//! temp file.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::DisruptionSet;
use crate::storage::{Snapshot, SnapshotMetadata, SnapshotStore};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalSnapshotStore {
    path: PathBuf,
}

impl LocalSnapshotStore {
    /// Create a store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write bytes atomically (write to a fresh temp file, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir).await?;

        let target = self.path.clone();
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::Builder::new()
                .prefix(".snapshot-")
                .suffix(".tmp")
                .tempfile_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.flush()?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(std::io::Error::from)?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(e)))?
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[async_trait]
impl SnapshotStore for LocalSnapshotStore {
    async fn load(&self) -> Snapshot {
        let bytes = match self.read_bytes().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                log::info!("No previous snapshot at {}", self.path.display());
                return Snapshot::default();
            }
            Err(e) => {
                log::warn!(
                    "Failed to read snapshot {}: {}. Treating as empty.",
                    self.path.display(),
                    e
                );
                return Snapshot::default();
            }
        };

        match Snapshot::from_slice(&bytes) {
            Ok(snapshot) => {
                log::debug!(
                    "Loaded snapshot with {} disruptions from {}",
                    snapshot.disruptions.len(),
                    self.path.display()
                );
                snapshot
            }
            Err(e) => {
                log::warn!(
                    "Snapshot {} is unreadable: {}. Treating as empty.",
                    self.path.display(),
                    e
                );
                Snapshot::default()
            }
        }
    }

    async fn save(&self, disruptions: &DisruptionSet, metadata: &SnapshotMetadata) -> Result<()> {
        let bytes = Snapshot::to_vec(disruptions, metadata)?;
        self.write_bytes(&bytes).await?;
        log::info!(
            "Snapshot saved: {} disruptions to {} ({})",
            disruptions.len(),
            self.path.display(),
            &disruptions.fingerprint()[..12]
        );
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
