//! Per-source history persistence.
//!
//! The merger needs the immediately preceding state for a source on every
//! run, so histories are durable artifacts keyed by source id and
//! overwritten wholesale on each save. The store is a trait so the process
//! step can be exercised against an in-memory implementation.

use crate::parquet::{HistoryFileError, read_history, write_history_atomic};
use crate::paths::history_file_name;
use ahash::AHashMap;
use sl_types::{SourceId, TrackedRecord};
use std::path::PathBuf;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("history artifact: {0}")]
    File(HistoryFileError),
    #[error("schema drift in stored history: missing column {0}")]
    SchemaDrift(&'static str),
}

impl From<HistoryFileError> for StoreError {
    fn from(e: HistoryFileError) -> Self {
        match e {
            HistoryFileError::SchemaDrift(column) => StoreError::SchemaDrift(column),
            other => StoreError::File(other),
        }
    }
}

pub trait HistoryStore {
    /// Previously recorded history for `source`; empty on first sight,
    /// never an error for a merely missing artifact.
    fn load(&self, source: &SourceId) -> Result<Vec<TrackedRecord>, StoreError>;

    /// Overwrite the stored history for `source` wholesale. The caller is
    /// responsible for folding old and new state before saving.
    fn save(&self, source: &SourceId, rows: &[TrackedRecord]) -> Result<(), StoreError>;
}

/// One Parquet file per source. Saves go through a temp file in the store
/// directory and an atomic rename, so a crash mid-write cannot leave a
/// corrupt previous state for the next run.
pub struct FsHistoryStore {
    dir: PathBuf,
    zstd_level: i32,
}

impl FsHistoryStore {
    pub fn new(dir: impl Into<PathBuf>, zstd_level: i32) -> Self {
        Self {
            dir: dir.into(),
            zstd_level,
        }
    }

    pub fn path_for(&self, source: &SourceId) -> PathBuf {
        self.dir.join(history_file_name(source))
    }
}

impl HistoryStore for FsHistoryStore {
    fn load(&self, source: &SourceId) -> Result<Vec<TrackedRecord>, StoreError> {
        let path = self.path_for(source);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Ok(read_history(&path)?)
    }

    fn save(&self, source: &SourceId, rows: &[TrackedRecord]) -> Result<(), StoreError> {
        write_history_atomic(&self.path_for(source), rows, self.zstd_level)?;
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryHistoryStore {
    inner: RwLock<AHashMap<SourceId, Vec<TrackedRecord>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self, source: &SourceId) -> Result<Vec<TrackedRecord>, StoreError> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(source).cloned().unwrap_or_default())
    }

    fn save(&self, source: &SourceId, rows: &[TrackedRecord]) -> Result<(), StoreError> {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.insert(source.clone(), rows.to_vec());
        Ok(())
    }
}
