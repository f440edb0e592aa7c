//! Durable record of forwarded booking ids
//!
//! Stored as a JSON array of strings. Every write rewrites the whole set via
//! temp file + fsync + rename so a reader never observes a torn file. Reads
//! fail open: a missing or corrupt file is treated as an empty set.

use crate::domain::{BookingId, ProcessedSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to write processed set {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode processed set: {0}")]
    Encode(#[from] serde_json::Error),
}

/// File-backed processed-set store with an in-memory mirror
pub struct ProcessedStore {
    path: PathBuf,
    ids: ProcessedSet,
}

impl ProcessedStore {
    /// Open the store, loading whatever is on disk
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = Self::load(&path);
        info!(path = %path.display(), processed = %ids.len(), "processed_store_loaded");
        Self { path, ids }
    }

    /// Read the set from disk, never failing
    pub fn load(path: &Path) -> ProcessedSet {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "processed_store_missing");
                return ProcessedSet::new();
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "processed_store_read_failed");
                return ProcessedSet::new();
            }
        };

        if content.trim().is_empty() {
            return ProcessedSet::new();
        }

        match serde_json::from_str::<Vec<BookingId>>(&content) {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                error!(path = %path.display(), error = %e, "processed_store_corrupt");
                ProcessedSet::new()
            }
        }
    }

    /// Rewrite the whole set atomically
    pub fn save(path: &Path, ids: &ProcessedSet) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write { path: path.display().to_string(), source };

        // BTreeSet iteration keeps the file sorted
        let json = serde_json::to_vec_pretty(&ids.iter().collect::<Vec<_>>())?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(write_err)?;

        // Temp file is removed on drop if any step below fails
        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(&json).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;

        debug!(path = %path.display(), processed = %ids.len(), "processed_store_written");
        Ok(())
    }

    /// Add an id and persist before returning
    ///
    /// On write failure the id stays in memory so this process does not
    /// submit it again; only a restart can lose it.
    pub fn record_success(&mut self, id: &BookingId) -> Result<(), StoreError> {
        if !self.ids.insert(id.clone()) {
            warn!(booking_id = %id, "processed_store_duplicate_record");
            return Ok(());
        }
        Self::save(&self.path, &self.ids)
    }

    pub fn contains(&self, id: &BookingId) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> &ProcessedSet {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
