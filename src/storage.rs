//! RocksDB-backed storage for the venue.
//!
//! One authoritative store shared by interactive callers and the scheduler.
//! Multi-row changes go through [`Batch`] so a transition and its index
//! updates commit atomically, and every read-modify-write cycle runs under
//! the commit lock so two concurrent callers cannot both observe a row's
//! pre-transition state and both commit.

use crate::errors::StorageError;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct VenueStorage {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl VenueStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path).map_err(|e| StorageError::OpenFailed(e.to_string()))?;
        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Serialize a read-modify-write cycle. Hold the guard from the first
    /// read until [`Self::batch_write`] returns; the losing caller of a race
    /// then re-reads post-commit state and fails its state guard cleanly.
    pub fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.db.get(key).ok().flatten()
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db
            .put(key, value)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.db
            .delete(key)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }

    /// Commit a batch atomically: either every put/delete in it lands, or
    /// none do.
    pub fn batch_write(&self, batch: Batch) -> Result<(), StorageError> {
        self.db
            .write(batch.inner)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }

    /// All rows whose key starts with `prefix`, in key order.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut rows = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward))
        {
            let Ok((key, value)) = item else { break };
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        rows
    }

    /// Allocate the next id from a persisted per-entity sequence. Callers
    /// must hold the commit lock.
    pub fn next_id(&self, entity: &str) -> Result<u64, StorageError> {
        let key = format!("seq:{entity}");
        let next = match self.get(key.as_bytes()) {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.try_into().map_err(|_| {
                    StorageError::CorruptedData(format!("invalid sequence value for {entity}"))
                })?;
                u64::from_be_bytes(raw) + 1
            }
            None => 1,
        };
        self.put(key.as_bytes(), &next.to_be_bytes())?;
        Ok(next)
    }
}

/// Atomic multi-row write: a transition's row update and its secondary-index
/// maintenance always travel in the same batch.
pub struct Batch {
    inner: WriteBatch,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            inner: WriteBatch::default(),
        }
    }

    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        self.inner.put(key, value);
    }

    pub fn delete(&mut self, key: impl AsRef<[u8]>) {
        self.inner.delete(key);
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}
