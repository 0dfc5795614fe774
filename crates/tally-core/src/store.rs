//! The record store seam.
//!
//! A store persists the whole set of user records at once: callers load the
//! full snapshot, mutate it, and save it back. Every write is therefore
//! O(number of users), which is fine for tens of users and is the scaling
//! boundary of this design.
//!
//! Mutations go through [`RecordStore::update`], which backends that may be
//! shared between processes override to hold an exclusive lock from load
//! to save.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::record::UserRecord;
use crate::types::{UserKey, ValidationError};

/// All tracked users, keyed by identity.
pub type Snapshot = BTreeMap<UserKey, UserRecord>;

/// Record store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Stored record data could not be encoded or decoded.
    #[error("malformed record data: {0}")]
    Serde(#[from] serde_json::Error),
    /// A stored user key is not valid.
    #[error("invalid stored user key: {0}")]
    InvalidKey(#[from] ValidationError),
    /// The stored data was written by an incompatible version.
    #[error("unsupported store version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    /// An error from a storage backend.
    #[error("{backend} error: {source}")]
    Backend {
        backend: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Durable mapping from user key to record.
pub trait RecordStore: Send + Sync {
    /// Loads every record. A store that has never been written is empty.
    fn load(&self) -> Result<Snapshot, StoreError>;

    /// Replaces every record with `records`.
    fn save(&self, records: &Snapshot) -> Result<(), StoreError>;

    /// Loads every record, hands them to `apply`, and saves them if `apply`
    /// returns `true`. `apply` runs exactly once when this returns `Ok`.
    ///
    /// The default holds no lock of its own.
    fn update(&self, apply: &mut dyn FnMut(&mut Snapshot) -> bool) -> Result<(), StoreError> {
        let mut records = self.load()?;
        if apply(&mut records) {
            self.save(&records)?;
        }
        Ok(())
    }
}

impl<S: RecordStore + ?Sized> RecordStore for Box<S> {
    fn load(&self) -> Result<Snapshot, StoreError> {
        (**self).load()
    }

    fn save(&self, records: &Snapshot) -> Result<(), StoreError> {
        (**self).save(records)
    }
    fn update(&self, apply: &mut dyn FnMut(&mut Snapshot) -> bool) -> Result<(), StoreError> {
        (**self).update(apply)
    }
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn load(&self) -> Result<Snapshot, StoreError> {
        (**self).load()
    }

    fn save(&self, records: &Snapshot) -> Result<(), StoreError> {
        (**self).save(records)
    }
    fn update(&self, apply: &mut dyn FnMut(&mut Snapshot) -> bool) -> Result<(), StoreError> {
        (**self).update(apply)
    }
}

/// A store that keeps records in memory. Useful for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Snapshot>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `save` fail until turned off again.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl RecordStore for MemoryStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, records: &Snapshot) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::other("injected write failure"),
            });
        }
        *self.records.lock().unwrap_or_else(PoisonError::into_inner) = records.clone();
        Ok(())
    }
}
