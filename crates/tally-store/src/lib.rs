//! Durable record stores.
//!
//! Two [`RecordStore`] backends:
//! - [`JsonFileStore`]: a single JSON document, replaced atomically on save
//! - [`SqliteStore`]: one row per user, replaced in a single transaction
//!
//! Both load and save the complete record set on every call.

mod json;
mod sqlite;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tally_core::{RecordStore, StoreError};

pub use json::{FORMAT_VERSION, JsonFileStore};
pub use sqlite::SqliteStore;

/// Which backend to persist records with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Json,
    Sqlite,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Opens the configured backend at `path`.
pub fn open_store(backend: StoreBackend, path: &Path) -> Result<Box<dyn RecordStore>, StoreError> {
    tracing::debug!(%backend, path = %path.display(), "opening record store");
    match backend {
        StoreBackend::Json => Ok(Box::new(JsonFileStore::new(path))),
        StoreBackend::Sqlite => Ok(Box::new(SqliteStore::open(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use tally_core::{SessionLedger, UserKey};
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn backend_names_are_lowercase() {
        assert_eq!(serde_json::to_string(&StoreBackend::Sqlite).unwrap(), "\"sqlite\"");
        assert_eq!(
            serde_json::from_str::<StoreBackend>("\"json\"").unwrap(),
            StoreBackend::Json
        );
    }

    #[test]
    fn ledger_state_is_shared_through_either_backend() {
        let dir = tempdir().unwrap();
        for (backend, file) in [
            (StoreBackend::Json, "store.json"),
            (StoreBackend::Sqlite, "store.db"),
        ] {
            let path = dir.path().join(file);
            let writer = SessionLedger::new(open_store(backend, &path).unwrap());
            assert!(writer.add_minutes(UserKey::Known(1), "alice", 30).unwrap());

            let reader = SessionLedger::new(open_store(backend, &path).unwrap());
            assert_eq!(
                reader.total_time(UserKey::Known(1)).unwrap().num_minutes(),
                30,
                "{backend}"
            );
        }
    }
}
