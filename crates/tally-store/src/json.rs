//! JSON file store.
//!
//! Layout: `{"version": 1, "users": {"<user key>": <record>, ...}}`. Saves
//! write a temp file in the same directory, sync it, and rename it over the
//! target, so a crash mid-write leaves the previous file intact.
//!
//! Updates hold an exclusive lock on a sibling `<file>.lock` from load to
//! save, so separate processes sharing the file never lose each other's
//! writes.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tally_core::{RecordStore, Snapshot, StoreError};
use tempfile::NamedTempFile;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Deserialize)]
struct Header {
    version: u32,
}

#[derive(Deserialize)]
struct StoreFile {
    #[serde(default)]
    users: Snapshot,
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    version: u32,
    users: &'a Snapshot,
}

/// Records kept in a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// A store at `path`. Nothing is touched until the first load or save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the lock file guarding updates.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    fn parent(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Blocks until this process holds the exclusive update lock. Released
    /// when the returned file is dropped.
    fn lock(&self) -> Result<File, StoreError> {
        let lock_path = self.lock_path();
        let lock_error = |source: std::io::Error| StoreError::Io {
            path: lock_path.clone(),
            source,
        };
        fs::create_dir_all(self.parent()).map_err(|err| self.io_error(err))?;
        let lock_file = File::create(&lock_path).map_err(lock_error)?;
        lock_file.lock_exclusive().map_err(lock_error)?;
        Ok(lock_file)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl RecordStore for JsonFileStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Snapshot::new()),
            Err(err) => return Err(self.io_error(err)),
        };
        if content.trim().is_empty() {
            tracing::debug!(path = %self.path.display(), "empty store file");
            return Ok(Snapshot::new());
        }

        let header: Header = serde_json::from_str(&content)?;
        if header.version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: header.version,
                expected: FORMAT_VERSION,
            });
        }
        let file: StoreFile = serde_json::from_str(&content)?;
        Ok(file.users)
    }

    fn save(&self, records: &Snapshot) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(&StoreFileRef {
            version: FORMAT_VERSION,
            users: records,
        })?;

        let parent = self.parent();
        fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;

        let mut temp_file = NamedTempFile::new_in(parent).map_err(|err| self.io_error(err))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|err| self.io_error(err))?;
        temp_file.flush().map_err(|err| self.io_error(err))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|err| self.io_error(err))?;
        temp_file
            .persist(&self.path)
            .map_err(|err| self.io_error(err.error))?;

        tracing::trace!(path = %self.path.display(), users = records.len(), "store saved");
        Ok(())
    }

    fn update(&self, apply: &mut dyn FnMut(&mut Snapshot) -> bool) -> Result<(), StoreError> {
        let _lock = self.lock()?;
        let mut records = self.load()?;
        if apply(&mut records) {
            self.save(&records)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta};
    use tally_core::{ActivityState, SessionLedger, UserKey, UserRecord};
    use tempfile::tempdir;

    use super::*;

    fn sample() -> Snapshot {
        let mut running = UserRecord::new("alice");
        running.banked_ms = 90_000;
        running.pause_count = 1;
        running.notified_milestones.insert(3600);
        running.activity = ActivityState::Running {
            started_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };

        let mut snapshot = Snapshot::new();
        snapshot.insert(UserKey::Known(42), running);
        snapshot.insert(
            UserKey::external_from_name("Guest").unwrap(),
            UserRecord::new("Guest"),
        );
        snapshot
    }

    #[test]
    fn missing_and_empty_files_load_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = JsonFileStore::new(&path);
        assert!(store.load().unwrap().is_empty());

        fs::write(&path, "  \n").unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_preserves_records() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/dir/store.json"));

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["users"]["42"]["activity"]["kind"], "running");
    }

    #[test]
    fn save_leaves_no_temp_files_behind() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("store.json"));
        store.save(&sample()).unwrap();
        store.save(&Snapshot::new()).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_is_an_error_and_is_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{\"version\": 1, \"users\": {").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Serde(_))));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{\"version\": 1, \"users\": {"
        );
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, r#"{"version": 7, "users": {}}"#).unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnsupportedVersion {
                found: 7,
                expected: 1
            }
        ));
    }

    #[test]
    fn records_missing_optional_fields_load_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(
            &path,
            r#"{"version": 1, "users": {"5": {"display_name": "eve", "banked_ms": 60000}}}"#,
        )
        .unwrap();

        let records = JsonFileStore::new(&path).load().unwrap();
        let eve = &records[&UserKey::Known(5)];
        assert_eq!(eve.activity, ActivityState::Idle);
        assert_eq!(eve.pause_count, 0);
        assert!(eve.sessions.is_empty());
    }

    #[test]
    fn ledgers_in_separate_handles_never_lose_updates() {
        const ADDS: i64 = 40;
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let key = UserKey::Known(1);
        SessionLedger::new(JsonFileStore::new(&path))
            .add_minutes(key, "alice", 1)
            .unwrap();

        std::thread::scope(|scope| {
            for _ in 0..2 {
                let ledger = SessionLedger::new(JsonFileStore::new(&path));
                scope.spawn(move || {
                    for _ in 0..ADDS {
                        assert!(ledger.add_minutes(key, "alice", 1).unwrap());
                    }
                });
            }
        });

        let total = SessionLedger::new(JsonFileStore::new(&path))
            .total_time(key)
            .unwrap();
        assert_eq!(total, TimeDelta::minutes(2 * ADDS + 1));
        assert!(JsonFileStore::new(&path).lock_path().exists());
    }

    #[test]
    fn update_skips_save_when_nothing_changed() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("store.json"));
        store.update(&mut |_| false).unwrap();
        assert!(!store.path().exists());
        assert!(store.lock_path().exists());
    }
}
