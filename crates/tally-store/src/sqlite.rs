//! SQLite store.
//!
//! One row per user in `user_records`, holding the record as JSON. Saves
//! replace the whole table inside a single transaction; updates read and
//! write inside one `IMMEDIATE` transaction.
//!
//! `rusqlite::Connection` is `Send` but not `Sync`, so the connection sits
//! behind a mutex.

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior, params};
use tally_core::{RecordStore, Snapshot, StoreError, UserKey, UserRecord};

/// How long a connection waits for another writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend {
        backend: "sqlite",
        source: Box::new(err),
    }
}

/// Records kept in a SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens a database at the given path, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path).map_err(backend)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(backend)?;
        Self::init(conn)
    }

    /// Opens an in-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().map_err(backend)?)
    }

    /// Creates the schema. Idempotent.
    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS user_records (
                user_key TEXT PRIMARY KEY,
                record TEXT NOT NULL
            );
            ",
        )
        .map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn load_records(conn: &Connection) -> Result<Snapshot, StoreError> {
    let mut stmt = conn
        .prepare("SELECT user_key, record FROM user_records ORDER BY user_key")
        .map_err(backend)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(backend)?;

    let mut records = Snapshot::new();
    for row in rows {
        let (key, record) = row.map_err(backend)?;
        let key: UserKey = key.parse()?;
        let record: UserRecord = serde_json::from_str(&record)?;
        records.insert(key, record);
    }
    Ok(records)
}

fn replace_records(tx: &Transaction<'_>, records: &Snapshot) -> Result<(), StoreError> {
    tx.execute("DELETE FROM user_records", []).map_err(backend)?;
    let mut stmt = tx
        .prepare("INSERT INTO user_records (user_key, record) VALUES (?, ?)")
        .map_err(backend)?;
    for (key, record) in records {
        let record = serde_json::to_string(record)?;
        stmt.execute(params![key.to_string(), record])
            .map_err(backend)?;
    }
    Ok(())
}

impl RecordStore for SqliteStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        load_records(&conn)
    }

    fn save(&self, records: &Snapshot) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction().map_err(backend)?;
        replace_records(&tx, records)?;
        tx.commit().map_err(backend)?;
        Ok(())
    }

    /// Takes the database write lock up front (`BEGIN IMMEDIATE`) so no
    /// other connection can write between the load and the save.
    fn update(&self, apply: &mut dyn FnMut(&mut Snapshot) -> bool) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(backend)?;
        let mut records = load_records(&tx)?;
        if apply(&mut records) {
            replace_records(&tx, &records)?;
        }
        tx.commit().map_err(backend)?;
        Ok(())
    }
}
