use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

use crate::error::StoreError;
use crate::schema;

/// Tuning knobs from the storage design: 16 KiB pages sized for ~10 MB
/// blobs, a 64 MiB page cache, and a 60s busy timeout so one writer never
/// immediately fails another.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    pub busy_timeout: Duration,
    pub page_size: u32,
    pub cache_size_kib: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(60),
            page_size: 16384,
            cache_size_kib: 65536,
        }
    }
}

thread_local! {
    // Each worker thread gets its own connection per store path; connections
    // are never shared across threads.
    static CONNECTIONS: RefCell<HashMap<PathBuf, Connection>> = RefCell::new(HashMap::new());
}

fn open_connection(path: &Path, config: &StoreConfig) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(config.busy_timeout)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "page_size", config.page_size)?;
    conn.pragma_update(None, "cache_size", -(i64::from(config.cache_size_kib)))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::apply(&conn)?;
    Ok(conn)
}

/// Runs `f` against this thread's connection for `path`, opening and
/// caching one on first use.
pub(crate) fn with_connection<F, R>(path: &Path, config: &StoreConfig, f: F) -> Result<R, StoreError>
where
    F: FnOnce(&Connection) -> Result<R, StoreError>,
{
    CONNECTIONS.with(|cell| {
        let mut connections = cell.borrow_mut();
        if !connections.contains_key(path) {
            let conn = open_connection(path, config)?;
            connections.insert(path.to_path_buf(), conn);
        }
        let conn = connections.get(path).expect("just inserted above");
        f(conn)
    })
}

/// Runs `f` inside `BEGIN IMMEDIATE` / `COMMIT`, rolling back on any error
/// path so every write either fully commits or fully reverts.
pub(crate) fn with_write_txn<F, R>(path: &Path, config: &StoreConfig, f: F) -> Result<R, StoreError>
where
    F: FnOnce(&Connection) -> Result<R, StoreError>,
{
    with_connection(path, config, |conn| {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(conn) {
            Ok(value) => {
                conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(err) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(err)
            }
        }
    })
}
