use rusqlite::Connection;

use crate::error::StoreError;

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Full DDL. Every statement is `IF NOT EXISTS` so applying it to an
/// already-initialized database is a no-op.
///
/// `content_data` is declared last in both blob-carrying tables so metadata
/// scans (`SELECT id, content_type, ... FROM content_items`) never need to
/// touch the payload bytes.
const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS content_items (
        id TEXT PRIMARY KEY,
        content_type INTEGER NOT NULL,
        name TEXT NOT NULL,
        owner_id INTEGER,
        owner_email TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        synced_at TEXT,
        deleted_at TEXT,
        content_size INTEGER NOT NULL,
        content_data BLOB NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_content_items_type
        ON content_items(content_type) WHERE deleted_at IS NULL;
    CREATE INDEX IF NOT EXISTS idx_content_items_owner
        ON content_items(owner_id) WHERE deleted_at IS NULL;
    CREATE INDEX IF NOT EXISTS idx_content_items_updated_at
        ON content_items(updated_at DESC) WHERE deleted_at IS NULL;
    CREATE INDEX IF NOT EXISTS idx_content_items_deleted_at
        ON content_items(deleted_at) WHERE deleted_at IS NOT NULL;

    CREATE TABLE IF NOT EXISTS checkpoints (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT,
        content_type INTEGER NOT NULL,
        state TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        item_count INTEGER NOT NULL DEFAULT 0,
        error_message TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_checkpoints_type_completed
        ON checkpoints(content_type, completed_at);
    CREATE INDEX IF NOT EXISTS idx_checkpoints_session
        ON checkpoints(session_id);

    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        status TEXT NOT NULL,
        items_processed INTEGER NOT NULL DEFAULT 0,
        errors INTEGER NOT NULL DEFAULT 0,
        config TEXT NOT NULL DEFAULT '{}',
        metadata TEXT NOT NULL DEFAULT '{}'
    );

    CREATE TABLE IF NOT EXISTS id_mappings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content_type INTEGER NOT NULL,
        source_id INTEGER NOT NULL,
        destination_id INTEGER NOT NULL,
        source_instance_url TEXT NOT NULL,
        destination_instance_url TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_id_mappings_unique
        ON id_mappings(content_type, source_id, destination_instance_url);

    CREATE TABLE IF NOT EXISTS dlq_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        content_type INTEGER NOT NULL,
        content_id TEXT NOT NULL,
        error_type TEXT NOT NULL,
        error_message TEXT NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0,
        failed_at TEXT NOT NULL,
        content_data BLOB NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_dlq_session_content
        ON dlq_entries(session_id, content_id);
    CREATE INDEX IF NOT EXISTS idx_dlq_content_type ON dlq_entries(content_type);
";

/// Applies the schema and runs any pending migrations. Idempotent: safe to
/// call on every `SqliteStore::open`.
pub fn apply(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA_SQL)?;
    run_migrations(conn)?;
    Ok(())
}

/// Migrations are additive only. SQLite has no `ADD COLUMN IF NOT EXISTS`,
/// so each migration probes `pragma_table_info` before altering.
fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    if version < CURRENT_SCHEMA_VERSION {
        conn.execute("DELETE FROM schema_version", [])?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [CURRENT_SCHEMA_VERSION],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply(&conn).unwrap();
        apply(&conn).unwrap();
        let version: i32 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn content_data_is_the_last_column() {
        let conn = Connection::open_in_memory().unwrap();
        apply(&conn).unwrap();
        let mut stmt = conn.prepare("PRAGMA table_info(content_items)").unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(names.last().map(String::as_str), Some("content_data"));
    }
}
