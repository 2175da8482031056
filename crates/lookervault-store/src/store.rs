use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::connection::{with_connection, with_write_txn, StoreConfig};
use crate::error::StoreError;
use crate::model::{
    Checkpoint, CheckpointState, ContentId, ContentItem, ContentType, DlqEntry, DlqFilter,
    IdMapping, Session, SessionKind, SessionStatus,
};

/// The durable, keyed content store: blobs, checkpoints, sessions, ID
/// mappings, and the dead-letter queue. All readers and writers go through
/// one implementation of this trait.
pub trait Store: Send + Sync {
    fn put_content(&self, item: &ContentItem) -> Result<(), StoreError>;
    fn get_content(&self, id: &ContentId) -> Result<Option<ContentItem>, StoreError>;
    fn list_content(
        &self,
        content_type: ContentType,
        include_deleted: bool,
        limit: i64,
        offset: i64,
        with_data: bool,
    ) -> Result<Vec<ContentItem>, StoreError>;
    fn soft_delete(&self, id: &ContentId) -> Result<(), StoreError>;
    fn hard_delete_older_than(&self, retention: ChronoDuration) -> Result<u64, StoreError>;

    fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<i64, StoreError>;
    fn get_latest_incomplete_checkpoint(
        &self,
        content_type: ContentType,
        session_id: Option<Uuid>,
    ) -> Result<Option<Checkpoint>, StoreError>;

    fn put_session(&self, session: &Session) -> Result<(), StoreError>;
    fn update_session(&self, session: &Session) -> Result<(), StoreError>;
    fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError>;
    /// Most recent sessions first, optionally filtered by kind. Backs
    /// `restore status --all`.
    fn list_sessions(&self, kind: Option<SessionKind>, limit: i64) -> Result<Vec<Session>, StoreError>;

    fn put_id_mapping(&self, mapping: &IdMapping) -> Result<(), StoreError>;
    fn get_destination_id(
        &self,
        content_type: ContentType,
        source_id: i64,
        destination_instance_url: &str,
    ) -> Result<Option<i64>, StoreError>;

    fn dlq_add(&self, entry: &DlqEntry) -> Result<(), StoreError>;
    fn dlq_list(&self, filter: &DlqFilter) -> Result<Vec<DlqEntry>, StoreError>;
    fn dlq_remove(&self, id: i64) -> Result<(), StoreError>;
}

/// A SQLite-backed [`Store`]. Each calling thread opens (and reuses) its own
/// connection; connections are never shared across threads.
pub struct SqliteStore {
    path: PathBuf,
    config: StoreConfig,
}

impl SqliteStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with_config(path, StoreConfig::default())
    }

    pub fn open_with_config(path: impl Into<PathBuf>, config: StoreConfig) -> Result<Self, StoreError> {
        let path = path.into();
        // Eagerly open on the calling thread so configuration errors
        // (unwritable path, corrupt file) surface immediately.
        with_connection(&path, &config, |_conn| Ok(()))?;
        Ok(Self { path, config })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.map(|s| parse_ts(&s)).transpose()
}

fn content_type_of(code: i64) -> Result<ContentType, StoreError> {
    ContentType::from_code(code as i32)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown content_type code {code}")))
}

fn row_to_content_item(row: &Row, with_data: bool) -> rusqlite::Result<ContentItemRaw> {
    Ok(ContentItemRaw {
        id: row.get("id")?,
        content_type: row.get("content_type")?,
        name: row.get("name")?,
        owner_id: row.get("owner_id")?,
        owner_email: row.get("owner_email")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        synced_at: row.get("synced_at")?,
        deleted_at: row.get("deleted_at")?,
        content_data: if with_data {
            row.get("content_data")?
        } else {
            Vec::new()
        },
    })
}

struct ContentItemRaw {
    id: String,
    content_type: i64,
    name: String,
    owner_id: Option<i64>,
    owner_email: Option<String>,
    created_at: String,
    updated_at: String,
    synced_at: Option<String>,
    deleted_at: Option<String>,
    content_data: Vec<u8>,
}

impl ContentItemRaw {
    fn into_item(self) -> Result<ContentItem, StoreError> {
        Ok(ContentItem {
            id: ContentId::parse(self.id).map_err(StoreError::InvalidId)?,
            content_type: content_type_of(self.content_type)?,
            name: self.name,
            owner_id: self.owner_id,
            owner_email: self.owner_email,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            synced_at: parse_opt_ts(self.synced_at)?,
            deleted_at: parse_opt_ts(self.deleted_at)?,
            content_data: self.content_data,
        })
    }
}

impl Store for SqliteStore {
    fn put_content(&self, item: &ContentItem) -> Result<(), StoreError> {
        let synced_at = item.synced_at.unwrap_or_else(Utc::now);
        let content_size = item.content_data.len() as i64;
        with_write_txn(self.path(), &self.config, |conn| {
            conn.execute(
                "INSERT INTO content_items
                    (id, content_type, name, owner_id, owner_email, created_at, updated_at,
                     synced_at, deleted_at, content_size, content_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                    content_type = excluded.content_type,
                    name = excluded.name,
                    owner_id = excluded.owner_id,
                    owner_email = excluded.owner_email,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    synced_at = excluded.synced_at,
                    deleted_at = excluded.deleted_at,
                    content_size = excluded.content_size,
                    content_data = excluded.content_data",
                params![
                    item.id.as_str(),
                    item.content_type.code(),
                    item.name,
                    item.owner_id,
                    item.owner_email,
                    fmt_ts(item.created_at),
                    fmt_ts(item.updated_at),
                    fmt_ts(synced_at),
                    item.deleted_at.map(fmt_ts),
                    content_size,
                    item.content_data,
                ],
            )?;
            Ok(())
        })
    }

    fn get_content(&self, id: &ContentId) -> Result<Option<ContentItem>, StoreError> {
        with_connection(self.path(), &self.config, |conn| {
            let raw = conn
                .query_row(
                    "SELECT id, content_type, name, owner_id, owner_email, created_at,
                            updated_at, synced_at, deleted_at, content_data
                     FROM content_items WHERE id = ?1",
                    params![id.as_str()],
                    |row| row_to_content_item(row, true),
                )
                .optional()?;
            raw.map(ContentItemRaw::into_item).transpose()
        })
    }

    fn list_content(
        &self,
        content_type: ContentType,
        include_deleted: bool,
        limit: i64,
        offset: i64,
        with_data: bool,
    ) -> Result<Vec<ContentItem>, StoreError> {
        with_connection(self.path(), &self.config, |conn| {
            let data_col = if with_data { "content_data" } else { "x''" };
            let sql = format!(
                "SELECT id, content_type, name, owner_id, owner_email, created_at,
                        updated_at, synced_at, deleted_at, {data_col} AS content_data
                 FROM content_items
                 WHERE content_type = ?1 AND (?2 OR deleted_at IS NULL)
                 ORDER BY updated_at DESC
                 LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![content_type.code(), include_deleted, limit, offset],
                |row| row_to_content_item(row, with_data),
            )?;
            let mut items = Vec::new();
            for raw in rows {
                items.push(raw?.into_item()?);
            }
            Ok(items)
        })
    }

    fn soft_delete(&self, id: &ContentId) -> Result<(), StoreError> {
        with_write_txn(self.path(), &self.config, |conn| {
            let updated = conn.execute(
                "UPDATE content_items SET deleted_at = ?1 WHERE id = ?2",
                params![fmt_ts(Utc::now()), id.as_str()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(id.as_str().to_string()));
            }
            Ok(())
        })
    }

    fn hard_delete_older_than(&self, retention: ChronoDuration) -> Result<u64, StoreError> {
        let cutoff = fmt_ts(Utc::now() - retention);
        with_write_txn(self.path(), &self.config, |conn| {
            let deleted = conn.execute(
                "DELETE FROM content_items WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
                params![cutoff],
            )?;
            Ok(deleted as u64)
        })
    }

    fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<i64, StoreError> {
        let state = serde_json::to_string(&checkpoint.state)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        with_write_txn(self.path(), &self.config, |conn| {
            if checkpoint.id == 0 {
                conn.execute(
                    "INSERT INTO checkpoints
                        (session_id, content_type, state, started_at, completed_at,
                         item_count, error_message)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        checkpoint.session_id.map(|u| u.to_string()),
                        checkpoint.content_type.code(),
                        state,
                        fmt_ts(checkpoint.started_at),
                        checkpoint.completed_at.map(fmt_ts),
                        checkpoint.item_count,
                        checkpoint.error_message,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            } else {
                conn.execute(
                    "UPDATE checkpoints SET
                        session_id = ?1, content_type = ?2, state = ?3, started_at = ?4,
                        completed_at = ?5, item_count = ?6, error_message = ?7
                     WHERE id = ?8",
                    params![
                        checkpoint.session_id.map(|u| u.to_string()),
                        checkpoint.content_type.code(),
                        state,
                        fmt_ts(checkpoint.started_at),
                        checkpoint.completed_at.map(fmt_ts),
                        checkpoint.item_count,
                        checkpoint.error_message,
                        checkpoint.id,
                    ],
                )?;
                Ok(checkpoint.id)
            }
        })
    }

    fn get_latest_incomplete_checkpoint(
        &self,
        content_type: ContentType,
        session_id: Option<Uuid>,
    ) -> Result<Option<Checkpoint>, StoreError> {
        with_connection(self.path(), &self.config, |conn| {
            let sql = "SELECT id, session_id, content_type, state, started_at, completed_at,
                              item_count, error_message
                       FROM checkpoints
                       WHERE content_type = ?1 AND completed_at IS NULL
                             AND (?2 IS NULL OR session_id = ?2)
                       ORDER BY id DESC LIMIT 1";
            conn.query_row(
                sql,
                params![content_type.code(), session_id.map(|u| u.to_string())],
                row_to_checkpoint,
            )
            .optional()?
            .transpose()
        })
    }

    fn put_session(&self, session: &Session) -> Result<(), StoreError> {
        let config = serde_json::to_string(&session.config).unwrap_or_else(|_| "null".to_string());
        let metadata =
            serde_json::to_string(&session.metadata).unwrap_or_else(|_| "null".to_string());
        with_write_txn(self.path(), &self.config, |conn| {
            conn.execute(
                "INSERT INTO sessions
                    (id, kind, started_at, completed_at, status, items_processed, errors,
                     config, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    session.id.to_string(),
                    session.kind.as_str(),
                    fmt_ts(session.started_at),
                    session.completed_at.map(fmt_ts),
                    status_str(session.status),
                    session.items_processed,
                    session.errors,
                    config,
                    metadata,
                ],
            )?;
            Ok(())
        })
    }

    fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        let config = serde_json::to_string(&session.config).unwrap_or_else(|_| "null".to_string());
        let metadata =
            serde_json::to_string(&session.metadata).unwrap_or_else(|_| "null".to_string());
        with_write_txn(self.path(), &self.config, |conn| {
            let updated = conn.execute(
                "UPDATE sessions SET
                    completed_at = ?1, status = ?2, items_processed = ?3, errors = ?4,
                    config = ?5, metadata = ?6
                 WHERE id = ?7",
                params![
                    session.completed_at.map(fmt_ts),
                    status_str(session.status),
                    session.items_processed,
                    session.errors,
                    config,
                    metadata,
                    session.id.to_string(),
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(session.id.to_string()));
            }
            Ok(())
        })
    }

    fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        with_connection(self.path(), &self.config, |conn| {
            conn.query_row(
                "SELECT id, kind, started_at, completed_at, status, items_processed, errors,
                        config, metadata
                 FROM sessions WHERE id = ?1",
                params![id.to_string()],
                row_to_session,
            )
            .optional()?
            .transpose()
        })
    }

    fn list_sessions(&self, kind: Option<SessionKind>, limit: i64) -> Result<Vec<Session>, StoreError> {
        with_connection(self.path(), &self.config, |conn| {
            let rows = match kind {
                Some(kind) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, kind, started_at, completed_at, status, items_processed,
                                errors, config, metadata
                         FROM sessions WHERE kind = ?1 ORDER BY started_at DESC LIMIT ?2",
                    )?;
                    stmt.query_map(params![kind.as_str(), limit], row_to_session)?
                        .collect::<rusqlite::Result<Vec<_>>>()?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, kind, started_at, completed_at, status, items_processed,
                                errors, config, metadata
                         FROM sessions ORDER BY started_at DESC LIMIT ?1",
                    )?;
                    stmt.query_map(params![limit], row_to_session)?
                        .collect::<rusqlite::Result<Vec<_>>>()?
                }
            };
            rows.into_iter().collect()
        })
    }

    fn put_id_mapping(&self, mapping: &IdMapping) -> Result<(), StoreError> {
        with_write_txn(self.path(), &self.config, |conn| {
            conn.execute(
                "INSERT INTO id_mappings
                    (content_type, source_id, destination_id, source_instance_url,
                     destination_instance_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(content_type, source_id, destination_instance_url) DO UPDATE SET
                    destination_id = excluded.destination_id,
                    source_instance_url = excluded.source_instance_url,
                    created_at = excluded.created_at",
                params![
                    mapping.content_type.code(),
                    mapping.source_id,
                    mapping.destination_id,
                    mapping.source_instance_url,
                    mapping.destination_instance_url,
                    fmt_ts(mapping.created_at),
                ],
            )?;
            Ok(())
        })
    }

    fn get_destination_id(
        &self,
        content_type: ContentType,
        source_id: i64,
        destination_instance_url: &str,
    ) -> Result<Option<i64>, StoreError> {
        with_connection(self.path(), &self.config, |conn| {
            conn.query_row(
                "SELECT destination_id FROM id_mappings
                 WHERE content_type = ?1 AND source_id = ?2 AND destination_instance_url = ?3",
                params![content_type.code(), source_id, destination_instance_url],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    fn dlq_add(&self, entry: &DlqEntry) -> Result<(), StoreError> {
        with_write_txn(self.path(), &self.config, |conn| {
            conn.execute(
                "INSERT INTO dlq_entries
                    (session_id, content_type, content_id, error_type, error_message,
                     retry_count, failed_at, content_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(session_id, content_id) DO UPDATE SET
                    error_type = excluded.error_type,
                    error_message = excluded.error_message,
                    retry_count = dlq_entries.retry_count + 1,
                    failed_at = excluded.failed_at",
                params![
                    entry.session_id.to_string(),
                    entry.content_type.code(),
                    entry.content_id.as_str(),
                    entry.error_type,
                    entry.error_message,
                    entry.retry_count,
                    fmt_ts(entry.failed_at),
                    entry.content_data,
                ],
            )?;
            Ok(())
        })
    }

    fn dlq_list(&self, filter: &DlqFilter) -> Result<Vec<DlqEntry>, StoreError> {
        with_connection(self.path(), &self.config, |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, content_type, content_id, error_type, error_message,
                        retry_count, failed_at, content_data
                 FROM dlq_entries
                 WHERE (?1 IS NULL OR content_type = ?1) AND (?2 IS NULL OR session_id = ?2)
                 ORDER BY failed_at DESC",
            )?;
            let rows = stmt.query_map(
                params![
                    filter.content_type.map(ContentType::code),
                    filter.session_id.map(|u| u.to_string()),
                ],
                row_to_dlq_entry,
            )?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row??);
            }
            Ok(entries)
        })
    }

    fn dlq_remove(&self, id: i64) -> Result<(), StoreError> {
        with_write_txn(self.path(), &self.config, |conn| {
            conn.execute("DELETE FROM dlq_entries WHERE id = ?1", params![id])?;
            Ok(())
        })
    }
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Pending => "pending",
        SessionStatus::Running => "running",
        SessionStatus::Completed => "completed",
        SessionStatus::Failed => "failed",
        SessionStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(raw: &str) -> Result<SessionStatus, StoreError> {
    Ok(match raw {
        "pending" => SessionStatus::Pending,
        "running" => SessionStatus::Running,
        "completed" => SessionStatus::Completed,
        "failed" => SessionStatus::Failed,
        "cancelled" => SessionStatus::Cancelled,
        other => return Err(StoreError::Corrupt(format!("unknown session status {other:?}"))),
    })
}

fn row_to_checkpoint(row: &Row) -> rusqlite::Result<Result<Checkpoint, StoreError>> {
    Ok((|| -> Result<Checkpoint, StoreError> {
        let session_id: Option<String> = row.get("session_id")?;
        let state_raw: String = row.get("state")?;
        Ok(Checkpoint {
            id: row.get("id")?,
            session_id: session_id
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            content_type: content_type_of(row.get::<_, i64>("content_type")?)?,
            state: serde_json::from_str::<CheckpointState>(&state_raw)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            started_at: parse_ts(&row.get::<_, String>("started_at")?)?,
            completed_at: parse_opt_ts(row.get("completed_at")?)?,
            item_count: row.get("item_count")?,
            error_message: row.get("error_message")?,
        })
    })())
}

fn row_to_session(row: &Row) -> rusqlite::Result<Result<Session, StoreError>> {
    Ok((|| -> Result<Session, StoreError> {
        let kind_raw: String = row.get("kind")?;
        let kind = match kind_raw.as_str() {
            "extraction" => SessionKind::Extraction,
            "restoration" => SessionKind::Restoration,
            other => return Err(StoreError::Corrupt(format!("unknown session kind {other:?}"))),
        };
        let status_raw: String = row.get("status")?;
        let config_raw: String = row.get("config")?;
        let metadata_raw: String = row.get("metadata")?;
        Ok(Session {
            id: Uuid::parse_str(&row.get::<_, String>("id")?)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            kind,
            started_at: parse_ts(&row.get::<_, String>("started_at")?)?,
            completed_at: parse_opt_ts(row.get("completed_at")?)?,
            status: status_from_str(&status_raw)?,
            items_processed: row.get("items_processed")?,
            errors: row.get("errors")?,
            config: serde_json::from_str(&config_raw)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            metadata: serde_json::from_str(&metadata_raw)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        })
    })())
}

fn row_to_dlq_entry(row: &Row) -> rusqlite::Result<Result<DlqEntry, StoreError>> {
    Ok((|| -> Result<DlqEntry, StoreError> {
        let content_id_raw: String = row.get("content_id")?;
        Ok(DlqEntry {
            id: row.get("id")?,
            session_id: Uuid::parse_str(&row.get::<_, String>("session_id")?)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            content_type: content_type_of(row.get::<_, i64>("content_type")?)?,
            content_id: ContentId::parse(content_id_raw).map_err(StoreError::InvalidId)?,
            content_data: row.get("content_data")?,
            error_type: row.get("error_type")?,
            error_message: row.get("error_message")?,
            retry_count: row.get("retry_count")?,
            failed_at: parse_ts(&row.get::<_, String>("failed_at")?)?,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_item(id: i64) -> ContentItem {
        let now = Utc::now();
        ContentItem {
            id: ContentId::new(ContentType::Dashboard, id),
            content_type: ContentType::Dashboard,
            name: format!("Dashboard {id}"),
            owner_id: Some(7),
            owner_email: Some("owner@example.com".to_string()),
            created_at: now,
            updated_at: now,
            synced_at: None,
            deleted_at: None,
            content_data: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn put_and_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("store.db")).unwrap();
        let item = sample_item(1);
        store.put_content(&item).unwrap();
        let fetched = store.get_content(&item.id).unwrap().unwrap();
        assert_eq!(fetched.name, item.name);
        assert_eq!(fetched.content_data, item.content_data);
        assert!(fetched.synced_at.is_some());
    }

    #[test]
    fn put_content_upserts() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("store.db")).unwrap();
        let mut item = sample_item(1);
        store.put_content(&item).unwrap();
        item.name = "Renamed".to_string();
        store.put_content(&item).unwrap();
        let fetched = store.get_content(&item.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Renamed");

        let items = store
            .list_content(ContentType::Dashboard, false, 10, 0, false)
            .unwrap();
        assert_eq!(items.len(), 1, "upsert must not create a duplicate row");
    }

    #[test]
    fn list_content_excludes_deleted_by_default() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("store.db")).unwrap();
        let item = sample_item(1);
        store.put_content(&item).unwrap();
        store.soft_delete(&item.id).unwrap();

        let active = store
            .list_content(ContentType::Dashboard, false, 10, 0, false)
            .unwrap();
        assert!(active.is_empty());

        let all = store
            .list_content(ContentType::Dashboard, true, 10, 0, false)
            .unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_deleted());
    }

    #[test]
    fn list_content_metadata_only_skips_blob() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("store.db")).unwrap();
        store.put_content(&sample_item(1)).unwrap();
        let items = store
            .list_content(ContentType::Dashboard, false, 10, 0, false)
            .unwrap();
        assert!(items[0].content_data.is_empty());
    }

    #[test]
    fn checkpoint_insert_then_update() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("store.db")).unwrap();
        let cp = Checkpoint {
            id: 0,
            session_id: None,
            content_type: ContentType::Look,
            state: CheckpointState::default(),
            started_at: Utc::now(),
            completed_at: None,
            item_count: 0,
            error_message: None,
        };
        let id = store.put_checkpoint(&cp).unwrap();
        assert!(id > 0);

        let latest = store
            .get_latest_incomplete_checkpoint(ContentType::Look, None)
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, id);

        let mut completed = latest;
        completed.completed_at = Some(Utc::now());
        completed.item_count = 42;
        store.put_checkpoint(&completed).unwrap();

        assert!(store
            .get_latest_incomplete_checkpoint(ContentType::Look, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn id_mapping_is_unique_per_destination() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("store.db")).unwrap();
        let mapping = IdMapping {
            content_type: ContentType::Folder,
            source_id: 10,
            destination_id: 20,
            source_instance_url: "https://src.looker.com".to_string(),
            destination_instance_url: "https://dst.looker.com".to_string(),
            created_at: Utc::now(),
        };
        store.put_id_mapping(&mapping).unwrap();
        let mut remapped = mapping.clone();
        remapped.destination_id = 99;
        store.put_id_mapping(&remapped).unwrap();

        let dest = store
            .get_destination_id(ContentType::Folder, 10, "https://dst.looker.com")
            .unwrap();
        assert_eq!(dest, Some(99));
    }

    #[test]
    fn dlq_add_dedupes_by_session_and_content_id() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("store.db")).unwrap();
        let entry = DlqEntry {
            id: 0,
            session_id: Uuid::new_v4(),
            content_type: ContentType::Dashboard,
            content_id: ContentId::new(ContentType::Dashboard, 1),
            content_data: vec![9, 9],
            error_type: "ValidationError".to_string(),
            error_message: "bad folder_id".to_string(),
            retry_count: 0,
            failed_at: Utc::now(),
        };
        store.dlq_add(&entry).unwrap();
        store.dlq_add(&entry).unwrap();

        let entries = store.dlq_list(&DlqFilter::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].retry_count, 1);
    }

    #[test]
    fn hard_delete_purges_only_past_retention() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("store.db")).unwrap();
        let item = sample_item(1);
        store.put_content(&item).unwrap();
        store.soft_delete(&item.id).unwrap();

        let purged = store.hard_delete_older_than(ChronoDuration::days(30)).unwrap();
        assert_eq!(purged, 0, "recently soft-deleted item is within retention");

        let purged = store.hard_delete_older_than(ChronoDuration::seconds(-1)).unwrap();
        assert_eq!(purged, 1);
    }
}
