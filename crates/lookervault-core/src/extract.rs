use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lookervault_client::{IterateParams, LookerClient};
use lookervault_codec::{BinCodec, Codec, Value};
use lookervault_metrics::Metrics;
use lookervault_ratelimit::CancellationToken;
use lookervault_store::{
    Checkpoint, CheckpointState, ContentId, ContentItem, ContentType, Session, SessionKind, Store,
    StoreError,
};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info_span, warn};
use uuid::Uuid;

use crate::coordinator::{MultiFolderOffsetCoordinator, OffsetCoordinator};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("encoding failed: {0}")]
    Encode(String),
    #[error("{0}")]
    WorkerErrors(String),
    #[error("extraction cancelled")]
    Cancelled,
}

/// Inputs for one extraction run. See `lookervault-core::extract`.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub content_types: Vec<ContentType>,
    pub workers: usize,
    pub batch_size: i64,
    pub folder_ids: Vec<i64>,
    pub updated_after: Option<DateTime<Utc>>,
    pub resume: bool,
    pub fields: Option<Vec<String>>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            content_types: ContentType::ALL.to_vec(),
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(8),
            batch_size: 100,
            folder_ids: Vec::new(),
            updated_after: None,
            resume: false,
            fields: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub session_id: Uuid,
    pub total_items: u64,
    pub items_by_type: HashMap<ContentType, u64>,
    pub errors: Vec<String>,
    pub duration: Duration,
    pub checkpoints_created: u64,
}

/// Drives one extraction run: per content type, `workers` threads each claim
/// their own offset range from a coordinator, fetch a page, and write it —
/// producer and consumer fused into one worker loop (the simpler of the two
/// variants §4.8 permits; `RestorationOrchestrator` is where a standalone
/// `WorkQueue` earns its keep, since there the work list is already fully
/// known up front from the Store).
pub struct ExtractionOrchestrator {
    store: Arc<dyn Store>,
    client: Arc<dyn LookerClient>,
    metrics: Arc<Metrics>,
    config: ExtractionConfig,
}

impl ExtractionOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        client: Arc<dyn LookerClient>,
        metrics: Arc<Metrics>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            store,
            client,
            metrics,
            config,
        }
    }

    pub fn run(&self, cancel: &CancellationToken) -> Result<ExtractionResult, ExtractionError> {
        let started = Instant::now();
        let mut session = Session::new(SessionKind::Extraction, serde_json::Value::Null);
        session.status = lookervault_store::SessionStatus::Running;
        let session_id = session.id;
        self.store.put_session(&session)?;

        let span = info_span!("extraction", session_id = %session_id);
        let _enter = span.enter();

        let mut checkpoints_created = 0u64;
        let mut errors = Vec::new();
        let mut cancelled = false;

        for &content_type in &self.config.content_types {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            match self.run_content_type(content_type, session_id, cancel) {
                Ok(()) => checkpoints_created += 1,
                Err(e) => {
                    warn!(%content_type, error = %e, "extraction of content type failed");
                    errors.push(format!("{content_type}: {e}"));
                }
            }
        }

        if cancel.is_cancelled() {
            cancelled = true;
        }

        let snapshot = self.metrics.snapshot();
        session.items_processed = snapshot.items_processed as i64;
        session.errors = errors.len() as i64;
        if cancelled {
            session.mark_cancelled();
        } else if errors.is_empty() {
            session.mark_completed(Utc::now());
        } else {
            session.mark_failed();
        }
        self.store.update_session(&session)?;

        Ok(ExtractionResult {
            session_id,
            total_items: snapshot.items_processed,
            items_by_type: snapshot.items_by_type,
            errors,
            duration: started.elapsed(),
            checkpoints_created,
        })
    }

    fn run_content_type(
        &self,
        content_type: ContentType,
        session_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<(), ExtractionError> {
        let mut checkpoint = if self.config.resume {
            self.store.get_latest_incomplete_checkpoint(content_type, None)?
        } else {
            None
        }
        .unwrap_or_else(|| Checkpoint {
            id: 0,
            session_id: Some(session_id),
            content_type,
            state: CheckpointState::default(),
            started_at: Utc::now(),
            completed_at: None,
            item_count: 0,
            error_message: None,
        });
        // Checkpoints are persisted at type-completion granularity (§9): a
        // resumed, still-incomplete checkpoint is replayed from scratch
        // rather than from its stale `last_offset`, which is safe because
        // content writes are commutative upserts.
        checkpoint.session_id = Some(session_id);
        checkpoint.state.batch_size = self.config.batch_size;
        checkpoint.state.fields = self.config.fields.clone().unwrap_or_default();
        checkpoint.state.folder_ids = self.config.folder_ids.clone();
        checkpoint.item_count = 0;
        checkpoint.completed_at = None;
        checkpoint.error_message = None;
        checkpoint.id = self.store.put_checkpoint(&checkpoint)?;

        let seen_ids = Arc::new(Mutex::new(HashSet::<i64>::new()));
        let item_count = Arc::new(AtomicU64::new(0));
        let worker_errors = Arc::new(Mutex::new(Vec::<String>::new()));

        let stride = self.config.batch_size.max(1);
        let use_multi_folder = content_type.supports_folder_filter() && self.config.folder_ids.len() > 1;
        let multi = use_multi_folder
            .then(|| Arc::new(MultiFolderOffsetCoordinator::new(self.config.folder_ids.iter().copied(), self.config.workers, stride)));
        let single = (!use_multi_folder).then(|| Arc::new(OffsetCoordinator::new(self.config.workers, stride)));
        let single_folder_id = if content_type.supports_folder_filter() {
            self.config.folder_ids.first().copied()
        } else {
            if !self.config.folder_ids.is_empty() {
                warn!(%content_type, "folder filtering is not supported for this content type; extracting all");
            }
            None
        };

        let params_base = IterateParams {
            fields: self.config.fields.clone(),
            batch_size: stride,
            updated_after: self.config.updated_after,
            folder_id: None,
            offset: 0,
        };

        let mut handles = Vec::with_capacity(self.config.workers);
        for _ in 0..self.config.workers {
            let client = self.client.clone();
            let store = self.store.clone();
            let metrics = self.metrics.clone();
            let multi = multi.clone();
            let single = single.clone();
            let cancel = cancel.clone();
            let params_base = params_base.clone();
            let seen_ids = seen_ids.clone();
            let item_count = item_count.clone();
            let worker_errors = worker_errors.clone();

            handles.push(std::thread::spawn(move || {
                let codec = BinCodec::new();
                loop {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let claim = if let Some(m) = &multi {
                        m.claim_range().map(|(folder_id, offset, limit)| (Some(folder_id), offset, limit))
                    } else if let Some(s) = &single {
                        s.claim_range().map(|(offset, limit)| (single_folder_id, offset, limit))
                    } else {
                        None
                    };
                    let Some((folder_id, offset, limit)) = claim else {
                        return;
                    };

                    let mut params = params_base.clone();
                    params.offset = offset;
                    params.batch_size = limit;
                    params.folder_id = folder_id;

                    match client.fetch_page(content_type, &params, &cancel) {
                        Ok(page) if page.is_empty() => {
                            if let Some(m) = &multi {
                                if let Some(fid) = folder_id {
                                    m.mark_worker_done_for_folder(fid);
                                }
                                continue;
                            }
                            if let Some(s) = &single {
                                s.mark_worker_done();
                            }
                            return;
                        }
                        Ok(page) => {
                            for value in &page {
                                if let Some(id) = looker_id(value) {
                                    seen_ids.lock().insert(id);
                                }
                            }
                            match write_page(store.as_ref(), &codec, content_type, &page) {
                                Ok(count) => {
                                    for _ in 0..count {
                                        metrics.record_item(content_type);
                                    }
                                    item_count.fetch_add(count as u64, Ordering::Relaxed);
                                    metrics.record_batch_completed();
                                }
                                Err(e) => {
                                    metrics.record_error(e.to_string());
                                    worker_errors.lock().push(e.to_string());
                                }
                            }
                        }
                        Err(e) => {
                            metrics.record_error(e.to_string());
                            worker_errors.lock().push(e.to_string());
                            if let Some(m) = &multi {
                                if let Some(fid) = folder_id {
                                    m.mark_worker_done_for_folder(fid);
                                }
                                continue;
                            }
                            if let Some(s) = &single {
                                s.mark_worker_done();
                            }
                            return;
                        }
                    }
                }
            }));
        }

        for handle in handles {
            // A panicking worker must not take its peers down with it;
            // surface the panic as a recorded error instead of propagating.
            if let Err(panic) = handle.join() {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "worker thread panicked".to_string());
                self.metrics.record_error(message.clone());
                worker_errors.lock().push(message);
            }
        }

        if self.config.updated_after.is_some() {
            let active = self.store.list_content(content_type, false, -1, 0, false)?;
            let seen = seen_ids.lock();
            for item in active {
                if !seen.contains(&item.id.looker_id()) {
                    self.store.soft_delete(&item.id)?;
                }
            }
        }

        checkpoint.item_count = item_count.load(Ordering::Relaxed);
        let errors = worker_errors.lock();
        if errors.is_empty() {
            checkpoint.completed_at = Some(Utc::now());
        } else {
            checkpoint.error_message = Some(errors.join("; "));
        }
        self.store.put_checkpoint(&checkpoint)?;

        if !errors.is_empty() {
            return Err(ExtractionError::WorkerErrors(errors.join("; ")));
        }
        Ok(())
    }
}

fn looker_id(value: &Value) -> Option<i64> {
    value.get("id").and_then(Value::as_int)
}

fn write_page(
    store: &dyn Store,
    codec: &BinCodec,
    content_type: ContentType,
    page: &[Value],
) -> Result<usize, ExtractionError> {
    for value in page {
        let Some(looker_id) = looker_id(value) else {
            continue;
        };
        let content_data = codec
            .encode(value)
            .map_err(|e| ExtractionError::Encode(format!("{content_type} {looker_id}: {e}")))?;
        let name = value
            .get("title")
            .or_else(|| value.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let owner_id = value.get("user_id").and_then(Value::as_int);
        let owner_email = value.get("owner_email").and_then(Value::as_str).map(str::to_string);
        let created_at = value
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|s| lookervault_codec::timestamp::parse(s).ok())
            .unwrap_or_else(Utc::now);
        let updated_at = value
            .get("updated_at")
            .and_then(Value::as_str)
            .and_then(|s| lookervault_codec::timestamp::parse(s).ok())
            .unwrap_or(created_at);

        store.put_content(&ContentItem {
            id: ContentId::new(content_type, looker_id),
            content_type,
            name,
            owner_id,
            owner_email,
            created_at,
            updated_at,
            synced_at: Some(Utc::now()),
            deleted_at: None,
            content_data,
        })?;
    }
    Ok(page.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookervault_client::ClientError;
    use lookervault_store::{DlqEntry, DlqFilter, IdMapping};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct InMemoryStore {
        items: StdMutex<HashMap<String, ContentItem>>,
        checkpoints: StdMutex<Vec<Checkpoint>>,
        sessions: StdMutex<Vec<Session>>,
    }

    impl Store for InMemoryStore {
        fn put_content(&self, item: &ContentItem) -> Result<(), StoreError> {
            self.items.lock().unwrap().insert(item.id.as_str().to_string(), item.clone());
            Ok(())
        }
        fn get_content(&self, id: &ContentId) -> Result<Option<ContentItem>, StoreError> {
            Ok(self.items.lock().unwrap().get(id.as_str()).cloned())
        }
        fn list_content(
            &self,
            content_type: ContentType,
            include_deleted: bool,
            _limit: i64,
            _offset: i64,
            _with_data: bool,
        ) -> Result<Vec<ContentItem>, StoreError> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .values()
                .filter(|i| i.content_type == content_type && (include_deleted || !i.is_deleted()))
                .cloned()
                .collect())
        }
        fn soft_delete(&self, id: &ContentId) -> Result<(), StoreError> {
            if let Some(item) = self.items.lock().unwrap().get_mut(id.as_str()) {
                item.deleted_at = Some(Utc::now());
            }
            Ok(())
        }
        fn hard_delete_older_than(&self, _retention: chrono::Duration) -> Result<u64, StoreError> {
            Ok(0)
        }
        fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<i64, StoreError> {
            let mut checkpoints = self.checkpoints.lock().unwrap();
            if checkpoint.id == 0 {
                let id = checkpoints.len() as i64 + 1;
                let mut c = checkpoint.clone();
                c.id = id;
                checkpoints.push(c);
                Ok(id)
            } else {
                if let Some(existing) = checkpoints.iter_mut().find(|c| c.id == checkpoint.id) {
                    *existing = checkpoint.clone();
                }
                Ok(checkpoint.id)
            }
        }
        fn get_latest_incomplete_checkpoint(
            &self,
            content_type: ContentType,
            session_id: Option<Uuid>,
        ) -> Result<Option<Checkpoint>, StoreError> {
            Ok(self
                .checkpoints
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|c| {
                    c.content_type == content_type
                        && c.completed_at.is_none()
                        && session_id.map(|s| c.session_id == Some(s)).unwrap_or(true)
                })
                .cloned())
        }
        fn put_session(&self, session: &Session) -> Result<(), StoreError> {
            self.sessions.lock().unwrap().push(session.clone());
            Ok(())
        }
        fn update_session(&self, session: &Session) -> Result<(), StoreError> {
            let mut sessions = self.sessions.lock().unwrap();
            if let Some(existing) = sessions.iter_mut().find(|s| s.id == session.id) {
                *existing = session.clone();
            }
            Ok(())
        }
        fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
            Ok(self.sessions.lock().unwrap().iter().find(|s| s.id == id).cloned())
        }
        fn list_sessions(
            &self,
            kind: Option<lookervault_store::SessionKind>,
            limit: i64,
        ) -> Result<Vec<Session>, StoreError> {
            let mut sessions: Vec<Session> = self
                .sessions
                .lock()
                .unwrap()
                .iter()
                .filter(|s| match kind {
                    Some(k) => s.kind == k,
                    None => true,
                })
                .cloned()
                .collect();
            sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            sessions.truncate(limit.max(0) as usize);
            Ok(sessions)
        }
        fn put_id_mapping(&self, _mapping: &IdMapping) -> Result<(), StoreError> {
            Ok(())
        }
        fn get_destination_id(
            &self,
            _content_type: ContentType,
            _source_id: i64,
            _destination_instance_url: &str,
        ) -> Result<Option<i64>, StoreError> {
            Ok(None)
        }
        fn dlq_add(&self, _entry: &DlqEntry) -> Result<(), StoreError> {
            Ok(())
        }
        fn dlq_list(&self, _filter: &DlqFilter) -> Result<Vec<DlqEntry>, StoreError> {
            Ok(vec![])
        }
        fn dlq_remove(&self, _id: i64) -> Result<(), StoreError> {
            Ok(())
        }
    }

    struct FakeClient {
        pages: StdMutex<HashMap<i64, Vec<Value>>>,
        calls: AtomicUsize,
    }

    impl FakeClient {
        fn with_items(total: usize, page_size: i64) -> Self {
            let items: Vec<Value> = (1..=total as i64)
                .map(|id| Value::Map(vec![("id".to_string(), Value::Int(id))]))
                .collect();
            let mut pages = HashMap::new();
            let mut offset = 0i64;
            while (offset as usize) < items.len() {
                let end = ((offset + page_size) as usize).min(items.len());
                pages.insert(offset, items[offset as usize..end].to_vec());
                offset += page_size;
            }
            pages.insert(offset, Vec::new());
            Self {
                pages: StdMutex::new(pages),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl LookerClient for FakeClient {
        fn fetch_page(
            &self,
            _content_type: ContentType,
            params: &IterateParams,
            _cx: &CancellationToken,
        ) -> Result<Vec<Value>, ClientError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(self.pages.lock().unwrap().get(&params.offset).cloned().unwrap_or_default())
        }
        fn iterate(
            &self,
            _content_type: ContentType,
            _params: IterateParams,
            _cx: CancellationToken,
        ) -> Box<dyn Iterator<Item = Result<Value, ClientError>> + Send> {
            Box::new(std::iter::empty())
        }
        fn create(
            &self,
            _content_type: ContentType,
            _payload: &Value,
            _cx: &CancellationToken,
        ) -> Result<i64, ClientError> {
            unimplemented!()
        }
        fn update(
            &self,
            _content_type: ContentType,
            _id: i64,
            _payload: &Value,
            _cx: &CancellationToken,
        ) -> Result<(), ClientError> {
            unimplemented!()
        }
        fn exists(&self, _content_type: ContentType, _id: i64, _cx: &CancellationToken) -> Result<bool, ClientError> {
            unimplemented!()
        }
        fn get(
            &self,
            _content_type: ContentType,
            _id: i64,
            _cx: &CancellationToken,
        ) -> Result<Option<Value>, ClientError> {
            unimplemented!()
        }
        fn self_info(&self) -> Result<lookervault_client::SelfInfo, ClientError> {
            unimplemented!()
        }
    }

    #[test]
    fn extracts_all_items_for_a_single_content_type() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::default());
        let client: Arc<dyn LookerClient> = Arc::new(FakeClient::with_items(25, 10));
        let metrics = Arc::new(Metrics::new());
        let config = ExtractionConfig {
            content_types: vec![ContentType::Dashboard],
            workers: 3,
            batch_size: 10,
            ..Default::default()
        };
        let orchestrator = ExtractionOrchestrator::new(store.clone(), client, metrics, config);
        let cancel = CancellationToken::new();

        let result = orchestrator.run(&cancel).unwrap();
        assert!(result.errors.is_empty());
        assert_eq!(result.total_items, 25);
        assert_eq!(result.checkpoints_created, 1);

        for id in 1..=25 {
            let content_id = ContentId::new(ContentType::Dashboard, id);
            assert!(store.get_content(&content_id).unwrap().is_some());
        }
    }

    #[test]
    fn incremental_run_soft_deletes_items_no_longer_present() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::default());
        store
            .put_content(&ContentItem {
                id: ContentId::new(ContentType::Dashboard, 999),
                content_type: ContentType::Dashboard,
                name: "stale".to_string(),
                owner_id: None,
                owner_email: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                synced_at: None,
                deleted_at: None,
                content_data: vec![],
            })
            .unwrap();

        let client: Arc<dyn LookerClient> = Arc::new(FakeClient::with_items(3, 10));
        let metrics = Arc::new(Metrics::new());
        let config = ExtractionConfig {
            content_types: vec![ContentType::Dashboard],
            workers: 1,
            batch_size: 10,
            updated_after: Some(Utc::now()),
            ..Default::default()
        };
        let orchestrator = ExtractionOrchestrator::new(store.clone(), client, metrics, config);
        let cancel = CancellationToken::new();
        orchestrator.run(&cancel).unwrap();

        let stale = store.get_content(&ContentId::new(ContentType::Dashboard, 999)).unwrap().unwrap();
        assert!(stale.is_deleted());
    }
}
