use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use lookervault_client::{ClientError, LookerClient};
use lookervault_codec::{BinCodec, Codec};
use lookervault_metrics::Metrics;
use lookervault_ratelimit::CancellationToken;
use lookervault_store::{
    Checkpoint, CheckpointState, ContentId, ContentType, DlqEntry, Session, SessionKind,
    SessionStatus, Store, StoreError,
};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{error, info_span, warn};
use uuid::Uuid;

use crate::deps::{topological_order, DependencyError};
use crate::idmap::{IdMapper, IdMappingError};
use crate::queue::WorkQueue;

#[derive(Debug, Error)]
pub enum RestorationError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("dependency graph error: {0}")]
    Dependency(#[from] DependencyError),
}

#[derive(Debug, Error)]
pub enum RestoreItemError {
    #[error("content item {0} not found in store")]
    Missing(ContentId),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("unmappable id references: {0:?}")]
    Validation(Vec<IdMappingError>),
    #[error("looker client error: {0}")]
    Client(#[from] ClientError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl RestoreItemError {
    /// `422`/validation failures are the only ones the Restorer itself
    /// classifies; every other `ClientError` the Restorer sees already
    /// exhausted the client's own retry policy (§4.11), so it's equally
    /// DLQ-bound regardless of kind.
    fn error_type(&self) -> &'static str {
        match self {
            RestoreItemError::Missing(_) => "missing",
            RestoreItemError::Decode(_) => "decode",
            RestoreItemError::Validation(_) => "validation",
            RestoreItemError::Client(e) if e.is_permanent() => "validation",
            RestoreItemError::Client(_) => "client",
            RestoreItemError::Store(_) => "store",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOperation {
    Create,
    Update,
}

#[derive(Debug, Clone)]
pub struct RestorationResult {
    pub operation: RestoreOperation,
    pub destination_id: Option<i64>,
    pub duration: Duration,
}

/// Per-item restore logic: read + decode, translate ids, exists-check,
/// create-or-update. Any error reaching the caller is already final (the
/// client's own retry has either exhausted or the failure is permanent).
pub struct Restorer {
    store: Arc<dyn Store>,
    client: Arc<dyn LookerClient>,
    id_mapper: Arc<IdMapper>,
    source_instance_url: String,
}

impl Restorer {
    pub fn new(
        store: Arc<dyn Store>,
        client: Arc<dyn LookerClient>,
        id_mapper: Arc<IdMapper>,
        source_instance_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            client,
            id_mapper,
            source_instance_url: source_instance_url.into(),
        }
    }

    pub fn restore_item(
        &self,
        content_id: &ContentId,
        dry_run: bool,
        cx: &CancellationToken,
    ) -> Result<RestorationResult, RestoreItemError> {
        let started = Instant::now();
        let item = self
            .store
            .get_content(content_id)?
            .ok_or_else(|| RestoreItemError::Missing(content_id.clone()))?;

        let codec = BinCodec::new();
        let mut payload = codec
            .decode(&item.content_data)
            .map_err(|e| RestoreItemError::Decode(e.to_string()))?;

        let mapping_errors = self.id_mapper.translate_payload(&mut payload, item.content_type);
        if !mapping_errors.is_empty() {
            return Err(RestoreItemError::Validation(mapping_errors));
        }

        let source_id = content_id.looker_id();
        // The item's own id also needs translation: a prior `create` on this
        // same source id assigned a server-side destination id that almost
        // certainly differs from `source_id`. Until a mapping exists (first
        // pass), fall back to `source_id` itself.
        let lookup_id = self.id_mapper.translate(item.content_type, source_id).unwrap_or(source_id);
        let exists = self.client.exists(item.content_type, lookup_id, cx)?;

        if dry_run {
            return Ok(RestorationResult {
                operation: if exists {
                    RestoreOperation::Update
                } else {
                    RestoreOperation::Create
                },
                destination_id: None,
                duration: started.elapsed(),
            });
        }

        if exists {
            self.client.update(item.content_type, lookup_id, &payload, cx)?;
            Ok(RestorationResult {
                operation: RestoreOperation::Update,
                destination_id: Some(lookup_id),
                duration: started.elapsed(),
            })
        } else {
            let destination_id = self.client.create(item.content_type, &payload, cx)?;
            self.id_mapper.record_mapping(
                item.content_type,
                source_id,
                destination_id,
                &self.source_instance_url,
            )?;
            Ok(RestorationResult {
                operation: RestoreOperation::Create,
                destination_id: Some(destination_id),
                duration: started.elapsed(),
            })
        }
    }

    /// `skip_if_modified`: compares the destination's `updated_at` against
    /// the stored one. Returns `true` if the destination is newer (so the
    /// caller should skip this item rather than overwrite newer work).
    fn destination_is_newer(&self, content_id: &ContentId, cx: &CancellationToken) -> Result<bool, RestoreItemError> {
        let item = self
            .store
            .get_content(content_id)?
            .ok_or_else(|| RestoreItemError::Missing(content_id.clone()))?;
        let source_id = content_id.looker_id();
        let lookup_id = self.id_mapper.translate(item.content_type, source_id).unwrap_or(source_id);
        let remote = self.client.get(item.content_type, lookup_id, cx)?;
        let Some(remote) = remote else {
            return Ok(false);
        };
        let remote_updated_at = remote
            .get("updated_at")
            .and_then(|v| v.as_str())
            .and_then(|s| lookervault_codec::timestamp::parse(s).ok());
        Ok(remote_updated_at.is_some_and(|ts| ts > item.updated_at))
    }
}

#[derive(Debug, Clone)]
pub struct RestorationConfig {
    pub content_types: Vec<ContentType>,
    pub workers: usize,
    pub checkpoint_interval: u64,
    pub skip_if_modified: bool,
    pub dry_run: bool,
}

impl Default for RestorationConfig {
    fn default() -> Self {
        Self {
            content_types: ContentType::ALL.to_vec(),
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(8),
            checkpoint_interval: 100,
            skip_if_modified: false,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeSummary {
    pub total: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
    pub duration_s: f64,
    pub avg_items_per_second: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RestorationSummary {
    pub session_id: Option<Uuid>,
    pub by_type: HashMap<ContentType, TypeSummary>,
    pub total: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
    pub duration_s: f64,
    pub avg_items_per_second: f64,
    pub worker_errors: Vec<String>,
}

/// Parallel restore, reading its work list from the Store rather than the
/// network (§4.12): here the full id list for a type is known up front, so
/// a real producer/consumer split over `WorkQueue` earns its keep, unlike
/// `ExtractionOrchestrator`'s fused coordinator-driven workers.
pub struct RestorationOrchestrator {
    store: Arc<dyn Store>,
    restorer: Arc<Restorer>,
    metrics: Arc<Metrics>,
    config: RestorationConfig,
}

impl RestorationOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        restorer: Arc<Restorer>,
        metrics: Arc<Metrics>,
        config: RestorationConfig,
    ) -> Self {
        Self {
            store,
            restorer,
            metrics,
            config,
        }
    }

    pub fn run(&self, cancel: &CancellationToken) -> Result<RestorationSummary, RestorationError> {
        let started = Instant::now();
        let mut session = Session::new(SessionKind::Restoration, serde_json::Value::Null);
        session.status = SessionStatus::Running;
        let session_id = session.id;
        self.store.put_session(&session)?;

        let span = info_span!("restoration", session_id = %session_id);
        let _enter = span.enter();

        let ordered = topological_order(&self.config.content_types)?;

        let mut summary = RestorationSummary {
            session_id: Some(session_id),
            ..Default::default()
        };
        let mut cancelled = false;

        for content_type in ordered {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let type_summary = self.run_content_type(content_type, session_id, cancel)?;
            summary.total += type_summary.total;
            summary.created += type_summary.created;
            summary.updated += type_summary.updated;
            summary.skipped += type_summary.skipped;
            summary.errors += type_summary.errors;
            summary.by_type.insert(content_type, type_summary);
        }

        if cancel.is_cancelled() {
            cancelled = true;
        }

        summary.duration_s = started.elapsed().as_secs_f64();
        summary.avg_items_per_second = if summary.duration_s > 0.0 {
            summary.total as f64 / summary.duration_s
        } else {
            0.0
        };
        summary.worker_errors = self.metrics.snapshot().worker_errors;

        session.items_processed = summary.total as i64;
        session.errors = summary.errors as i64;
        if cancelled {
            session.mark_cancelled();
        } else if summary.errors == 0 {
            session.mark_completed(Utc::now());
        } else {
            session.mark_failed();
        }
        self.store.update_session(&session)?;

        Ok(summary)
    }

    fn run_content_type(
        &self,
        content_type: ContentType,
        session_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<TypeSummary, RestorationError> {
        let type_started = Instant::now();

        let mut checkpoint = self
            .store
            .get_latest_incomplete_checkpoint(content_type, None)?
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
        checkpoint.session_id = Some(session_id);
        let already_completed: HashSet<String> = checkpoint.state.completed_ids.iter().cloned().collect();
        checkpoint.id = self.store.put_checkpoint(&checkpoint)?;
        let checkpoint = Arc::new(Mutex::new(checkpoint));

        let items = self.store.list_content(content_type, false, -1, 0, false)?;
        let pending: Vec<ContentId> = items
            .into_iter()
            .map(|item| item.id)
            .filter(|id| !already_completed.contains(id.as_str()))
            .collect();

        let total = pending.len() as u64;
        let queue: Arc<WorkQueue<ContentId>> = Arc::new(WorkQueue::new(self.config.workers.max(1)));
        for id in pending {
            queue.put(id).ok();
        }
        queue.close();

        let created = Arc::new(AtomicU64::new(0));
        let updated = Arc::new(AtomicU64::new(0));
        let skipped = Arc::new(AtomicU64::new(0));
        let errors = Arc::new(AtomicU64::new(0));
        let checkpoint_interval = self.config.checkpoint_interval.max(1) as usize;
        let worker_errors = Arc::new(Mutex::new(Vec::<String>::new()));

        let mut handles = Vec::with_capacity(self.config.workers.max(1));
        for _ in 0..self.config.workers.max(1) {
            let queue = queue.clone();
            let store = self.store.clone();
            let restorer = self.restorer.clone();
            let metrics = self.metrics.clone();
            let cancel = cancel.clone();
            let dry_run = self.config.dry_run;
            let skip_if_modified = self.config.skip_if_modified;
            let created = created.clone();
            let updated = updated.clone();
            let skipped = skipped.clone();
            let errors = errors.clone();
            let checkpoint = checkpoint.clone();
            let worker_errors = worker_errors.clone();

            handles.push(std::thread::spawn(move || {
                let mark_done = |content_id: &ContentId| {
                    let mut cp = checkpoint.lock();
                    cp.state.completed_ids.push(content_id.as_str().to_string());
                    if cp.state.completed_ids.len() % checkpoint_interval == 0 {
                        cp.item_count = cp.state.completed_ids.len() as i64;
                        if let Err(e) = store.put_checkpoint(&cp) {
                            let message = format!("checkpoint persist failed: {e}");
                            metrics.record_error(message.clone());
                            worker_errors.lock().push(message);
                        }
                    }
                };

                while let Ok(content_id) = queue.get() {
                    if cancel.is_cancelled() {
                        break;
                    }

                    if skip_if_modified {
                        match restorer.destination_is_newer(&content_id, &cancel) {
                            Ok(true) => {
                                skipped.fetch_add(1, Ordering::Relaxed);
                                mark_done(&content_id);
                                continue;
                            }
                            Ok(false) => {}
                            Err(e) => {
                                warn!(%content_id, error = %e, "skip_if_modified check failed; continuing");
                            }
                        }
                    }

                    match restorer.restore_item(&content_id, dry_run, &cancel) {
                        Ok(result) => {
                            match result.operation {
                                RestoreOperation::Create => {
                                    created.fetch_add(1, Ordering::Relaxed);
                                }
                                RestoreOperation::Update => {
                                    updated.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                            metrics.record_item(content_id.content_type());
                            mark_done(&content_id);
                        }
                        Err(e) => {
                            errors.fetch_add(1, Ordering::Relaxed);
                            metrics.record_error(e.to_string());
                            error!(%content_id, error = %e, "restore failed; routing to dlq");
                            let content_data = store
                                .get_content(&content_id)
                                .ok()
                                .flatten()
                                .map(|item| item.content_data)
                                .unwrap_or_default();
                            let dlq_result = store.dlq_add(&DlqEntry {
                                id: 0,
                                session_id,
                                content_type: content_id.content_type(),
                                content_id: content_id.clone(),
                                content_data,
                                error_type: e.error_type().to_string(),
                                error_message: e.to_string(),
                                retry_count: 0,
                                failed_at: Utc::now(),
                            });
                            if let Err(store_err) = dlq_result {
                                worker_errors.lock().push(store_err.to_string());
                            }
                            // DLQ-routed items still count as "handled" for
                            // checkpoint purposes: resume must not retry them
                            // forever without `dlq retry`.
                            mark_done(&content_id);
                        }
                    }
                }
            }));
        }

        for handle in handles {
            if let Err(panic) = handle.join() {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "worker thread panicked".to_string());
                self.metrics.record_error(message.clone());
                worker_errors.lock().push(message);
            }
        }

        let mut checkpoint = Arc::try_unwrap(checkpoint)
            .unwrap_or_else(|arc| Mutex::new(arc.lock().clone()))
            .into_inner();
        checkpoint.item_count = checkpoint.state.completed_ids.len() as i64;
        checkpoint.completed_at = Some(Utc::now());
        let error_count = errors.load(Ordering::Relaxed);
        if error_count > 0 {
            checkpoint.error_message = Some(format!("{error_count} item(s) routed to DLQ"));
        }
        self.store.put_checkpoint(&checkpoint)?;

        let duration_s = type_started.elapsed().as_secs_f64();
        Ok(TypeSummary {
            total,
            created: created.load(Ordering::Relaxed),
            updated: updated.load(Ordering::Relaxed),
            skipped: skipped.load(Ordering::Relaxed),
            errors: error_count,
            duration_s,
            avg_items_per_second: if duration_s > 0.0 { total as f64 / duration_s } else { 0.0 },
        })
    }
}
