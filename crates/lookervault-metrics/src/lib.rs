use std::collections::HashMap;
use std::time::Instant;

use lookervault_store::ContentType;
use parking_lot::Mutex;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

struct Inner {
    items_processed: u64,
    items_by_type: HashMap<ContentType, u64>,
    batches_completed: u64,
    error_count: u64,
    worker_errors: Vec<String>,
    start_time: Instant,
}

/// Point-in-time counters owned independently of the lock that produced
/// them, so callers can hold and render a snapshot without blocking writers.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub items_processed: u64,
    pub items_by_type: HashMap<ContentType, u64>,
    pub batches_completed: u64,
    pub error_count: u64,
    pub worker_errors: Vec<String>,
    pub elapsed_secs: f64,
}

struct PrometheusSink {
    items_by_type: IntCounterVec,
    batches_completed: IntCounter,
    error_count: IntCounter,
}

/// Process-wide counters for one extraction or restoration run. Cheap to
/// clone via `Arc` and share across worker threads.
pub struct Metrics {
    inner: Mutex<Inner>,
    sink: Option<PrometheusSink>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items_processed: 0,
                items_by_type: HashMap::new(),
                batches_completed: 0,
                error_count: 0,
                worker_errors: Vec::new(),
                start_time: Instant::now(),
            }),
            sink: None,
        }
    }

    /// Registers counters on `registry` mirroring the in-process ones. This
    /// is ambient observability plumbing, not a cloud dashboard integration.
    pub fn with_registry(registry: &Registry) -> Result<Self, prometheus::Error> {
        let items_by_type = IntCounterVec::new(
            Opts::new("lookervault_items_total", "Items processed by content type"),
            &["content_type"],
        )?;
        let batches_completed = IntCounter::new(
            "lookervault_batches_completed_total",
            "Extraction/restoration batches completed",
        )?;
        let error_count =
            IntCounter::new("lookervault_errors_total", "Errors encountered during a run")?;

        registry.register(Box::new(items_by_type.clone()))?;
        registry.register(Box::new(batches_completed.clone()))?;
        registry.register(Box::new(error_count.clone()))?;

        let mut metrics = Self::new();
        metrics.sink = Some(PrometheusSink {
            items_by_type,
            batches_completed,
            error_count,
        });
        Ok(metrics)
    }

    pub fn record_item(&self, content_type: ContentType) {
        let mut inner = self.inner.lock();
        inner.items_processed += 1;
        *inner.items_by_type.entry(content_type).or_insert(0) += 1;
        if let Some(sink) = &self.sink {
            sink.items_by_type.with_label_values(&[content_type.name()]).inc();
        }
    }

    pub fn record_batch_completed(&self) {
        let mut inner = self.inner.lock();
        inner.batches_completed += 1;
        if let Some(sink) = &self.sink {
            sink.batches_completed.inc();
        }
    }

    pub fn record_error(&self, message: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.error_count += 1;
        inner.worker_errors.push(message.into());
        if let Some(sink) = &self.sink {
            sink.error_count.inc();
        }
    }

    /// Copies every field under the lock into an owned value; no reference
    /// into `Inner` ever escapes.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock();
        MetricsSnapshot {
            items_processed: inner.items_processed,
            items_by_type: inner.items_by_type.clone(),
            batches_completed: inner.batches_completed,
            error_count: inner.error_count,
            worker_errors: inner.worker_errors.clone(),
            elapsed_secs: inner.start_time.elapsed().as_secs_f64(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_items() {
        let metrics = Metrics::new();
        metrics.record_item(ContentType::Dashboard);
        metrics.record_item(ContentType::Dashboard);
        metrics.record_item(ContentType::Look);
        metrics.record_batch_completed();
        metrics.record_error("boom");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.items_processed, 3);
        assert_eq!(snapshot.items_by_type[&ContentType::Dashboard], 2);
        assert_eq!(snapshot.items_by_type[&ContentType::Look], 1);
        assert_eq!(snapshot.batches_completed, 1);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.worker_errors, vec!["boom".to_string()]);
    }

    #[test]
    fn registry_sink_mirrors_in_process_counters() {
        let registry = Registry::new();
        let metrics = Metrics::with_registry(&registry).unwrap();
        metrics.record_item(ContentType::Folder);
        metrics.record_batch_completed();

        let families = registry.gather();
        let names: Vec<_> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"lookervault_items_total".to_string()));
        assert!(names.contains(&"lookervault_batches_completed_total".to_string()));
    }
}
