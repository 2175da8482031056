use std::collections::BTreeSet;

use parking_lot::Mutex;

/// Lock-protected offset allocator for a single-stream workload: "same API
/// call, increasing offset", with the total unknown in advance.
pub struct OffsetCoordinator {
    state: Mutex<OffsetState>,
}

struct OffsetState {
    next_offset: i64,
    workers_done: usize,
    total_workers: usize,
    stride: i64,
}

impl OffsetCoordinator {
    pub fn new(total_workers: usize, stride: i64) -> Self {
        Self {
            state: Mutex::new(OffsetState {
                next_offset: 0,
                workers_done: 0,
                total_workers,
                stride,
            }),
        }
    }

    pub fn set_total_workers(&self, n: usize) {
        self.state.lock().total_workers = n;
    }

    /// Returns `None` once every worker has reported end-of-data.
    pub fn claim_range(&self) -> Option<(i64, i64)> {
        let mut state = self.state.lock();
        if state.workers_done >= state.total_workers {
            return None;
        }
        let offset = state.next_offset;
        let limit = state.stride;
        state.next_offset += state.stride;
        Some((offset, limit))
    }

    /// Called by a worker that received an empty result page.
    pub fn mark_worker_done(&self) {
        self.state.lock().workers_done += 1;
    }
}

struct FolderState {
    folder_id: i64,
    next_offset: i64,
    workers_done: usize,
    exhausted: bool,
}

struct MultiFolderState {
    folders: Vec<FolderState>,
    total_workers: usize,
    cursor: usize,
}

/// Round-robin variant claiming `(folder_id, offset, limit)` triples across
/// a fixed set of folders. Folder ids are deduplicated at construction (a
/// `BTreeSet` pass) since recursive folder expansion can otherwise hand the
/// same id to the coordinator twice.
pub struct MultiFolderOffsetCoordinator {
    state: Mutex<MultiFolderState>,
    stride: i64,
}

impl MultiFolderOffsetCoordinator {
    pub fn new(folder_ids: impl IntoIterator<Item = i64>, total_workers: usize, stride: i64) -> Self {
        let deduped: BTreeSet<i64> = folder_ids.into_iter().collect();
        let folders = deduped
            .into_iter()
            .map(|folder_id| FolderState {
                folder_id,
                next_offset: 0,
                workers_done: 0,
                exhausted: false,
            })
            .collect();
        Self {
            state: Mutex::new(MultiFolderState {
                folders,
                total_workers,
                cursor: 0,
            }),
            stride,
        }
    }

    pub fn set_total_workers(&self, n: usize) {
        self.state.lock().total_workers = n;
    }

    /// Returns `None` once every folder is exhausted. No `(folder_id,
    /// offset)` pair is ever handed out twice: each call advances that
    /// folder's `next_offset` before releasing the lock.
    pub fn claim_range(&self) -> Option<(i64, i64, i64)> {
        let mut state = self.state.lock();
        if state.folders.is_empty() || state.folders.iter().all(|f| f.exhausted) {
            return None;
        }
        let len = state.folders.len();
        let cursor = state.cursor;
        for step in 0..len {
            let idx = (cursor + step) % len;
            if state.folders[idx].exhausted {
                continue;
            }
            let folder = &mut state.folders[idx];
            let offset = folder.next_offset;
            let limit = self.stride;
            folder.next_offset += self.stride;
            let folder_id = folder.folder_id;
            state.cursor = (idx + 1) % len;
            return Some((folder_id, offset, limit));
        }
        None
    }

    pub fn mark_worker_done_for_folder(&self, folder_id: i64) {
        let mut state = self.state.lock();
        let total_workers = state.total_workers;
        if let Some(folder) = state.folders.iter_mut().find(|f| f.folder_id == folder_id) {
            folder.workers_done += 1;
            if folder.workers_done >= total_workers {
                folder.exhausted = true;
            }
        }
    }
}
