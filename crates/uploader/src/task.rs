//! Upload task records and the task registry.
//!
//! `UploadTask` is the authoritative record for one managed upload. All
//! mutation goes through its lock, and every transport attachment carries
//! an epoch: events from a revoked handle fail the epoch check and cannot
//! mutate the task, which makes pause/cancel teardown synchronous and
//! race-free.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use uplift_protocol::{SourceFile, UploadProgress, UploadStatus};
use uplift_transfer::estimate_progress;

/// Callback invoked with each accepted progress snapshot.
pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Callback invoked once per status transition.
pub type StatusCallback = Arc<dyn Fn(UploadStatus) + Send + Sync>;

/// Observer callbacks attached by `upload` and replaced by `resume`.
#[derive(Clone, Default)]
pub struct TaskCallbacks {
    pub on_progress: Option<ProgressCallback>,
    pub on_status: Option<StatusCallback>,
}

/// The active transport attachment: its revocation token and the epoch it
/// was installed under.
struct ActiveHandle {
    epoch: u64,
    cancel: CancellationToken,
}

struct TaskInner {
    key: String,
    status: UploadStatus,
    progress: UploadProgress,
    error: Option<String>,
    url: Option<String>,
    handle: Option<ActiveHandle>,
    epoch: u64,
    callbacks: TaskCallbacks,
    started_at: Instant,
    last_progress_at: Option<Instant>,
}

/// One managed file upload with its own lifecycle and progress state.
///
/// External references are read views: all accessors take `&self` and the
/// mutators are crate-internal.
pub struct UploadTask {
    id: String,
    file: Arc<SourceFile>,
    original_key: String,
    inner: RwLock<TaskInner>,
}

impl UploadTask {
    fn new(id: String, file: Arc<SourceFile>, key: String) -> Self {
        let total = file.size();
        Self {
            id,
            file,
            original_key: key.clone(),
            inner: RwLock::new(TaskInner {
                key,
                status: UploadStatus::Pending,
                progress: UploadProgress::new(total),
                error: None,
                url: None,
                handle: None,
                epoch: 0,
                callbacks: TaskCallbacks::default(),
                started_at: Instant::now(),
                last_progress_at: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file(&self) -> Arc<SourceFile> {
        Arc::clone(&self.file)
    }

    /// Current storage key; may have been reassigned by the credential
    /// authority.
    pub fn key(&self) -> String {
        self.inner.read().unwrap().key.clone()
    }

    /// The locally generated key, immutable after creation. This is the
    /// resume identity: resume credentials are always scoped to it.
    pub fn original_key(&self) -> &str {
        &self.original_key
    }

    pub fn status(&self) -> UploadStatus {
        self.inner.read().unwrap().status
    }

    pub fn progress(&self) -> UploadProgress {
        self.inner.read().unwrap().progress.clone()
    }

    /// Most recent failure message; present only while `status == Error`.
    pub fn error(&self) -> Option<String> {
        self.inner.read().unwrap().error.clone()
    }

    /// Public address of the finished object; present only on `Success`.
    pub fn url(&self) -> Option<String> {
        self.inner.read().unwrap().url.clone()
    }

    pub(crate) fn set_key(&self, key: &str) {
        self.inner.write().unwrap().key = key.to_string();
    }

    pub(crate) fn set_callbacks(&self, callbacks: TaskCallbacks) {
        self.inner.write().unwrap().callbacks = callbacks;
    }

    pub(crate) fn callbacks(&self) -> TaskCallbacks {
        self.inner.read().unwrap().callbacks.clone()
    }

    /// Installs a transport attachment and moves to `Uploading`.
    ///
    /// Valid only from `Pending` or `Paused`; returns the attachment epoch,
    /// or `None` when the task moved on in the meantime (e.g. it was
    /// cancelled while credentials were in flight) — the caller must then
    /// revoke the fresh handle itself.
    pub(crate) fn begin_transfer(&self, cancel: CancellationToken) -> Option<u64> {
        let mut inner = self.inner.write().unwrap();
        if !matches!(inner.status, UploadStatus::Pending | UploadStatus::Paused) {
            return None;
        }
        inner.epoch += 1;
        let epoch = inner.epoch;
        inner.handle = Some(ActiveHandle { epoch, cancel });
        inner.status = UploadStatus::Uploading;
        Some(epoch)
    }

    /// Applies a progress event from attachment `epoch`.
    ///
    /// Returns the updated snapshot, or `None` when the event is stale
    /// (revoked attachment), out of order (`loaded` regression), or the
    /// task is no longer uploading. `total` is fixed at creation and never
    /// overwritten by events.
    pub(crate) fn apply_progress(&self, epoch: u64, loaded: u64) -> Option<UploadProgress> {
        let mut inner = self.inner.write().unwrap();
        if !inner.attached_to(epoch) || inner.status != UploadStatus::Uploading {
            return None;
        }
        if loaded < inner.progress.loaded {
            return None;
        }

        let now = Instant::now();
        let previous_at = inner.last_progress_at.unwrap_or(inner.started_at);
        let total = inner.progress.total;
        let estimate = estimate_progress(inner.progress.loaded, previous_at, loaded, now, total);

        inner.progress.loaded = loaded;
        inner.progress.percent = UploadProgress::percent_of(loaded, total);
        inner.progress.speed = Some(estimate.speed_bytes_per_sec);
        inner.progress.remaining_time = Some(estimate.remaining_time_secs);
        inner.last_progress_at = Some(now);

        Some(inner.progress.clone())
    }

    /// Terminal success from attachment `epoch`. Returns `false` when stale.
    pub(crate) fn complete_transfer(&self, epoch: u64, final_key: &str, cdn_domain: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        if !inner.attached_to(epoch) || inner.status != UploadStatus::Uploading {
            return false;
        }
        inner.detach();
        inner.status = UploadStatus::Success;
        inner.url = if final_key.is_empty() {
            None
        } else {
            Some(format!("{cdn_domain}/{final_key}"))
        };
        true
    }

    /// Terminal failure from attachment `epoch`. Returns `false` when stale.
    pub(crate) fn fail_transfer(&self, epoch: u64, error: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        if !inner.attached_to(epoch) || inner.status != UploadStatus::Uploading {
            return false;
        }
        inner.detach();
        inner.status = UploadStatus::Error;
        inner.error = Some(error.to_string());
        true
    }

    /// Marks a non-terminal task failed outside any attachment (credential
    /// failures). Returns `false` if the task already reached a terminal
    /// state.
    pub(crate) fn fail(&self, error: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.status.is_terminal() {
            return false;
        }
        inner.detach();
        inner.status = UploadStatus::Error;
        inner.error = Some(error.to_string());
        true
    }

    /// Pauses an uploading task, revoking its attachment synchronously.
    /// Partial progress is retained. Returns `false` in any other state.
    pub(crate) fn pause(&self) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.status != UploadStatus::Uploading {
            return false;
        }
        inner.detach();
        inner.status = UploadStatus::Paused;
        true
    }

    /// Cancels the task from any non-terminal state. Returns `true` when a
    /// transition happened; a redundant cancel on a terminal task is a
    /// no-op.
    pub(crate) fn cancel(&self) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.status.is_terminal() {
            inner.detach();
            return false;
        }
        inner.detach();
        inner.status = UploadStatus::Cancelled;
        true
    }
}

impl TaskInner {
    fn attached_to(&self, epoch: u64) -> bool {
        self.handle.as_ref().is_some_and(|h| h.epoch == epoch)
    }

    /// Revokes and drops the attachment, if any. The epoch bump makes any
    /// in-flight event from the old handle stale.
    fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel.cancel();
        }
        self.epoch += 1;
    }
}

// ---------------------------------------------------------------------------
// TaskRegistry
// ---------------------------------------------------------------------------

/// The authoritative table of upload tasks. Task objects are never
/// duplicated; every lookup hands out the same `Arc`.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Arc<UploadTask>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a `Pending` task, generating an id and (if absent) a file
    /// key of the form `uploads/{millis}_{random}.{ext}`.
    pub fn create(&self, file: Arc<SourceFile>, key: Option<String>) -> Arc<UploadTask> {
        let id = Uuid::new_v4().to_string();
        let key = key.unwrap_or_else(|| generate_file_key(&file));
        let task = Arc::new(UploadTask::new(id, file, key));
        self.tasks
            .write()
            .unwrap()
            .insert(task.id().to_string(), Arc::clone(&task));
        task
    }

    pub fn get(&self, id: &str) -> Option<Arc<UploadTask>> {
        self.tasks.read().unwrap().get(id).cloned()
    }

    /// Snapshot of all tasks; not a live view.
    pub fn list(&self) -> Vec<Arc<UploadTask>> {
        self.tasks.read().unwrap().values().cloned().collect()
    }

    /// Cancels (if still active) and deletes a task. Returns the removed
    /// task and whether the cancel actually transitioned it.
    pub(crate) fn remove_entry(&self, id: &str) -> Option<(Arc<UploadTask>, bool)> {
        let task = self.tasks.write().unwrap().remove(id)?;
        let transitioned = task.cancel();
        Some((task, transitioned))
    }

    /// Cancels-if-active and deletes. `false` for unknown ids.
    pub fn remove(&self, id: &str) -> bool {
        self.remove_entry(id).is_some()
    }

    /// Drops every task in a terminal state; in-flight tasks are untouched.
    pub fn clear_completed(&self) {
        self.tasks
            .write()
            .unwrap()
            .retain(|_, task| !task.status().is_terminal());
    }
}

fn generate_file_key(file: &SourceFile) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let random: String = Uuid::new_v4().simple().to_string().chars().take(9).collect();
    let ext = file.extension();
    format!("uploads/{millis}_{random}.{ext}")
}
