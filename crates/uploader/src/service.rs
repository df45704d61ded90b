//! The public upload facade.

use std::sync::Arc;

use tracing::{info, warn};

use uplift_protocol::{PutExtra, SourceFile, UploadStatus, UploaderConfig};
use uplift_transfer::{ChunkSink, ChunkedTransport, Transport, validate_object_key};

use crate::broker::TokenProvider;
use crate::controller;
use crate::task::{ProgressCallback, StatusCallback, TaskCallbacks, TaskRegistry, UploadTask};

/// Manages resumable uploads end to end: credential negotiation, transport
/// attachment, lifecycle operations, and the task table.
///
/// `upload` and `resume` never fail with a fault for ordinary errors — a
/// broker or transport failure lands in the task as `status == Error` and
/// an error message, so callers always inspect the returned task.
pub struct UploadService {
    registry: TaskRegistry,
    broker: Arc<dyn TokenProvider>,
    transport: Arc<dyn Transport>,
    config: UploaderConfig,
}

impl UploadService {
    pub fn new(
        broker: Arc<dyn TokenProvider>,
        transport: Arc<dyn Transport>,
        config: UploaderConfig,
    ) -> Self {
        Self {
            registry: TaskRegistry::new(),
            broker,
            transport,
            config,
        }
    }

    /// Builds a service around the bundled chunked transport engine.
    pub fn with_sink<S: ChunkSink>(
        broker: Arc<dyn TokenProvider>,
        sink: S,
        config: UploaderConfig,
    ) -> Self {
        let transport = Arc::new(ChunkedTransport::new(sink, config.clone()));
        Self::new(broker, transport, config)
    }

    /// Accepts a file for upload and starts transferring it.
    ///
    /// Generates a file key when `key` is `None`. The returned task is
    /// `Uploading` on success and `Error` (with a message) when the key is
    /// invalid or the credential request fails; it may also already be
    /// `Cancelled` if the caller revoked it concurrently.
    pub async fn upload(
        &self,
        file: SourceFile,
        key: Option<String>,
        on_progress: Option<ProgressCallback>,
        on_status: Option<StatusCallback>,
    ) -> Arc<UploadTask> {
        let task = self.registry.create(Arc::new(file), key);
        task.set_callbacks(TaskCallbacks {
            on_progress,
            on_status,
        });
        info!(task = %task.id(), key = %task.original_key(), "upload accepted");

        if let Err(e) = validate_object_key(task.original_key()) {
            self.fail_task(&task, &e.to_string());
            return task;
        }

        match self
            .broker
            .request_credential(task.original_key(), false)
            .await
        {
            Ok(credential) => {
                // The server may reassign the key; the original stays the
                // resume identity.
                task.set_key(&credential.key);
                let extra = PutExtra {
                    fname: credential.fname,
                    mime_type: task.file().content_type().to_string(),
                    ..Default::default()
                };
                let handle = self.transport.begin_upload(
                    task.file(),
                    &credential.key,
                    &credential.token,
                    extra,
                );
                if controller::attach(&task, handle, self.config.cdn_domain.clone()) {
                    controller::notify_status(&task, UploadStatus::Uploading);
                }
            }
            Err(e) => self.fail_task(&task, &e.to_string()),
        }

        task
    }

    /// Pauses an uploading task, synchronously revoking its transport
    /// handle. Partial progress is retained for resume.
    pub fn pause(&self, id: &str) -> bool {
        let Some(task) = self.registry.get(id) else {
            return false;
        };
        if !task.pause() {
            return false;
        }
        info!(task = %id, "upload paused");
        controller::notify_status(&task, UploadStatus::Paused);
        true
    }

    /// Resumes a paused task.
    ///
    /// The credential is requested for the task's `original_key` with the
    /// keep-scope flag, and the transport restarts on that same key with
    /// the same file content, so the backend continues from its committed
    /// offset instead of starting over.
    pub async fn resume(
        &self,
        id: &str,
        on_progress: Option<ProgressCallback>,
        on_status: Option<StatusCallback>,
    ) -> bool {
        let Some(task) = self.registry.get(id) else {
            return false;
        };
        if task.status() != UploadStatus::Paused {
            return false;
        }

        // Re-attach the caller's observers before anything can transition.
        task.set_callbacks(TaskCallbacks {
            on_progress,
            on_status,
        });

        match self
            .broker
            .request_credential(task.original_key(), true)
            .await
        {
            Ok(credential) => {
                let extra = PutExtra {
                    // Original file name, not the server-assigned one.
                    fname: task.file().name().to_string(),
                    mime_type: task.file().content_type().to_string(),
                    ..Default::default()
                };
                let handle = self.transport.begin_upload(
                    task.file(),
                    task.original_key(),
                    &credential.token,
                    extra,
                );
                if !controller::attach(&task, handle, self.config.cdn_domain.clone()) {
                    return false;
                }
                info!(task = %id, key = %task.original_key(), "upload resumed");
                controller::notify_status(&task, UploadStatus::Uploading);
                true
            }
            Err(e) => {
                self.fail_task(&task, &e.to_string());
                false
            }
        }
    }

    /// Cancels a task. Returns `true` whenever the task exists; a cancel
    /// on an already-terminal task changes nothing.
    pub fn cancel(&self, id: &str) -> bool {
        let Some(task) = self.registry.get(id) else {
            return false;
        };
        if task.cancel() {
            info!(task = %id, "upload cancelled");
            controller::notify_status(&task, UploadStatus::Cancelled);
        }
        true
    }

    /// Cancels (if active) and deletes a task.
    pub fn remove(&self, id: &str) -> bool {
        let Some((task, transitioned)) = self.registry.remove_entry(id) else {
            return false;
        };
        if transitioned {
            controller::notify_status(&task, UploadStatus::Cancelled);
        }
        info!(task = %id, "task removed");
        true
    }

    pub fn get_task(&self, id: &str) -> Option<Arc<UploadTask>> {
        self.registry.get(id)
    }

    /// Snapshot of all tasks.
    pub fn list_tasks(&self) -> Vec<Arc<UploadTask>> {
        self.registry.list()
    }

    /// Drops every task in a terminal state.
    pub fn clear_completed(&self) {
        self.registry.clear_completed();
    }

    fn fail_task(&self, task: &Arc<UploadTask>, message: &str) {
        warn!(task = %task.id(), error = %message, "upload failed before transfer");
        if task.fail(message) {
            controller::notify_status(task, UploadStatus::Error);
        }
    }
}
