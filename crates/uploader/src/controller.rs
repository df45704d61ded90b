//! Transfer controller: attaches transport handles to tasks and pumps
//! their events into the task record.
//!
//! The pump is the only writer for transport-originated mutations, and
//! every write re-validates the attachment epoch, so a handle revoked by
//! `pause`/`cancel` can never mutate the task afterwards.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use uplift_protocol::UploadStatus;
use uplift_transfer::{TransferEvent, TransferHandle};

use crate::task::UploadTask;

/// Installs `handle` on `task`, moves it to `Uploading`, and spawns the
/// event pump.
///
/// Returns `false` (revoking the fresh handle) when the task left its
/// startable state while credentials were in flight.
pub(crate) fn attach(task: &Arc<UploadTask>, handle: TransferHandle, cdn_domain: String) -> bool {
    let (events, cancel) = handle.split();
    let Some(epoch) = task.begin_transfer(cancel.clone()) else {
        cancel.cancel();
        return false;
    };
    tokio::spawn(pump(Arc::clone(task), events, epoch, cdn_domain));
    true
}

/// Fires the task's status callback, if any.
pub(crate) fn notify_status(task: &UploadTask, status: UploadStatus) {
    if let Some(on_status) = task.callbacks().on_status {
        on_status(status);
    }
}

async fn pump(
    task: Arc<UploadTask>,
    mut events: mpsc::Receiver<TransferEvent>,
    epoch: u64,
    cdn_domain: String,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransferEvent::Progress { loaded, .. } => {
                if let Some(snapshot) = task.apply_progress(epoch, loaded) {
                    if let Some(on_progress) = task.callbacks().on_progress {
                        on_progress(snapshot);
                    }
                }
            }
            TransferEvent::Completed { final_key } => {
                if task.complete_transfer(epoch, &final_key, &cdn_domain) {
                    info!(task = %task.id(), final_key = %final_key, "upload succeeded");
                    notify_status(&task, UploadStatus::Success);
                }
                break;
            }
            TransferEvent::Failed { error } => {
                if task.fail_transfer(epoch, &error) {
                    warn!(task = %task.id(), error = %error, "upload failed");
                    notify_status(&task, UploadStatus::Error);
                }
                break;
            }
        }
    }
    debug!(task = %task.id(), epoch, "event pump finished");
}
