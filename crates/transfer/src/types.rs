use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use uplift_protocol::{PutExtra, SourceFile};

/// A chunk of file data for transfer.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Byte offset within the file.
    pub offset: u64,
    /// Size of this chunk in bytes.
    pub size: usize,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// Hex MD5 digest of `data` (empty means no verification).
    pub checksum: String,
}

/// Event emitted by a transfer handle.
///
/// Per handle, zero or more `Progress` events with non-decreasing `loaded`
/// precede exactly one terminal event (`Completed` or `Failed`). A revoked
/// handle stops emitting and closes the channel instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    Progress { loaded: u64, total: u64 },
    Completed { final_key: String },
    Failed { error: String },
}

impl TransferEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

/// Ownership of one in-flight transfer: the event stream plus a revocable
/// cancellation token.
pub struct TransferHandle {
    events: mpsc::Receiver<TransferEvent>,
    cancel: CancellationToken,
}

impl TransferHandle {
    pub fn new(events: mpsc::Receiver<TransferEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// Revokes the transfer. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token observed by the transfer's drive loop.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receives the next event; `None` once the transfer is done or revoked.
    pub async fn recv(&mut self) -> Option<TransferEvent> {
        self.events.recv().await
    }

    /// Splits the handle into its event receiver and cancellation token.
    pub fn split(self) -> (mpsc::Receiver<TransferEvent>, CancellationToken) {
        (self.events, self.cancel)
    }
}

/// The chunked-upload transport capability.
///
/// Implementations must spawn the transfer and return immediately; all
/// progress and the terminal outcome are delivered through the handle.
pub trait Transport: Send + Sync {
    fn begin_upload(
        &self,
        file: Arc<SourceFile>,
        key: &str,
        token: &str,
        extra: PutExtra,
    ) -> TransferHandle;
}
