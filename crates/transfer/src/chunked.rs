use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use uplift_protocol::{PutExtra, SourceFile, UploaderConfig};

use crate::types::{Chunk, TransferEvent, TransferHandle, Transport};
use crate::{EVENT_CHANNEL_CAPACITY, TransferError};

/// Base delay between chunk retry attempts (scaled linearly per attempt).
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Computes the hex MD5 digest of `data`.
pub fn checksum_bytes(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Slices a source file into fixed-size chunks, optionally attaching an
/// MD5 checksum to each.
pub struct ChunkReader {
    file: Arc<SourceFile>,
    chunk_size: usize,
    offset: u64,
    with_md5: bool,
}

impl ChunkReader {
    pub fn new(file: Arc<SourceFile>, chunk_size: usize, with_md5: bool) -> Self {
        Self {
            file,
            chunk_size: chunk_size.max(1),
            offset: 0,
            with_md5,
        }
    }

    /// Seeks to the given byte offset (for resume), clamped to the file size.
    pub fn seek_to(&mut self, offset: u64) {
        self.offset = offset.min(self.file.size());
    }

    /// Reads the next chunk. Returns `None` at EOF.
    pub fn next_chunk(&mut self) -> Option<Chunk> {
        let remaining = self.file.size().saturating_sub(self.offset);
        if remaining == 0 {
            return None;
        }

        let size = remaining.min(self.chunk_size as u64) as usize;
        let start = self.offset as usize;
        let data = self.file.data()[start..start + size].to_vec();
        let checksum = if self.with_md5 {
            checksum_bytes(&data)
        } else {
            String::new()
        };

        let chunk = Chunk {
            offset: self.offset,
            size,
            data,
            checksum,
        };
        self.offset += size as u64;
        Some(chunk)
    }
}

// ---------------------------------------------------------------------------
// ChunkSink
// ---------------------------------------------------------------------------

/// Vendor-specific chunk persistence operations.
///
/// The engine drives these; everything else (chunking, retries, concurrency,
/// resume negotiation, event emission) is engine-owned.
pub trait ChunkSink: Send + Sync + 'static {
    /// Bytes the backend has already committed for `key` (the resume point).
    /// Keys the backend has never seen report 0.
    fn committed_offset(
        &self,
        key: &str,
        token: &str,
    ) -> impl Future<Output = Result<u64, TransferError>> + Send;

    /// Persists one chunk.
    fn put_chunk(
        &self,
        key: &str,
        token: &str,
        chunk: &Chunk,
        extra: &PutExtra,
    ) -> impl Future<Output = Result<(), TransferError>> + Send;

    /// Assembles the committed chunks into the final object and returns its
    /// final key.
    fn finalize(
        &self,
        key: &str,
        token: &str,
        extra: &PutExtra,
    ) -> impl Future<Output = Result<String, TransferError>> + Send;
}

// ---------------------------------------------------------------------------
// ChunkedTransport
// ---------------------------------------------------------------------------

/// [`Transport`] implementation driving a [`ChunkSink`].
pub struct ChunkedTransport<S> {
    sink: Arc<S>,
    config: UploaderConfig,
}

impl<S: ChunkSink> ChunkedTransport<S> {
    pub fn new(sink: S, config: UploaderConfig) -> Self {
        Self {
            sink: Arc::new(sink),
            config,
        }
    }
}

impl<S: ChunkSink> Transport for ChunkedTransport<S> {
    fn begin_upload(
        &self,
        file: Arc<SourceFile>,
        key: &str,
        token: &str,
        extra: PutExtra,
    ) -> TransferHandle {
        let (events, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        tokio::spawn(drive(
            Arc::clone(&self.sink),
            self.config.clone(),
            file,
            key.to_string(),
            token.to_string(),
            extra,
            events,
            cancel.clone(),
        ));

        TransferHandle::new(rx, cancel)
    }
}

/// Runs one transfer to its terminal event, or silently stops on revocation.
#[allow(clippy::too_many_arguments)]
async fn drive<S: ChunkSink>(
    sink: Arc<S>,
    config: UploaderConfig,
    file: Arc<SourceFile>,
    key: String,
    token: String,
    extra: PutExtra,
    events: mpsc::Sender<TransferEvent>,
    cancel: CancellationToken,
) {
    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(key = %key, "transfer revoked");
            return;
        }
        outcome = run_transfer(&sink, &config, &file, &key, &token, &extra, &events, &cancel) => outcome,
    };

    if cancel.is_cancelled() {
        return;
    }

    match outcome {
        Ok(final_key) => {
            debug!(key = %key, final_key = %final_key, "transfer completed");
            let _ = events.send(TransferEvent::Completed { final_key }).await;
        }
        Err(e) => {
            warn!(key = %key, error = %e, "transfer failed");
            let _ = events
                .send(TransferEvent::Failed {
                    error: e.to_string(),
                })
                .await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_transfer<S: ChunkSink>(
    sink: &Arc<S>,
    config: &UploaderConfig,
    file: &Arc<SourceFile>,
    key: &str,
    token: &str,
    extra: &PutExtra,
    events: &mpsc::Sender<TransferEvent>,
    cancel: &CancellationToken,
) -> Result<String, TransferError> {
    let total = file.size();
    let offset = sink.committed_offset(key, token).await?.min(total);
    if offset > 0 {
        debug!(key = %key, offset, "resuming from committed offset");
    }
    let _ = events
        .send(TransferEvent::Progress {
            loaded: offset,
            total,
        })
        .await;

    let ctx = ChunkWorkerCtx {
        sink: Arc::clone(sink),
        key: key.to_string(),
        token: token.to_string(),
        extra: extra.clone(),
        retry_count: config.retry_count,
        // Child token: revocation propagates in, a chunk failure aborts the
        // remaining workers without touching the caller's token.
        abort: cancel.child_token(),
        loaded: Arc::new(tokio::sync::Mutex::new(offset)),
        events: events.clone(),
        total,
        failure: Arc::new(Mutex::new(None)),
    };

    let semaphore = Arc::new(Semaphore::new(config.concurrent_request_limit.max(1)));
    let mut reader = ChunkReader::new(Arc::clone(file), config.chunk_size_bytes(), config.check_by_md5);
    reader.seek_to(offset);

    let mut workers = Vec::new();
    while let Some(chunk) = reader.next_chunk() {
        let permit = tokio::select! {
            _ = ctx.abort.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };
        let ctx = ctx.clone();
        workers.push(tokio::spawn(async move {
            let _permit = permit;
            upload_chunk(ctx, chunk).await;
        }));
    }

    for worker in workers {
        let _ = worker.await;
    }

    if cancel.is_cancelled() {
        return Err(TransferError::Cancelled);
    }
    if let Some(err) = ctx.failure.lock().unwrap().take() {
        return Err(err);
    }

    sink.finalize(key, token, extra).await
}

/// Shared state handed to each chunk worker.
struct ChunkWorkerCtx<S> {
    sink: Arc<S>,
    key: String,
    token: String,
    extra: PutExtra,
    retry_count: u32,
    abort: CancellationToken,
    loaded: Arc<tokio::sync::Mutex<u64>>,
    events: mpsc::Sender<TransferEvent>,
    total: u64,
    failure: Arc<Mutex<Option<TransferError>>>,
}

impl<S> Clone for ChunkWorkerCtx<S> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            key: self.key.clone(),
            token: self.token.clone(),
            extra: self.extra.clone(),
            retry_count: self.retry_count,
            abort: self.abort.clone(),
            loaded: Arc::clone(&self.loaded),
            events: self.events.clone(),
            total: self.total,
            failure: Arc::clone(&self.failure),
        }
    }
}

async fn upload_chunk<S: ChunkSink>(ctx: ChunkWorkerCtx<S>, chunk: Chunk) {
    let result = tokio::select! {
        _ = ctx.abort.cancelled() => return,
        result = put_with_retry(&ctx, &chunk) => result,
    };

    match result {
        Ok(()) => {
            if ctx.abort.is_cancelled() {
                return;
            }
            // Hold the counter across the send so loaded values arrive in
            // non-decreasing order even with concurrent workers.
            let mut loaded = ctx.loaded.lock().await;
            *loaded += chunk.size as u64;
            let _ = ctx
                .events
                .send(TransferEvent::Progress {
                    loaded: *loaded,
                    total: ctx.total,
                })
                .await;
        }
        Err(e) => {
            let mut failure = ctx.failure.lock().unwrap();
            if failure.is_none() {
                *failure = Some(e);
            }
            drop(failure);
            ctx.abort.cancel();
        }
    }
}

async fn put_with_retry<S: ChunkSink>(
    ctx: &ChunkWorkerCtx<S>,
    chunk: &Chunk,
) -> Result<(), TransferError> {
    let mut attempt: u32 = 0;
    loop {
        match ctx
            .sink
            .put_chunk(&ctx.key, &ctx.token, chunk, &ctx.extra)
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) if attempt < ctx.retry_count => {
                attempt += 1;
                debug!(
                    key = %ctx.key,
                    offset = chunk.offset,
                    attempt,
                    error = %e,
                    "retrying chunk"
                );
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }
            Err(e) => {
                return Err(TransferError::RetriesExhausted {
                    attempts: attempt + 1,
                    last: e.to_string(),
                });
            }
        }
    }
}
