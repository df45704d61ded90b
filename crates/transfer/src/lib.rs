//! Chunked upload transport with resume support and progress events.
//!
//! The [`Transport`] trait is the capability the task manager consumes:
//! `begin_upload` returns a [`TransferHandle`] that emits zero or more
//! progress events followed by exactly one terminal event, and can be
//! revoked at any time through its cancellation token.
//!
//! [`ChunkedTransport`] is the bundled implementation: it slices a source
//! file into chunks, asks the backend for the committed offset (the resume
//! point), submits chunks under a bounded concurrency limit with a
//! per-chunk retry budget, and finalizes the object. The vendor-specific
//! wire details live behind the [`ChunkSink`] trait.

mod chunked;
mod progress;
mod types;
mod validation;

pub use chunked::{ChunkReader, ChunkSink, ChunkedTransport, checksum_bytes};
pub use progress::{Estimate, estimate_progress};
pub use types::{Chunk, TransferEvent, TransferHandle, Transport};
pub use validation::validate_object_key;

/// Buffered events per transfer handle.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Backend rejected or failed a request.
    #[error("{0}")]
    Sink(String),

    #[error("chunk upload failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("invalid object key: {0}")]
    InvalidKey(String),
}
