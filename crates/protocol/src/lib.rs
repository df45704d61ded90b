//! Shared data types for the uplift upload task manager.
//!
//! Pure serde types with no I/O: task status, progress snapshots, upload
//! credentials, source file handles, and the uploader configuration.

mod types;

pub use types::{
    DEFAULT_MIME_TYPE, MAX_CHUNK_SIZE_KB, PutExtra, Region, SourceFile, UploadCredential,
    UploadProgress, UploadStatus, UploaderConfig,
};
