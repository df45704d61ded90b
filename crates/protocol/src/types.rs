use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// MIME type assumed when a source file declares none.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Backend-imposed upper bound on the chunk size, in KB.
pub const MAX_CHUNK_SIZE_KB: u32 = 1024;

/// Lifecycle state of an upload task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Paused,
    Success,
    Error,
    Cancelled,
}

impl UploadStatus {
    /// Returns `true` once the task can no longer make progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Cancelled)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Paused => "paused",
            Self::Success => "success",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Progress snapshot for an upload task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub loaded: u64,
    pub total: u64,
    pub percent: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_time: Option<f64>,
}

impl UploadProgress {
    /// Initial progress for a file of `total` bytes.
    pub fn new(total: u64) -> Self {
        Self {
            loaded: 0,
            total,
            percent: 0,
            speed: None,
            remaining_time: None,
        }
    }

    /// Percent complete, rounded to the nearest integer (0 for empty files).
    pub fn percent_of(loaded: u64, total: u64) -> u32 {
        if total == 0 {
            return 0;
        }
        (loaded as f64 / total as f64 * 100.0).round() as u32
    }
}

/// Credential issued by the authority for one storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCredential {
    pub token: String,
    pub key: String,
    pub fname: String,
}

/// A local file accepted for upload: name, declared content type, and
/// exclusively owned byte content.
///
/// Fresh upload and resume must hand the *same* `SourceFile` to the
/// transport, so callers share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    name: String,
    content_type: String,
    data: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared content type, or [`DEFAULT_MIME_TYPE`] if empty.
    pub fn content_type(&self) -> &str {
        if self.content_type.is_empty() {
            DEFAULT_MIME_TYPE
        } else {
            &self.content_type
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Segment after the last `.` of the name (the whole name if it has none).
    pub fn extension(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or_default()
    }
}

/// Extra parameters forwarded to the transport with each upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutExtra {
    pub fname: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, String>,
}

/// Storage region selector for the transport backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "z0")]
    Z0,
    #[serde(rename = "z1")]
    Z1,
    #[default]
    #[serde(rename = "z2")]
    Z2,
    #[serde(rename = "na0")]
    Na0,
    #[serde(rename = "as0")]
    As0,
    #[serde(rename = "cn-east-2")]
    CnEast2,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Z0 => "z0",
            Self::Z1 => "z1",
            Self::Z2 => "z2",
            Self::Na0 => "na0",
            Self::As0 => "as0",
            Self::CnEast2 => "cn-east-2",
        }
    }
}

/// Uploader configuration recognized by the task manager and transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploaderConfig {
    pub region: Region,
    /// Direct upload host override (bypasses region selection).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Base URL used to build the public `url` of a finished upload.
    pub cdn_domain: String,
    pub use_cdn_domain: bool,
    pub force_direct: bool,
    /// Per-chunk retry budget.
    pub retry_count: u32,
    /// Maximum chunks in flight per transfer.
    pub concurrent_request_limit: usize,
    /// Chunk size in KB, clamped to [`MAX_CHUNK_SIZE_KB`].
    pub chunk_size: u32,
    /// Attach an MD5 digest to every chunk for backend verification.
    pub check_by_md5: bool,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            region: Region::Z2,
            domain: None,
            cdn_domain: String::new(),
            use_cdn_domain: true,
            force_direct: false,
            retry_count: 3,
            concurrent_request_limit: 3,
            chunk_size: MAX_CHUNK_SIZE_KB,
            check_by_md5: false,
        }
    }
}

impl UploaderConfig {
    /// Chunk size in bytes, clamped to 1..=[`MAX_CHUNK_SIZE_KB`] KB.
    pub fn chunk_size_bytes(&self) -> usize {
        self.chunk_size.clamp(1, MAX_CHUNK_SIZE_KB) as usize * 1024
    }
}
