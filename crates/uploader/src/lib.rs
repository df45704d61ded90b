//! Resumable upload task manager.
//!
//! [`UploadService`] is the public surface: it accepts local files, trades
//! a file key for an upload credential with a [`TokenProvider`], pushes the
//! bytes through a [`Transport`](uplift_transfer::Transport), and tracks
//! every transfer as an [`UploadTask`] that can be paused, resumed (against
//! its stable `original_key`), cancelled, and observed through progress and
//! status callbacks.
//!
//! All ordinary failures end up as task state (`status == Error` plus a
//! message), never as a fault out of `upload`/`resume`; invalid-state and
//! unknown-id operations report `false`.

mod broker;
mod controller;
mod error;
mod format;
mod service;
mod task;

pub use broker::TokenProvider;
pub use error::CredentialError;
pub use format::{format_remaining_time, format_size, format_speed};
pub use service::UploadService;
pub use task::{ProgressCallback, StatusCallback, TaskCallbacks, TaskRegistry, UploadTask};
