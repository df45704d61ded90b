//! Credential broker interface.
//!
//! The remote authority that issues upload credentials is external; the
//! task manager only needs this one operation. Using a trait keeps the
//! lifecycle logic decoupled from the wire client and testable with mocks.

use std::future::Future;
use std::pin::Pin;

use uplift_protocol::UploadCredential;

use crate::error::CredentialError;

/// Requests upload credentials from the external authority.
///
/// `keep_scope = false` is a fresh upload: the server may reassign the key.
/// `keep_scope = true` is a resume: the server must honor `file_key`
/// exactly, returning an equivalent key/token pair for the same logical
/// object. Nothing is cached and nothing is retried here — retry policy
/// belongs to the caller.
pub trait TokenProvider: Send + Sync {
    fn request_credential(
        &self,
        file_key: &str,
        keep_scope: bool,
    ) -> Pin<Box<dyn Future<Output = Result<UploadCredential, CredentialError>> + Send + '_>>;
}
