//! Credential broker error types.

/// Failure reported by the credential authority.
///
/// Never retried at this layer; the caller converts it into task state.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("credential authority unreachable: {0}")]
    Unreachable(String),

    #[error("credential request rejected: {0}")]
    Rejected(String),
}
