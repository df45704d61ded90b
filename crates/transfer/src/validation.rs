use crate::TransferError;

/// Longest object key the backend accepts, in bytes.
const MAX_KEY_LEN: usize = 750;

/// Validates a storage object key before any credential or chunk request.
///
/// Rejects:
/// - Empty keys
/// - Keys starting with `/` (backends treat keys as relative names)
/// - `.` / `..` path segments
/// - Control characters
/// - Keys longer than the backend maximum
pub fn validate_object_key(key: &str) -> Result<(), TransferError> {
    if key.is_empty() {
        return Err(TransferError::InvalidKey("empty key".into()));
    }

    if key.len() > MAX_KEY_LEN {
        return Err(TransferError::InvalidKey(format!(
            "key exceeds {MAX_KEY_LEN} bytes"
        )));
    }

    if key.starts_with('/') {
        return Err(TransferError::InvalidKey(format!(
            "key must not start with '/': {key}"
        )));
    }

    if key.split('/').any(|seg| seg == "." || seg == "..") {
        return Err(TransferError::InvalidKey(format!(
            "relative path segment not allowed: {key}"
        )));
    }

    if key.chars().any(char::is_control) {
        return Err(TransferError::InvalidKey(
            "control character in key".into(),
        ));
    }

    Ok(())
}
