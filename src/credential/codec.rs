//! base64url codec for binary ceremony material
//!
//! Output never carries padding. Input may carry `=` padding, which is
//! stripped before decoding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Error returned when text is not valid base64url
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid base64url data: {0}")]
pub struct DecodeError(String);

/// Encode bytes as unpadded base64url
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url text, tolerating trailing padding
///
/// # Errors
///
/// Returns an error if the text contains characters outside the base64url
/// alphabet or has an impossible length.
pub fn decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = text.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed.as_bytes())
        .map_err(|e| DecodeError(e.to_string()))
}
