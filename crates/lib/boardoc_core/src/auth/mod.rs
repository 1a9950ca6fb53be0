//! Token signing and verification.
//!
//! Provides the application's own JWT codec (session and editor tokens) and
//! the verifier for identity assertions issued by the whiteboard platform.

pub mod jwt;
pub mod platform;

use thiserror::Error;

/// Token verification errors.
///
/// Callers at the HTTP boundary collapse every variant into one generic
/// unauthenticated response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is malformed")]
    Malformed,

    #[error("token encode: {0}")]
    Encode(String),
}

/// Whether `token` has the compact JWS shape: three non-empty segments.
pub(crate) fn is_compact_jws(token: &str) -> bool {
    let mut segments = 0;
    for part in token.split('.') {
        if part.is_empty() {
            return false;
        }
        segments += 1;
    }
    segments == 3
}

/// Map a `jsonwebtoken` decode failure onto the codec taxonomy.
///
/// `jsonwebtoken` checks the signature before any claim, so `ExpiredSignature`
/// is only reported for authentic tokens. Every other failure on a well-shaped
/// token means its bytes are not the ones that were signed.
pub(crate) fn classify(token: &str, err: &jsonwebtoken::errors::Error) -> CodecError {
    use jsonwebtoken::errors::ErrorKind;

    if !is_compact_jws(token) {
        return CodecError::Malformed;
    }
    match err.kind() {
        ErrorKind::ExpiredSignature => CodecError::Expired,
        ErrorKind::InvalidToken => CodecError::Malformed,
        _ => CodecError::InvalidSignature,
    }
}
