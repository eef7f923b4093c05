use axum::http::StatusCode;
use thiserror::Error;

/// Mint and verification failures for media grants.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum GrantError {
    /// Token could not be decoded or parsed.
    #[error("malformed token")]
    Malformed,

    /// MAC did not match the token fields: tampering or wrong key.
    #[error("signature mismatch")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    /// Token was minted for a different user.
    #[error("user identity does not match grant")]
    UserMismatch,

    /// Token was minted for different content or a different object.
    #[error("content identity does not match grant")]
    ContentMismatch,

    /// The mint request was invalid before any credential was produced.
    #[error("invalid grant request: {0}")]
    InvalidGrant(&'static str),

    /// The storage backend refused to produce a signed URL.
    #[error("storage backend error: {0}")]
    Storage(String),
}

impl GrantError {
    /// Status mapping for the internal mint API only. The external media
    /// listener never maps per-variant: every verification failure there
    /// collapses to a uniform 401 so the response cannot be used as an
    /// oracle for which check failed.
    pub fn mint_status(&self) -> StatusCode {
        match self {
            GrantError::InvalidGrant(_) => StatusCode::BAD_REQUEST,
            GrantError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GrantError::Malformed
            | GrantError::BadSignature
            | GrantError::Expired
            | GrantError::UserMismatch
            | GrantError::ContentMismatch => StatusCode::UNAUTHORIZED,
        }
    }
}
