use serde::{Deserialize, Serialize};

/// Request body for minting a media grant (binding token + signed URL)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGrantRequest {
    /// Authenticated user the grant is bound to (required)
    pub user_id: String,

    /// Content the grant covers (required)
    pub content_id: String,

    /// Storage object backing the content (required)
    pub storage_key: String,

    /// Requested credential lifetime in seconds (optional, clamped)
    #[serde(default)]
    pub expires_in_secs: Option<u64>,
}

/// Response body for a minted media grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGrantResponse {
    pub binding_token: String,
    pub media_url: String,
    pub expires_at: u64,
}

/// Request body for minting a streaming-provider token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStreamGrantRequest {
    /// Authenticated user requesting the stream (required)
    pub user_id: String,

    /// Content to stream (required)
    pub content_id: String,

    /// Requested token lifetime in seconds (optional, clamped)
    #[serde(default)]
    pub expires_in_secs: Option<u64>,
}

/// Response body for a minted streaming token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStreamGrantResponse {
    pub token: String,
    pub content_id: String,
    pub expires_at: u64,
}
