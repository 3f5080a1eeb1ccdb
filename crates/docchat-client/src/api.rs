//! Wire types for the backend's JSON API

use serde::{Deserialize, Serialize};

/// Body of `/login` and `/refresh` success responses
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Profile returned by `GET /me`
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// One uploaded document, as listed by `GET /documents`.
///
/// Deserialization is tolerant: only `id` and `filename` are required,
/// everything else the backend chooses to include is optional or dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentInfo {
    pub id: i64,
    pub filename: String,
    #[serde(default)]
    pub upload_date: Option<String>,
    #[serde(default)]
    pub file_hash: Option<String>,
}

/// Body of `POST /chat`
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<i64>,
}
