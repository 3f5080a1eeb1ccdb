//! High-level client facade over the authenticated HTTP layer.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::api::{DocumentInfo, UserProfile};
use crate::chat::{ChatEvent, ChatSession};
use crate::config::ClientConfig;
use crate::credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
use crate::error::{ClientError, Result};
use crate::http::{AuthHttpClient, PendingRequest, check_success};

/// Mirrors the backend's upload limit so oversized files fail fast.
const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Client for the document Q&A backend: auth lifecycle, document CRUD, and
/// streaming chat sessions, all over one [`AuthHttpClient`].
pub struct DocChatClient {
    http: Arc<AuthHttpClient>,
}

impl DocChatClient {
    /// Build a client with an injected credential store.
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            http: Arc::new(AuthHttpClient::new(config.base_url, store)),
        }
    }

    /// Build a client from config alone: file-backed credentials when a path
    /// is configured, in-memory otherwise.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let store: Arc<dyn CredentialStore> = match &config.credentials_path {
            Some(path) => Arc::new(FileCredentialStore::load(path).await?),
            None => Arc::new(MemoryCredentialStore::new()),
        };
        Ok(Self::new(config, store))
    }

    pub fn credential_store(&self) -> Arc<dyn CredentialStore> {
        self.http.store()
    }

    /// True when a credential is currently stored. Says nothing about
    /// whether the backend still accepts it.
    pub async fn is_logged_in(&self) -> bool {
        self.http.store().get().await.is_some()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        self.http.login(email, password).await
    }

    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Result<()> {
        self.http.signup(name, email, password).await
    }

    pub async fn logout(&self) -> Result<()> {
        self.http.logout().await
    }

    pub async fn me(&self) -> Result<UserProfile> {
        let response = self.http.execute(&PendingRequest::get("/me")).await?;
        Ok(check_success(response).await?.json().await?)
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        let response = self.http.execute(&PendingRequest::get("/documents")).await?;
        Ok(check_success(response).await?.json().await?)
    }

    pub async fn get_document(&self, id: i64) -> Result<DocumentInfo> {
        let response = self
            .http
            .execute(&PendingRequest::get(format!("/documents/{id}")))
            .await?;
        Ok(check_success(response).await?.json().await?)
    }

    pub async fn delete_document(&self, id: i64) -> Result<()> {
        let response = self
            .http
            .execute(&PendingRequest::delete(format!("/documents/{id}")))
            .await?;
        check_success(response).await?;
        Ok(())
    }

    /// Upload a document for indexing.
    pub async fn upload_document(&self, path: &Path) -> Result<()> {
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() > MAX_UPLOAD_BYTES {
            return Err(ClientError::InvalidRequest(
                "file too large, max 50MB".to_string(),
            ));
        }
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ClientError::InvalidRequest("invalid file name".to_string()))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;

        info!(file = %file_name, bytes = bytes.len(), "Uploading document");
        let response = self
            .http
            .execute(&PendingRequest::upload("/upload", file_name, bytes))
            .await?;
        check_success(response).await?;
        Ok(())
    }

    /// Open a chat session and the receiving end of its update channel.
    pub fn chat_session(&self) -> (ChatSession, mpsc::Receiver<ChatEvent>) {
        ChatSession::new(self.http.clone())
    }
}
