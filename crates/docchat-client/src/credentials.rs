//! Bearer credential and its storage.
//!
//! The credential is owned exclusively by a [`CredentialStore`]; consumers
//! read it through the store and never cache a copy beyond one request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

/// Opaque bearer token with an optional expiry hint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// True when the expiry hint has passed. A credential without a hint is
    /// assumed live until the backend rejects it.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= Utc::now(),
            None => false,
        }
    }
}

/// Storage cell for the current credential.
///
/// Mutated only by login, refresh success, and logout/refresh failure.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self) -> Option<Credential>;
    async fn set(&self, credential: Credential) -> Result<()>;
    /// Idempotent.
    async fn clear(&self) -> Result<()>;
}

/// In-memory store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self) -> Option<Credential> {
        self.inner.read().await.clone()
    }

    async fn set(&self, credential: Credential) -> Result<()> {
        *self.inner.write().await = Some(credential);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.inner.write().await = None;
        Ok(())
    }
}

/// File-backed store. A new process constructing the store from the same
/// path sees the last stored token, which is what lets a login survive a
/// client restart.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    cache: RwLock<Option<Credential>>,
}

impl FileCredentialStore {
    /// Open the store, loading any previously persisted credential.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cache = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(credential) => Some(credential),
                Err(error) => {
                    debug!(%error, path = %path.display(), "Discarding unreadable credential file");
                    None
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
            Err(error) => return Err(error.into()),
        };

        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(credential)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self) -> Option<Credential> {
        self.cache.read().await.clone()
    }

    async fn set(&self, credential: Credential) -> Result<()> {
        self.persist(&credential).await?;
        *self.cache.write().await = Some(credential);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }
        *self.cache.write().await = None;
        Ok(())
    }
}
