//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for [`DocChatClient`](crate::DocChatClient)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the backend API, including the `/api` prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Where to persist the bearer credential. `None` keeps it in memory only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            credentials_path: None,
        }
    }
}

impl ClientConfig {
    /// The URL is taken as-is; trailing slashes are trimmed where the HTTP
    /// client is built, so configs from serde or struct literals behave the
    /// same as this constructor.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials_path: None,
        }
    }

    /// Set the credential persistence path
    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }
}
