//! Authenticated HTTP client with a single-flight token refresh cycle.
//!
//! Every authenticated call goes through [`AuthHttpClient::execute`], which
//! attaches the stored bearer token and recovers from a 401 with exactly one
//! refresh-and-retry. Concurrent 401s share one refresh call through the
//! generation-counted gate.

use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::TokenResponse;
use crate::credentials::{Credential, CredentialStore};
use crate::error::{ClientError, Result};

/// Request description captured before send so it can be replayed verbatim
/// after a refresh. Immutable once built.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    method: Method,
    path: String,
    body: RequestBody,
}

#[derive(Debug, Clone)]
enum RequestBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
    /// Multipart file upload, kept as raw bytes so the form can be rebuilt
    /// for the post-refresh resend.
    Upload {
        file_name: String,
        bytes: Vec<u8>,
    },
}

impl PendingRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn post_json(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: RequestBody::Json(body),
        }
    }

    pub fn post_form(path: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: RequestBody::Form(fields),
        }
    }

    pub fn upload(path: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: RequestBody::Upload {
                file_name: file_name.into(),
                bytes,
            },
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// HTTP client that owns the credential lifecycle: attach, refresh, clear.
pub struct AuthHttpClient {
    http: Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
    /// Refresh gate. Holding the lock means a refresh is in flight; the
    /// counter advances once per settled refresh (success or failure).
    gate: Mutex<u64>,
}

impl AuthHttpClient {
    pub fn new(base_url: impl Into<String>, store: Arc<dyn CredentialStore>) -> Self {
        let mut base_url = base_url.into();
        // Paths are joined with a leading slash; a trailing one here would
        // produce `//login`-style URLs.
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: build_http_client(),
            base_url,
            store,
            gate: Mutex::new(0),
        }
    }

    pub fn store(&self) -> Arc<dyn CredentialStore> {
        self.store.clone()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send an authenticated request, transparently recovering from token
    /// expiry. A 401 after a successful refresh is terminal: the credential
    /// is cleared and [`ClientError::Auth`] is returned.
    pub async fn execute(&self, request: &PendingRequest) -> Result<Response> {
        // Snapshot the gate before reading the credential, so a refresh that
        // settles in between is detected instead of repeated. The snapshot is
        // taken once: a proactive refresh below advances the generation and
        // a later 401 then reuses its outcome instead of refreshing twice.
        let observed = self.generation().await;
        let mut credential = self.store.get().await;

        if let Some(current) = &credential {
            if current.is_expired() {
                debug!(path = %request.path, "Credential expiry hint passed, refreshing before send");
                credential = Some(self.refresh_through_gate(observed).await?);
            }
        }

        let response = self.send(request, credential.as_ref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(path = %request.path, "Request unauthorized, entering refresh gate");
        let refreshed = self.refresh_through_gate(observed).await?;

        let response = self.send(request, Some(&refreshed)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            // No second retry loop: a rejection of a freshly minted token
            // cannot be fixed by refreshing again.
            self.store.clear().await?;
            return Err(ClientError::Auth(
                "request rejected again after token refresh".to_string(),
            ));
        }
        Ok(response)
    }

    /// Exchange credentials for a bearer token and store it. A 401 here is
    /// bad credentials, never a refresh trigger.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let request = PendingRequest::post_form(
            "/login",
            vec![
                ("username".to_string(), email.to_string()),
                ("password".to_string(), password.to_string()),
            ],
        );
        let response = self.send(&request, None).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Auth("invalid email or password".to_string()));
        }
        let response = check_success(response).await?;
        let token: TokenResponse = response.json().await?;
        self.store.set(Credential::new(token.access_token)).await?;
        debug!("Login succeeded, credential stored");
        Ok(())
    }

    /// Register an account, then log in with the new credentials.
    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Result<()> {
        let body = serde_json::to_value(crate::api::SignupRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let response = self.send(&PendingRequest::post_json("/signup", body), None).await?;
        check_success(response).await?;
        self.login(email, password).await
    }

    /// Best-effort server-side logout. The stored credential is cleared even
    /// when the backend call fails.
    pub async fn logout(&self) -> Result<()> {
        let request = PendingRequest::post("/logout");
        let credential = self.store.get().await;
        match self.send(&request, credential.as_ref()).await {
            Ok(response) if !response.status().is_success() => {
                warn!(status = response.status().as_u16(), "Logout rejected by backend");
            }
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "Logout request failed, clearing credential anyway");
            }
        }
        self.store.clear().await
    }

    async fn generation(&self) -> u64 {
        *self.gate.lock().await
    }

    /// Single-flight refresh. The first caller past the gate performs the
    /// `/refresh` call; everyone who observed the same generation awaits the
    /// held lock and reuses the outcome instead of refreshing again.
    async fn refresh_through_gate(&self, observed: u64) -> Result<Credential> {
        let mut generation = self.gate.lock().await;

        if *generation != observed {
            // Another task already settled this expiry while we waited.
            return self
                .store
                .get()
                .await
                .ok_or_else(|| ClientError::Auth("token refresh failed".to_string()));
        }

        *generation += 1;
        match self.call_refresh().await {
            Ok(credential) => {
                self.store.set(credential.clone()).await?;
                debug!("Token refresh succeeded");
                Ok(credential)
            }
            Err(error) => {
                warn!(%error, "Token refresh failed, clearing credential");
                self.store.clear().await?;
                Err(ClientError::Auth(format!("token refresh failed: {error}")))
            }
        }
    }

    /// Call the refresh endpoint. The refresh credential is an HTTP-only
    /// cookie set at login and replayed by the client's cookie store.
    async fn call_refresh(&self) -> Result<Credential> {
        let response = self.send(&PendingRequest::post("/refresh"), None).await?;
        let response = check_success(response).await?;
        let token: TokenResponse = response.json().await?;
        Ok(Credential::new(token.access_token))
    }

    async fn send(
        &self,
        request: &PendingRequest,
        credential: Option<&Credential>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.http.request(request.method.clone(), url);

        if let Some(credential) = credential {
            builder = builder.bearer_auth(&credential.access_token);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Upload { file_name, bytes } => {
                let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                builder.multipart(Form::new().part("file", part))
            }
        };

        Ok(builder.send().await?)
    }
}

fn build_http_client() -> Client {
    // Cookie store carries the HTTP-only refresh cookie across calls.
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to build reqwest client")
}

/// Map a non-2xx response to [`ClientError::Api`] with a truncated body.
pub(crate) async fn check_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    // Truncate error bodies to keep logs and error chains bounded.
    const MAX_ERROR_BODY: usize = 512;
    let message = if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated]", &body[..end])
    } else {
        body
    };

    Err(ClientError::Api { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;

    #[test]
    fn base_url_trailing_slashes_are_trimmed() {
        let store = Arc::new(MemoryCredentialStore::new());
        let client = AuthHttpClient::new("http://localhost:8000/api//", store);
        assert_eq!(client.base_url(), "http://localhost:8000/api");
    }

    #[test]
    fn pending_request_captures_shape() {
        let request = PendingRequest::post_json("/chat", serde_json::json!({"message": "hi"}));
        assert_eq!(request.path(), "/chat");
        assert_eq!(request.method, Method::POST);

        let request = PendingRequest::get("/me");
        assert_eq!(request.method, Method::GET);
        assert!(matches!(request.body, RequestBody::Empty));
    }
}
