//! docchat-client - async client for the document Q&A chat backend
//!
//! This crate provides:
//! - Bearer credential storage that survives a client restart
//! - Authenticated HTTP client with a single-flight refresh-and-retry cycle
//! - Event-stream decoder for the backend's `data: `-framed chat protocol
//! - Streaming chat session with cooperative cancellation and a
//!   channel-based update subscription

pub mod api;
pub mod chat;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod sse;

mod client;

// Re-export commonly used types
pub use api::{ChatRequest, DocumentInfo, TokenResponse, UserProfile};
pub use chat::{
    ChatEvent, ChatMessage, ChatSession, FALLBACK_NOTICE, Role, SessionHandle, TurnError,
    TurnOutcome, TurnResult,
};
pub use client::DocChatClient;
pub use config::ClientConfig;
pub use credentials::{Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{ClientError, Result};
pub use http::{AuthHttpClient, PendingRequest};
pub use sse::{Citation, EventFrame, PageRef, SseDecoder};
