//! Streaming chat session.
//!
//! One turn: send the request through [`AuthHttpClient`], pump the response
//! body through [`SseDecoder`], apply each frame to the accumulating
//! assistant message, publish updates on a channel. The caller cancels
//! cooperatively through the handle; cancellation is observed at the next
//! suspension point.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::ChatRequest;
use crate::error::{ClientError, Result};
use crate::http::{AuthHttpClient, PendingRequest, check_success};
use crate::sse::{Citation, EventFrame, SseDecoder};

/// Shown instead of an empty message when a turn fails before any content
/// arrived.
pub const FALLBACK_NOTICE: &str =
    "Something went wrong while generating a response. Please try again.";

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One message in the transcript. `content` is append-only while
/// `streaming` is true; `citations` is replaced wholesale, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub citations: Vec<Citation>,
    pub streaming: bool,
}

impl ChatMessage {
    /// A finished user message, ready to append to the transcript.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: content.into(),
            citations: Vec::new(),
            streaming: false,
        }
    }

    /// The assistant message a turn accumulates into.
    fn assistant_pending() -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: String::new(),
            citations: Vec::new(),
            streaming: true,
        }
    }

    fn append_content(&mut self, text: &str) {
        self.content.push_str(text);
    }

    fn replace_citations(&mut self, citations: Vec<Citation>) {
        self.citations = citations;
    }
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed,
    Cancelled,
    Failed(TurnError),
}

/// Failure summary attached to a failed turn. `auth` means the caller must
/// transition to a logged-out state.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnError {
    pub message: String,
    pub auth: bool,
}

impl TurnError {
    fn from_client_error(error: &ClientError) -> Self {
        Self {
            message: error.to_string(),
            auth: error.is_auth(),
        }
    }
}

/// Updates published while a turn streams. The UI layer is just one
/// subscriber; the session never renders anything itself.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A new assistant message was allocated (streaming, empty).
    MessageStarted(ChatMessage),
    ContentDelta { message_id: Uuid, text: String },
    CitationsReplaced {
        message_id: Uuid,
        citations: Vec<Citation>,
    },
    /// Terminal: the message is finalized, `streaming` is false.
    MessageCompleted {
        message: ChatMessage,
        outcome: TurnOutcome,
    },
}

/// Finalized message plus how the turn ended, as returned by
/// [`SessionHandle::join`].
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub message: ChatMessage,
    pub outcome: TurnOutcome,
}

/// One in-flight chat turn: cancellation capability, target message id, and
/// the running task.
#[derive(Debug)]
pub struct SessionHandle {
    message_id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<TurnResult>,
}

impl SessionHandle {
    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    /// Request cooperative cancellation. Observed at the next suspension
    /// point; frames still in flight on the transport are discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Clone of the cancellation token, for wiring into signal handlers.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the turn to finalize.
    pub async fn join(self) -> Result<TurnResult> {
        self.task
            .await
            .map_err(|error| ClientError::Session(error.to_string()))
    }
}

/// Chat session bound to one conversation. At most one turn may stream at a
/// time; starting a second while one is active is a caller error.
pub struct ChatSession {
    http: Arc<AuthHttpClient>,
    events: mpsc::Sender<ChatEvent>,
    turn_active: Arc<AtomicBool>,
}

impl ChatSession {
    /// Create a session and the receiving end of its event channel.
    pub fn new(http: Arc<AuthHttpClient>) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (
            Self {
                http,
                events: tx,
                turn_active: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Start a turn. Returns the handle owning cancellation for it.
    pub fn send_message(
        &self,
        text: impl Into<String>,
        document_id: Option<i64>,
    ) -> Result<SessionHandle> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ClientError::InvalidRequest(
                "message must not be empty".to_string(),
            ));
        }
        if self
            .turn_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ClientError::TurnInProgress);
        }

        let cancel = CancellationToken::new();
        let message = ChatMessage::assistant_pending();
        let message_id = message.id;

        let turn = Turn {
            http: self.http.clone(),
            events: self.events.clone(),
            cancel: cancel.clone(),
            message,
            turn_active: self.turn_active.clone(),
        };
        let request = ChatRequest {
            message: text,
            document_id,
        };
        let task = tokio::spawn(turn.run(request));

        Ok(SessionHandle {
            message_id,
            cancel,
            task,
        })
    }
}

struct Turn {
    http: Arc<AuthHttpClient>,
    events: mpsc::Sender<ChatEvent>,
    cancel: CancellationToken,
    message: ChatMessage,
    turn_active: Arc<AtomicBool>,
}

impl Turn {
    async fn run(mut self, request: ChatRequest) -> TurnResult {
        let _ = self
            .events
            .send(ChatEvent::MessageStarted(self.message.clone()))
            .await;

        let outcome = match self.pump(&request).await {
            Ok(()) => TurnOutcome::Completed,
            Err(ClientError::Cancelled) => {
                // Not a failure: keep whatever content accumulated.
                debug!(message_id = %self.message.id, "Turn cancelled by caller");
                TurnOutcome::Cancelled
            }
            Err(error) => {
                warn!(%error, message_id = %self.message.id, "Chat turn failed");
                if self.message.content.is_empty() {
                    self.message.content = FALLBACK_NOTICE.to_string();
                }
                TurnOutcome::Failed(TurnError::from_client_error(&error))
            }
        };

        self.message.streaming = false;
        self.turn_active.store(false, Ordering::SeqCst);
        let _ = self
            .events
            .send(ChatEvent::MessageCompleted {
                message: self.message.clone(),
                outcome: outcome.clone(),
            })
            .await;

        TurnResult {
            message: self.message,
            outcome,
        }
    }

    async fn pump(&mut self, request: &ChatRequest) -> Result<()> {
        let pending = PendingRequest::post_json("/chat", serde_json::to_value(request)?);

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
            result = self.http.execute(&pending) => result?,
        };
        let response = check_success(response).await?;

        let mut decoder = SseDecoder::new();
        let mut stream = response.bytes_stream();
        let mut frames_seen = 0usize;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        for frame in decoder.decode(&bytes) {
                            frames_seen += 1;
                            self.apply(frame).await?;
                        }
                    }
                    Some(Err(error)) => return Err(ClientError::Network(error)),
                    None => {
                        for frame in decoder.finish() {
                            frames_seen += 1;
                            self.apply(frame).await?;
                        }
                        if frames_seen == 0 {
                            return Err(ClientError::Stream(
                                "stream ended before any frame arrived".to_string(),
                            ));
                        }
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn apply(&mut self, frame: EventFrame) -> Result<()> {
        match frame {
            EventFrame::Content(text) => {
                self.message.append_content(&text);
                let _ = self
                    .events
                    .send(ChatEvent::ContentDelta {
                        message_id: self.message.id,
                        text,
                    })
                    .await;
            }
            EventFrame::Citations(citations) => {
                self.message.replace_citations(citations.clone());
                let _ = self
                    .events
                    .send(ChatEvent::CitationsReplaced {
                        message_id: self.message.id,
                        citations,
                    })
                    .await;
            }
            EventFrame::Done => {
                // End-of-interpretation marker; the read loop runs to EOF.
            }
            EventFrame::Malformed(raw) => {
                // Expected artifact of chunk fragmentation, never surfaced.
                debug!(bytes = raw.len(), "Skipping malformed stream frame");
            }
            EventFrame::Error(message) => return Err(ClientError::Stream(message)),
        }
        Ok(())
    }
}
