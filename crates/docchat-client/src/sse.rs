//! Event-stream frame decoder.
//!
//! The backend streams UTF-8 text frames separated by a blank line, each
//! prefixed `data: `. A decoder is stateful within one stream (a frame may
//! span chunk boundaries) and must be created fresh per request.

use serde::{Deserialize, Serialize};

/// One decoded unit of the streaming protocol
#[derive(Debug, Clone, PartialEq)]
pub enum EventFrame {
    /// Incremental assistant text, append-only
    Content(String),
    /// Full replacement of the citation list
    Citations(Vec<Citation>),
    /// Failure reported in-band by the backend
    Error(String),
    /// End-of-stream marker; the transport read loop still runs to EOF
    Done,
    /// Payload that failed structured parsing. Skipped by the consumer:
    /// partial JSON is an expected artifact of chunk fragmentation.
    Malformed(String),
}

/// Page reference inside a citation. The backend sends either a number or
/// the literal `"?"` when the page is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageRef {
    Number(i64),
    Label(String),
}

impl Default for PageRef {
    fn default() -> Self {
        PageRef::Label("?".to_string())
    }
}

impl std::fmt::Display for PageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageRef::Number(page) => write!(f, "{page}"),
            PageRef::Label(label) => write!(f, "{label}"),
        }
    }
}

/// Supporting material for assistant content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<i64>,
    pub source: String,
    #[serde(default)]
    pub page: PageRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamPayload {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    citations: Option<Vec<Citation>>,
    #[serde(default)]
    error: Option<String>,
}

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// Incremental decoder for one event stream
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Raw bytes: a chunk boundary may fall inside a multibyte character,
    /// so text decoding waits until a frame is complete.
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw transport chunk, returning every frame completed by it.
    /// A partial frame stays buffered until a later chunk closes it.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<EventFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|window| window == b"\n\n") {
            let event = String::from_utf8_lossy(&self.buffer[..pos]).into_owned();
            self.buffer.drain(..pos + 2);
            Self::parse_event(&event, &mut frames);
        }
        frames
    }

    /// Drain a trailing unterminated frame once the transport reaches EOF.
    /// Handles the last event lacking its `\n\n`, e.g. after an interrupted
    /// connection.
    pub fn finish(&mut self) -> Vec<EventFrame> {
        let bytes = std::mem::take(&mut self.buffer);
        let event = String::from_utf8_lossy(&bytes);
        let mut frames = Vec::new();
        if !event.trim().is_empty() {
            Self::parse_event(&event, &mut frames);
        }
        frames
    }

    fn parse_event(event: &str, frames: &mut Vec<EventFrame>) {
        for line in event.lines() {
            // Lines without the data marker are not an error, just noise.
            let Some(data) = line.strip_prefix(DATA_PREFIX) else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if data == DONE_MARKER {
                frames.push(EventFrame::Done);
                continue;
            }

            match serde_json::from_str::<StreamPayload>(data) {
                Ok(payload) => {
                    if let Some(message) = payload.error {
                        frames.push(EventFrame::Error(message));
                    } else if let Some(items) = payload.citations {
                        frames.push(EventFrame::Citations(items));
                    } else if let Some(text) = payload.content {
                        frames.push(EventFrame::Content(text));
                    }
                }
                Err(_) => frames.push(EventFrame::Malformed(data.to_string())),
            }
        }
    }
}
