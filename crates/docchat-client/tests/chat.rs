//! Streaming chat turn integration tests.
//!
//! Most tests run against wiremock; the mid-stream cancellation test uses a
//! raw TCP server so frames can be flushed and paused chunk by chunk.

use std::sync::Arc;
use std::time::Duration;

use docchat_client::{
    ChatEvent, ClientConfig, Credential, CredentialStore, DocChatClient, FALLBACK_NOTICE,
    MemoryCredentialStore, TurnOutcome,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse_body(frames: &[&str]) -> String {
    frames
        .iter()
        .map(|frame| format!("data: {frame}\n\n"))
        .collect()
}

async fn client_for(base_url: String) -> DocChatClient {
    let store = Arc::new(MemoryCredentialStore::new());
    store.set(Credential::new("t1")).await.unwrap();
    DocChatClient::new(ClientConfig::new(base_url), store)
}

async fn mock_chat(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(server)
        .await;
}

async fn drain_events(mut rx: mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let done = matches!(event, ChatEvent::MessageCompleted { .. });
        events.push(event);
        if done {
            break;
        }
    }
    events
}

#[tokio::test]
async fn streamed_turn_accumulates_content_and_citations() {
    let server = MockServer::start().await;
    mock_chat(
        &server,
        sse_body(&[
            r#"{"content":"Hel"}"#,
            r#"{"content":"lo"}"#,
            r#"{"citations":[{"source":"report.pdf","page":3}]}"#,
            "[DONE]",
        ]),
    )
    .await;

    let client = client_for(format!("{}/api", server.uri())).await;
    let (session, rx) = client.chat_session();
    let handle = session.send_message("what is this about?", None).unwrap();

    let result = handle.join().await.unwrap();
    assert_eq!(result.outcome, TurnOutcome::Completed);
    assert_eq!(result.message.content, "Hello");
    assert_eq!(result.message.citations.len(), 1);
    assert_eq!(result.message.citations[0].source, "report.pdf");
    assert!(!result.message.streaming);

    let events = drain_events(rx).await;
    assert!(matches!(events.first(), Some(ChatEvent::MessageStarted(_))));
    let deltas: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            ChatEvent::ContentDelta { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, vec!["Hel", "lo"]);
    assert!(matches!(
        events.last(),
        Some(ChatEvent::MessageCompleted {
            outcome: TurnOutcome::Completed,
            ..
        })
    ));
}

#[tokio::test]
async fn malformed_frame_between_valid_frames_is_skipped() {
    let server = MockServer::start().await;
    mock_chat(
        &server,
        sse_body(&[r#"{"content":"Hel"}"#, "{not json", r#"{"content":"lo"}"#, "[DONE]"]),
    )
    .await;

    let client = client_for(format!("{}/api", server.uri())).await;
    let (session, _rx) = client.chat_session();
    let result = session
        .send_message("hi", None)
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(result.outcome, TurnOutcome::Completed);
    assert_eq!(result.message.content, "Hello");
}

#[tokio::test]
async fn done_marker_is_not_appended_to_content() {
    let server = MockServer::start().await;
    mock_chat(&server, sse_body(&[r#"{"content":"Hi"}"#, "[DONE]"])).await;

    let client = client_for(format!("{}/api", server.uri())).await;
    let (session, _rx) = client.chat_session();
    let result = session
        .send_message("hi", None)
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(result.message.content, "Hi");
    assert_eq!(result.outcome, TurnOutcome::Completed);
}

#[tokio::test]
async fn citations_frame_replaces_previous_list() {
    let server = MockServer::start().await;
    mock_chat(
        &server,
        sse_body(&[
            r#"{"citations":[{"source":"a.pdf","page":1},{"source":"b.pdf","page":2}]}"#,
            r#"{"content":"see sources"}"#,
            r#"{"citations":[{"source":"c.pdf","page":9}]}"#,
            "[DONE]",
        ]),
    )
    .await;

    let client = client_for(format!("{}/api", server.uri())).await;
    let (session, _rx) = client.chat_session();
    let result = session
        .send_message("hi", None)
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(result.message.citations.len(), 1);
    assert_eq!(result.message.citations[0].source, "c.pdf");
}

#[tokio::test]
async fn error_frame_fails_turn_with_fallback_content() {
    let server = MockServer::start().await;
    mock_chat(&server, sse_body(&[r#"{"error":"model unavailable"}"#, "[DONE]"])).await;

    let client = client_for(format!("{}/api", server.uri())).await;
    let (session, _rx) = client.chat_session();
    let result = session
        .send_message("hi", None)
        .unwrap()
        .join()
        .await
        .unwrap();

    match &result.outcome {
        TurnOutcome::Failed(error) => {
            assert!(error.message.contains("model unavailable"));
            assert!(!error.auth);
        }
        other => panic!("expected failed outcome, got {other:?}"),
    }
    assert_eq!(result.message.content, FALLBACK_NOTICE);
    assert!(!result.message.streaming);
}

#[tokio::test]
async fn failure_preserves_partial_content() {
    let server = MockServer::start().await;
    mock_chat(
        &server,
        sse_body(&[r#"{"content":"Partial answer"}"#, r#"{"error":"backend died"}"#]),
    )
    .await;

    let client = client_for(format!("{}/api", server.uri())).await;
    let (session, _rx) = client.chat_session();
    let result = session
        .send_message("hi", None)
        .unwrap()
        .join()
        .await
        .unwrap();

    assert!(matches!(result.outcome, TurnOutcome::Failed(_)));
    assert_eq!(result.message.content, "Partial answer");
}

#[tokio::test]
async fn stream_with_no_frames_fails_with_fallback() {
    let server = MockServer::start().await;
    mock_chat(&server, String::new()).await;

    let client = client_for(format!("{}/api", server.uri())).await;
    let (session, _rx) = client.chat_session();
    let result = session
        .send_message("hi", None)
        .unwrap()
        .join()
        .await
        .unwrap();

    assert!(matches!(result.outcome, TurnOutcome::Failed(_)));
    assert_eq!(result.message.content, FALLBACK_NOTICE);
}

#[tokio::test]
async fn auth_failure_is_flagged_on_the_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(format!("{}/api", server.uri())).await;
    let (session, _rx) = client.chat_session();
    let result = session
        .send_message("hi", None)
        .unwrap()
        .join()
        .await
        .unwrap();

    match &result.outcome {
        TurnOutcome::Failed(error) => assert!(error.auth),
        other => panic!("expected failed outcome, got {other:?}"),
    }
    assert_eq!(result.message.content, FALLBACK_NOTICE);
}

#[tokio::test]
async fn second_turn_while_streaming_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&["[DONE]"]), "text/event-stream")
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let client = client_for(format!("{}/api", server.uri())).await;
    let (session, _rx) = client.chat_session();

    let first = session.send_message("first", None).unwrap();
    let rejected = session.send_message("second", None);
    assert!(matches!(
        rejected.unwrap_err(),
        docchat_client::ClientError::TurnInProgress
    ));

    first.join().await.unwrap();
    // The slot frees up once the turn finalizes.
    session.send_message("third", None).unwrap().join().await.unwrap();
}

#[tokio::test]
async fn cancel_while_sending_finalizes_without_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&[r#"{"content":"late"}"#, "[DONE]"]), "text/event-stream")
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let client = client_for(format!("{}/api", server.uri())).await;
    let (session, _rx) = client.chat_session();
    let handle = session.send_message("hi", None).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();

    let result = handle.join().await.unwrap();
    assert_eq!(result.outcome, TurnOutcome::Cancelled);
    // Cancellation never substitutes an error notice.
    assert!(result.message.content.is_empty());
    assert!(!result.message.streaming);
}

/// Minimal chunked SSE server: sends `first` frames, stalls, then `rest`.
/// Lets the test cancel between flushed frames, which wiremock cannot do.
async fn spawn_streaming_server(first: Vec<String>, rest: Vec<String>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        // Drain the request head; the exact body does not matter here.
        let mut seen = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            seen.extend_from_slice(&buf[..n]);
            if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }

        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n",
            )
            .await
            .unwrap();

        for frame in first {
            let event = format!("data: {frame}\n\n");
            let chunk = format!("{:x}\r\n{event}\r\n", event.len());
            socket.write_all(chunk.as_bytes()).await.unwrap();
        }

        // Hold the connection open; the client cancels during this stall.
        tokio::time::sleep(Duration::from_secs(10)).await;

        for frame in rest {
            let event = format!("data: {frame}\n\n");
            let chunk = format!("{:x}\r\n{event}\r\n", event.len());
            if socket.write_all(chunk.as_bytes()).await.is_err() {
                return;
            }
        }
        let _ = socket.write_all(b"0\r\n\r\n").await;
    });

    format!("http://{addr}/api")
}

#[tokio::test]
async fn cancel_mid_stream_keeps_exactly_the_delivered_frames() {
    let base_url = spawn_streaming_server(
        vec![r#"{"content":"Hel"}"#.to_string(), r#"{"content":"lo"}"#.to_string()],
        vec![r#"{"content":" MORE"}"#.to_string(), "[DONE]".to_string()],
    )
    .await;

    let client = client_for(base_url).await;
    let (session, mut rx) = client.chat_session();
    let handle = session.send_message("hi", None).unwrap();

    // Wait until both flushed deltas arrived, then cancel during the stall.
    let mut deltas = 0;
    while deltas < 2 {
        match rx.recv().await.expect("event channel closed early") {
            ChatEvent::ContentDelta { .. } => deltas += 1,
            ChatEvent::MessageCompleted { .. } => panic!("turn completed before cancel"),
            _ => {}
        }
    }
    handle.cancel();

    let result = handle.join().await.unwrap();
    assert_eq!(result.outcome, TurnOutcome::Cancelled);
    assert_eq!(result.message.content, "Hello");
    assert!(!result.message.streaming);
}
