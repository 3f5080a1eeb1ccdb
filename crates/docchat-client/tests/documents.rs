//! Document API integration tests.

use std::sync::Arc;

use docchat_client::{ClientConfig, Credential, CredentialStore, DocChatClient, MemoryCredentialStore};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> DocChatClient {
    let store = Arc::new(MemoryCredentialStore::new());
    store.set(Credential::new("t1")).await.unwrap();
    DocChatClient::new(ClientConfig::new(format!("{}/api", server.uri())), store)
}

#[tokio::test]
async fn lists_documents_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents"))
        .and(header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": 1, "filename": "report.pdf", "upload_date": "2026-08-01T10:00:00"},
            {"id": 2, "filename": "notes.md"}
        ])))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let documents = client.list_documents().await.unwrap();
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].filename, "report.pdf");
    assert!(documents[1].upload_date.is_none());
}

#[tokio::test]
async fn deletes_document_by_id() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/documents/7"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client.delete_document(7).await.unwrap();
}

#[tokio::test]
async fn uploads_file_as_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": "uploaded"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.md");
    tokio::fs::write(&file, "# notes\nhello").await.unwrap();

    let client = client_for(&server).await;
    client.upload_document(&file).await.unwrap();
}

#[tokio::test]
async fn api_error_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents/9"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({"detail": "Document not found"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = client.get_document(9).await.unwrap_err();
    match error {
        docchat_client::ClientError::Api { status, message } => {
            assert_eq!(status, 404);
            assert!(message.contains("Document not found"));
        }
        other => panic!("expected api error, got {other:?}"),
    }
}
