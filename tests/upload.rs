//! Resumable upload protocol against a mock server.

use genai_client::{Client, Error, UploadConfig, MAX_CHUNK_SIZE};

fn client_for(server: &mockito::ServerGuard) -> Client {
    Client::builder()
        .api_key("test-key")
        .base_url(server.url())
        .build()
        .expect("client should build")
}

fn start_mock(server: &mut mockito::ServerGuard) -> mockito::Mock {
    let upload_url = format!("{}/upload-session", server.url());
    server
        .mock("POST", "/upload/v1beta/files")
        .match_header("x-goog-upload-protocol", "resumable")
        .match_header("x-goog-upload-command", "start")
        .with_status(200)
        .with_header("x-goog-upload-url", &upload_url)
        .with_body("{}")
}

#[tokio::test]
async fn two_full_chunks_with_tracked_offsets() {
    let total = 2 * MAX_CHUNK_SIZE;
    let mut server = mockito::Server::new_async().await;

    let start = start_mock(&mut server)
        .match_header("x-goog-upload-header-content-length", total.to_string().as_str())
        .create_async()
        .await;
    let first_chunk = server
        .mock("POST", "/upload-session")
        .match_header("x-goog-upload-command", "active")
        .match_header("x-goog-upload-offset", "0")
        .with_status(200)
        .with_header("x-goog-upload-status", "active")
        .create_async()
        .await;
    let final_chunk = server
        .mock("POST", "/upload-session")
        .match_header("x-goog-upload-command", "active,finalize")
        .match_header("x-goog-upload-offset", MAX_CHUNK_SIZE.to_string().as_str())
        .with_status(200)
        .with_header("x-goog-upload-status", "final")
        .with_body(format!(
            r#"{{"file":{{"name":"files/generated-id","sizeBytes":"{}","state":"ACTIVE"}}}}"#,
            total
        ))
        .create_async()
        .await;

    let client = client_for(&server);
    let mut config = UploadConfig::new("application/octet-stream");
    config.size_bytes = Some(total as i64);

    let source = vec![0xabu8; total];
    let file = client
        .upload(source.as_slice(), config, None)
        .await
        .unwrap();

    assert_eq!(file.name, "files/generated-id");
    assert_eq!(file.size_bytes, Some(total as i64));
    start.assert_async().await;
    first_chunk.assert_async().await;
    final_chunk.assert_async().await;
}

#[tokio::test]
async fn zero_length_source_finalizes_in_one_chunk() {
    let mut server = mockito::Server::new_async().await;
    let start = start_mock(&mut server).create_async().await;
    let only_chunk = server
        .mock("POST", "/upload-session")
        .match_header("x-goog-upload-command", "active,finalize")
        .match_header("x-goog-upload-offset", "0")
        .with_status(200)
        .with_header("x-goog-upload-status", "final")
        .with_body(r#"{"file":{"name":"files/empty","sizeBytes":"0"}}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let file = client
        .upload(
            std::io::Cursor::new(Vec::new()),
            UploadConfig::new("text/plain"),
            None,
        )
        .await
        .unwrap();

    assert_eq!(file.size_bytes, Some(0));
    start.assert_async().await;
    only_chunk.assert_async().await;
}

#[tokio::test]
async fn missing_upload_url_is_fatal() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/upload/v1beta/files")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .upload(&b"abc"[..], UploadConfig::new("text/plain"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Protocol { .. }));
    assert!(err.to_string().contains("upload URL not returned"));
}

#[tokio::test]
async fn wrong_status_echo_on_finalize_is_fatal() {
    let mut server = mockito::Server::new_async().await;
    start_mock(&mut server).create_async().await;
    server
        .mock("POST", "/upload-session")
        .with_status(200)
        .with_header("x-goog-upload-status", "active")
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .upload(&b"abc"[..], UploadConfig::new("text/plain"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Protocol { .. }));
    assert!(err.to_string().contains("expected \"final\""));
}

#[tokio::test]
async fn server_error_envelope_during_chunk_propagates() {
    let mut server = mockito::Server::new_async().await;
    start_mock(&mut server).create_async().await;
    server
        .mock("POST", "/upload-session")
        .with_status(403)
        .with_body(r#"{"error":{"code":403,"message":"forbidden","status":"PERMISSION_DENIED"}}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .upload(&b"abc"[..], UploadConfig::new("text/plain"), None)
        .await
        .unwrap_err();
    assert_eq!(err.as_api_error().unwrap().code, 403);
}
