//! Stream dispatch behavior: strict `data:` framing over a mock server.

use futures::StreamExt;
use genai_client::{Client, Error};
use reqwest::Method;
use serde_json::json;

fn client_for(server: &mockito::ServerGuard) -> Client {
    Client::builder()
        .api_key("test-key")
        .base_url(server.url())
        .build()
        .expect("client should build")
}

async fn stream_body(body: &str) -> (mockito::ServerGuard, Client) {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1beta/models/m:streamGenerateContent")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;
    let client = client_for(&server);
    (server, client)
}

#[tokio::test]
async fn yields_chunks_in_order() {
    let (_server, client) = stream_body("data:{\"a\":1}\n\ndata:{\"b\":2}\n\n").await;
    let mut stream = client
        .request_stream(
            Method::POST,
            "models/m:streamGenerateContent",
            &json!({"contents": []}),
            None,
        )
        .await
        .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap(), json!({"a":1}));
    assert_eq!(stream.next().await.unwrap().unwrap(), json!({"b":2}));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn crlf_delimiters_are_accepted() {
    let (_server, client) = stream_body("data:{\"a\":1}\r\n\r\ndata:{\"b\":2}\r\n\r\n").await;
    let mut stream = client
        .request_stream(
            Method::POST,
            "models/m:streamGenerateContent",
            &json!({"contents": []}),
            None,
        )
        .await
        .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap(), json!({"a":1}));
    assert_eq!(stream.next().await.unwrap().unwrap(), json!({"b":2}));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn unmarked_segment_is_fatal_after_valid_items() {
    let (_server, client) = stream_body("data:{\"a\":1}\n\nevent: ping\n\n").await;
    let mut stream = client
        .request_stream(
            Method::POST,
            "models/m:streamGenerateContent",
            &json!({"contents": []}),
            None,
        )
        .await
        .unwrap();

    // The valid item stays valid.
    assert_eq!(stream.next().await.unwrap().unwrap(), json!({"a":1}));
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Protocol { .. }));
    // Terminal: nothing after the error.
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn malformed_json_terminates_with_decode_error() {
    let (_server, client) = stream_body("data:{\"a\":1}\n\ndata:{broken\n\n").await;
    let mut stream = client
        .request_stream(
            Method::POST,
            "models/m:streamGenerateContent",
            &json!({"contents": []}),
            None,
        )
        .await
        .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap(), json!({"a":1}));
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Decode { .. }));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn first_segment_error_envelope_yields_no_items() {
    let (_server, client) = stream_body(
        "data:{\"error\":{\"code\":403,\"message\":\"denied\",\"status\":\"PERMISSION_DENIED\"}}\n\n",
    )
    .await;
    let mut stream = client
        .request_stream(
            Method::POST,
            "models/m:streamGenerateContent",
            &json!({"contents": []}),
            None,
        )
        .await
        .unwrap();

    let err = stream.next().await.unwrap().unwrap_err();
    let api = err.as_api_error().expect("application error");
    assert_eq!(api.code, 403);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn error_status_surfaces_before_any_chunk() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1beta/models/m:streamGenerateContent")
        .with_status(429)
        .with_body(r#"{"error":{"code":429,"message":"slow down","status":"RESOURCE_EXHAUSTED"}}"#)
        .create_async()
        .await;

    let err = client_for(&server)
        .request_stream(
            Method::POST,
            "models/m:streamGenerateContent",
            &json!({"contents": []}),
            None,
        )
        .await
        .err()
        .expect("error status should fail the stream call");
    assert_eq!(err.as_api_error().unwrap().code, 429);
}

#[tokio::test]
async fn early_stop_is_clean() {
    let (_server, client) =
        stream_body("data:{\"a\":1}\n\ndata:{\"b\":2}\n\ndata:{\"c\":3}\n\n").await;
    let stream = client
        .request_stream(
            Method::POST,
            "models/m:streamGenerateContent",
            &json!({"contents": []}),
            None,
        )
        .await
        .unwrap();

    // Bounded consumption: take one item and drop the rest.
    let first: Vec<_> = stream.take(1).collect().await;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].as_ref().unwrap(), &json!({"a":1}));
}
