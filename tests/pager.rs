//! Pagination over a real list endpoint served by a mock server.
//!
//! The list function is supplied by the caller, exactly as resource modules
//! do: it reads the continuation token out of the call configuration and
//! maps the endpoint's collection/token fields into a `PagedResponse`.

use genai_client::pager::{ListFn, Page, PagedResponse, PAGE_TOKEN_KEY};
use genai_client::{Client, Error};
use serde_json::{json, Value};
use std::sync::Arc;

fn files_list_fn(client: Client) -> ListFn<Value> {
    Arc::new(move |config: Value| {
        let client = client.clone();
        Box::pin(async move {
            let page_size = config.get("pageSize").and_then(|v| v.as_u64()).unwrap_or(2);
            let path = match config.get(PAGE_TOKEN_KEY).and_then(|v| v.as_str()) {
                Some(token) => format!("files?pageSize={}&pageToken={}", page_size, token),
                None => format!("files?pageSize={}", page_size),
            };
            let response = client.get(&path, None).await?;
            Ok(PagedResponse {
                items: response
                    .get("files")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default(),
                next_page_token: response
                    .get("nextPageToken")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                sdk_http_response: None,
            })
        })
    })
}

#[tokio::test]
async fn two_pages_then_the_exhausted_sentinel() {
    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("GET", "/v1beta/files?pageSize=2")
        .with_status(200)
        .with_body(r#"{"files":[{"name":"files/a"},{"name":"files/b"}],"nextPageToken":"t1"}"#)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/v1beta/files?pageSize=2&pageToken=t1")
        .with_status(200)
        .with_body(r#"{"files":[{"name":"files/c"}]}"#)
        .create_async()
        .await;

    let client = Client::builder()
        .api_key("test-key")
        .base_url(server.url())
        .build()
        .unwrap();

    let page = Page::new("files", files_list_fn(client), json!({"pageSize": 2}))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.next_page_token, "t1");

    let page = page.next().await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert!(!page.has_next());

    let err = page.next().await.unwrap_err();
    assert!(matches!(err, Error::PageExhausted));

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn all_collects_across_pages() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v1beta/files?pageSize=2")
        .with_status(200)
        .with_body(r#"{"files":[{"name":"files/a"},{"name":"files/b"}],"nextPageToken":"t1"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/v1beta/files?pageSize=2&pageToken=t1")
        .with_status(200)
        .with_body(r#"{"files":[{"name":"files/c"}],"nextPageToken":""}"#)
        .create_async()
        .await;

    let client = Client::builder()
        .api_key("test-key")
        .base_url(server.url())
        .build()
        .unwrap();

    let items = Page::new("files", files_list_fn(client), json!({"pageSize": 2}))
        .await
        .unwrap()
        .all()
        .await
        .unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[2]["name"], "files/c");
}

#[tokio::test]
async fn list_failure_propagates_as_its_own_class() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v1beta/files?pageSize=2")
        .with_status(500)
        .with_body(r#"{"error":{"code":500,"message":"boom","status":"INTERNAL"}}"#)
        .create_async()
        .await;

    let client = Client::builder()
        .api_key("test-key")
        .base_url(server.url())
        .build()
        .unwrap();

    let err = Page::new("files", files_list_fn(client), json!({"pageSize": 2}))
        .await
        .unwrap_err();
    assert_eq!(err.as_api_error().unwrap().code, 500);
}
