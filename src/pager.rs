//! Cursor-based pagination over list endpoints.
//!
//! Resource modules supply a list function closure `(config) -> (items,
//! next token, response metadata)`; this module never hard-codes a resource
//! type. Iteration ends with the dedicated [`Error::PageExhausted`] condition
//! so callers can stop cleanly without treating exhaustion as failure.

use crate::error::Error;
use crate::Result;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Reserved configuration key the continuation token is inserted under.
pub const PAGE_TOKEN_KEY: &str = "pageToken";

/// One list call's outputs.
#[derive(Debug, Clone, Default)]
pub struct PagedResponse<T> {
    pub items: Vec<T>,
    /// Opaque continuation token; empty means terminal.
    pub next_page_token: String,
    /// Raw transport metadata (headers snapshot) from the list call.
    pub sdk_http_response: Option<Value>,
}

/// Injected list operation. Takes the call configuration (page size, filters,
/// and — on continuation — the token under [`PAGE_TOKEN_KEY`]).
pub type ListFn<T> =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<PagedResponse<T>>> + Send + Sync>;

/// One immutable page of results plus everything needed to fetch the next.
#[derive(Clone)]
pub struct Page<T> {
    /// Resource label for diagnostics (e.g. "files", "models").
    pub name: String,
    pub items: Vec<T>,
    pub next_page_token: String,
    pub sdk_http_response: Option<Value>,
    config: Value,
    list: ListFn<T>,
}

impl<T> std::fmt::Debug for Page<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("name", &self.name)
            .field("items", &self.items.len())
            .field("next_page_token", &self.next_page_token)
            .finish()
    }
}

impl<T> Page<T> {
    /// Execute the list function once with the initial (possibly empty)
    /// configuration and wrap the outputs.
    pub async fn new(name: impl Into<String>, list: ListFn<T>, config: Value) -> Result<Page<T>> {
        let config = normalize_config(config);
        let response = (list)(config.clone()).await?;
        Ok(Page {
            name: name.into(),
            items: response.items,
            next_page_token: response.next_page_token,
            sdk_http_response: response.sdk_http_response,
            config,
            list,
        })
    }

    pub fn has_next(&self) -> bool {
        !self.next_page_token.is_empty()
    }

    /// Fetch the next page by re-invoking the list function with this page's
    /// token. Fails with [`Error::PageExhausted`] when the token is empty.
    pub async fn next(&self) -> Result<Page<T>> {
        if self.next_page_token.is_empty() {
            return Err(Error::PageExhausted);
        }
        let config = with_token(&self.config, &self.next_page_token);
        let response = (self.list)(config.clone()).await?;
        Ok(Page {
            name: self.name.clone(),
            items: response.items,
            next_page_token: response.next_page_token,
            sdk_http_response: response.sdk_http_response,
            config,
            list: self.list.clone(),
        })
    }

    /// Flatten this page and every following one, stopping cleanly on
    /// exhaustion and propagating any other error immediately.
    pub async fn all(self) -> Result<Vec<T>> {
        let mut items = self.items;
        let mut token = self.next_page_token;
        let config = self.config;
        let list = self.list;

        while !token.is_empty() {
            let response = (list)(with_token(&config, &token)).await?;
            items.extend(response.items);
            token = response.next_page_token;
        }
        Ok(items)
    }
}

fn with_token(config: &Value, token: &str) -> Value {
    let mut map = match config {
        Value::Object(m) => m.clone(),
        _ => serde_json::Map::new(),
    };
    map.insert(PAGE_TOKEN_KEY.to_string(), Value::String(token.to_string()));
    Value::Object(map)
}

fn normalize_config(config: Value) -> Value {
    match config {
        Value::Object(_) => config,
        Value::Null => Value::Object(serde_json::Map::new()),
        other => serde_json::json!({ "config": other }),
    }
}
