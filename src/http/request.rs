//! Request construction: URL, headers, body.
//!
//! One builder serves both addressing modes; the mode only changes the path
//! rewrite (see `config::Backend::rewrite_path`) and the credential header.

use crate::config::{Backend, ClientConfig};
use crate::error::{Error, ErrorContext};
use crate::http::options::HttpOptions;
use crate::http::timeout::effective_timeout;
use crate::Result;
use once_cell::sync::Lazy;
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

pub(crate) const API_KEY_HEADER: &str = "x-goog-api-key";
pub(crate) const SDK_CLIENT_HEADER: &str = "x-goog-api-client";
pub(crate) const USER_AGENT_HEADER: &str = "user-agent";
/// Server-side budget hint in whole seconds, derived from the effective
/// timeout so the remote side can cooperatively bound its own work.
pub(crate) const SERVER_TIMEOUT_HEADER: &str = "x-server-timeout";

static SDK_IDENTIFIER: Lazy<String> = Lazy::new(|| {
    format!(
        "genai-client-rust/{} gl-rust/edition2021",
        env!("CARGO_PKG_VERSION")
    )
});

/// A transport request ready to hand to `reqwest`, plus the effective
/// timeout already resolved for it.
#[derive(Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

/// Build a ready-to-send request for `path` under the given config and
/// per-call options.
///
/// Path handling:
/// - a path starting with `upload/` already carries its version segment and
///   is appended to the base URL verbatim (resumable-upload entry point);
/// - any other path is rewritten for the addressing mode and placed under
///   `{base}/{version}/`.
pub fn build_request(
    config: &ClientConfig,
    method: Method,
    path: &str,
    payload: &Value,
    options: &HttpOptions,
) -> Result<ApiRequest> {
    let url = build_url(config, path, options)?;
    let timeout = effective_timeout(config, options);
    let body = encode_body(payload, options)?;

    let mut headers = base_headers(config, options);
    if body.is_some() {
        headers.insert("content-type".to_string(), "application/json".to_string());
    }
    if let Some(t) = timeout {
        // Whole seconds, rounded up so the server never gets a smaller
        // budget than the client enforces.
        let secs = t.as_secs() + u64::from(t.subsec_nanos() > 0);
        headers.insert(SERVER_TIMEOUT_HEADER.to_string(), secs.to_string());
    }

    Ok(ApiRequest {
        method,
        url,
        headers,
        body,
        timeout,
    })
}

pub(crate) fn build_url(config: &ClientConfig, path: &str, options: &HttpOptions) -> Result<String> {
    let base = options
        .base_url
        .as_deref()
        .unwrap_or(&config.base_url)
        .trim_end_matches('/');
    let version = options
        .api_version
        .as_deref()
        .unwrap_or(&config.api_version);

    let url = if path.starts_with("upload/") {
        format!("{}/{}", base, path)
    } else {
        format!("{}/{}/{}", base, version, config.backend.rewrite_path(path))
    };

    url::Url::parse(&url).map_err(|e| {
        Error::build_with_context(
            format!("malformed request URL {:?}: {}", url, e),
            ErrorContext::new()
                .with_field_path("http_options.base_url")
                .with_source("request_builder"),
        )
    })?;
    Ok(url)
}

/// Headers common to every transport call: client defaults merged under
/// per-call values, credential material for the addressing mode, and the SDK
/// identification appended (never overwriting a caller-supplied value).
pub(crate) fn base_headers(
    config: &ClientConfig,
    options: &HttpOptions,
) -> HashMap<String, String> {
    let mut headers = options.merged_headers(&config.default_headers);

    match &config.backend {
        Backend::KeyAddressed { api_key } => {
            headers.insert(API_KEY_HEADER.to_string(), api_key.clone());
        }
        Backend::ProjectAddressed { access_token, .. } => {
            if let Some(token) = access_token {
                headers.insert("authorization".to_string(), format!("Bearer {}", token));
            }
        }
    }

    for name in [SDK_CLIENT_HEADER, USER_AGENT_HEADER] {
        let appended = match headers.get(name) {
            Some(existing) if !existing.is_empty() => {
                format!("{} {}", existing, SDK_IDENTIFIER.as_str())
            }
            _ => SDK_IDENTIFIER.clone(),
        };
        headers.insert(name.to_string(), appended);
    }

    headers
}

fn encode_body(payload: &Value, options: &HttpOptions) -> Result<Option<Vec<u8>>> {
    // Empty payload: omit the body entirely (some endpoints reject "{}").
    let is_empty = match payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if is_empty && options.extras.is_none() {
        return Ok(None);
    }

    let value = match (&options.extras, payload) {
        (Some(hook), Value::Object(map)) => Value::Object(hook(map.clone())),
        (Some(hook), Value::Null) => Value::Object(hook(serde_json::Map::new())),
        _ => payload.clone(),
    };

    if let Value::Object(map) = &value {
        if map.is_empty() {
            return Ok(None);
        }
    }

    let encoded = serde_json::to_vec(&value).map_err(|e| {
        Error::build_with_context(
            format!("failed to encode request payload: {}", e),
            ErrorContext::new()
                .with_field_path("payload")
                .with_source("request_builder"),
        )
    })?;
    Ok(Some(encoded))
}
