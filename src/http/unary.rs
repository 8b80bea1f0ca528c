//! Unary dispatch: send one request, read the whole body, decode.

use crate::error::{envelope_from_body, ApiError, Error, ErrorContext};
use crate::http::request::ApiRequest;
use crate::Result;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

/// Send a built request and decode the response body.
///
/// Failure order matters: a well-formed error envelope in the body wins over
/// the transport status (a 200 carrying `{"error":...}` is a failure), and an
/// error-class status without a parseable envelope is synthesized into one so
/// callers always see the same error class for server-reported failures.
pub async fn send_unary(http: &reqwest::Client, request: ApiRequest) -> Result<Value> {
    match request.timeout {
        Some(t) => tokio::time::timeout(t, perform(http, request))
            .await
            .map_err(|_| Error::DeadlineExceeded(t))?,
        None => perform(http, request).await,
    }
}

async fn perform(http: &reqwest::Client, request: ApiRequest) -> Result<Value> {
    debug!(method = %request.method, url = %request.url, "unary dispatch");
    let mut builder = http.request(request.method, &request.url);
    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }

    let response = builder.send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;
    interpret_body(status, &bytes)
}

/// Decode a full response body under the unary rules. Shared with the stream
/// dispatcher for error-status responses.
pub(crate) fn interpret_body(status: StatusCode, bytes: &[u8]) -> Result<Value> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();

    if trimmed.is_empty() {
        if status.is_success() {
            // Empty body on success decodes to an empty result.
            return Ok(Value::Object(serde_json::Map::new()));
        }
        return Err(Error::Api(synthesize_envelope(status, "")));
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => {
            if let Some(envelope) = envelope_from_body(&value) {
                return Err(Error::Api(envelope));
            }
            if !status.is_success() {
                return Err(Error::Api(synthesize_envelope(status, trimmed)));
            }
            Ok(value)
        }
        Err(e) => {
            if !status.is_success() {
                return Err(Error::Api(synthesize_envelope(status, trimmed)));
            }
            Err(Error::decode_with_context(
                format!("invalid JSON in response body: {}", e),
                ErrorContext::new()
                    .with_details(truncate(trimmed, 200))
                    .with_source("unary_dispatcher"),
            ))
        }
    }
}

/// The error for an error-class status. Interpreting the body of a
/// non-success response never decodes successfully, so this just unwraps
/// that path into a plain `Error` for callers that already checked the
/// status.
pub(crate) fn error_for_status(status: StatusCode, bytes: &[u8]) -> Error {
    match interpret_body(status, bytes) {
        Err(e) => e,
        Ok(_) => Error::Api(synthesize_envelope(status, "")),
    }
}

fn synthesize_envelope(status: StatusCode, body: &str) -> ApiError {
    ApiError {
        code: i32::from(status.as_u16()),
        message: truncate(body, 500),
        status: status
            .canonical_reason()
            .unwrap_or("UNKNOWN")
            .to_string(),
        details: Vec::new(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wins_over_success_status() {
        let body = br#"{"error":{"code":500,"message":"boom","status":"INTERNAL"}}"#;
        let err = interpret_body(StatusCode::OK, body).unwrap_err();
        let api = err.as_api_error().expect("application error");
        assert_eq!(api.code, 500);
        assert_eq!(api.status, "INTERNAL");
    }

    #[test]
    fn error_status_without_envelope_is_synthesized() {
        let err = interpret_body(StatusCode::SERVICE_UNAVAILABLE, b"overloaded").unwrap_err();
        let api = err.as_api_error().expect("application error");
        assert_eq!(api.code, 503);
        assert_eq!(api.message, "overloaded");
    }

    #[test]
    fn empty_success_body_is_empty_result() {
        let value = interpret_body(StatusCode::OK, b"").unwrap();
        assert_eq!(value, serde_json::json!({}));
    }

    #[test]
    fn invalid_json_on_success_is_a_decode_error() {
        let err = interpret_body(StatusCode::OK, b"<html>oops</html>").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        assert!(err.as_api_error().is_none());
    }
}
