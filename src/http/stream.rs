//! Streaming dispatch: a lazy, finite, non-restartable sequence of decoded
//! JSON chunks from a `data:<json>` response body.
//!
//! Framing is strict by design: the body is a sequence of `data:` segments
//! separated by blank-line delimiters (LF and CRLF both accepted). A segment
//! without the `data:` marker is a fatal stream-format error and a segment
//! whose JSON does not parse is a fatal decode error; either terminates the
//! sequence, but items already yielded stay valid. Dropping the stream early
//! releases the underlying connection.

use crate::error::{envelope_from_body, Error, ErrorContext};
use crate::http::request::ApiRequest;
use crate::http::unary::error_for_status;
use crate::Result;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// Pinned, boxed stream of decoded chunks.
pub type JsonStream = Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;

const DATA_PREFIX: &str = "data:";

struct StreamState {
    input: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buf: String,
    /// First decoded segment gets the error-envelope check.
    first: bool,
    done: bool,
    deadline: Option<tokio::time::Instant>,
    budget: Duration,
}

/// Send a built request and expose the body as a chunk stream.
///
/// The request's resolved timeout bounds the *whole* stream lifetime — the
/// initial send and every subsequent read share one deadline.
pub async fn send_stream(http: &reqwest::Client, request: ApiRequest) -> Result<JsonStream> {
    let budget = request.timeout.unwrap_or_default();
    let deadline = request
        .timeout
        .map(|t| tokio::time::Instant::now() + t);

    debug!(method = %request.method, url = %request.url, "stream dispatch");
    let mut builder = http.request(request.method, &request.url);
    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }

    let response = match deadline {
        Some(d) => tokio::time::timeout_at(d, builder.send())
            .await
            .map_err(|_| Error::DeadlineExceeded(budget))??,
        None => builder.send().await?,
    };

    let status = response.status();
    if !status.is_success() {
        // Error-class status: read the whole body and interpret it exactly
        // like a unary failure (envelope or synthesized).
        let bytes = match deadline {
            Some(d) => tokio::time::timeout_at(d, response.bytes())
                .await
                .map_err(|_| Error::DeadlineExceeded(budget))??,
            None => response.bytes().await?,
        };
        return Err(error_for_status(status, &bytes));
    }

    let state = StreamState {
        input: Box::pin(response.bytes_stream()),
        buf: String::new(),
        first: true,
        done: false,
        deadline,
        budget,
    };

    Ok(Box::pin(stream::unfold(state, next_chunk)))
}

async fn next_chunk(mut state: StreamState) -> Option<(Result<Value>, StreamState)> {
    if state.done {
        return None;
    }

    loop {
        // Emit a full frame from the buffer if one is available.
        if let Some((frame, rest_start)) = take_frame(&state.buf) {
            let frame = frame.to_string();
            state.buf.drain(..rest_start);
            match decode_frame(&frame, state.first) {
                FrameOutcome::Skip => continue,
                FrameOutcome::Item(value) => {
                    state.first = false;
                    return Some((Ok(value), state));
                }
                FrameOutcome::Fatal(err) => {
                    state.done = true;
                    return Some((Err(err), state));
                }
            }
        }

        // Need more data.
        let next = match state.deadline {
            Some(d) => match tokio::time::timeout_at(d, state.input.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let budget = state.budget;
                    state.done = true;
                    return Some((Err(Error::DeadlineExceeded(budget)), state));
                }
            },
            None => state.input.next().await,
        };

        match next {
            Some(Ok(bytes)) => {
                state.buf.push_str(&String::from_utf8_lossy(&bytes));
            }
            Some(Err(e)) => {
                state.done = true;
                return Some((Err(Error::Transport(e)), state));
            }
            None => {
                // EOF: one last frame may remain without a trailing delimiter.
                state.done = true;
                let remainder = std::mem::take(&mut state.buf);
                return match decode_frame(&remainder, state.first) {
                    FrameOutcome::Skip => None,
                    FrameOutcome::Item(value) => Some((Ok(value), state)),
                    FrameOutcome::Fatal(err) => Some((Err(err), state)),
                };
            }
        }
    }
}

/// Locate the earliest blank-line delimiter (LF-LF or CRLF-CRLF) and return
/// the frame before it plus the index where the remainder starts.
fn take_frame(buf: &str) -> Option<(&str, usize)> {
    let lf = buf.find("\n\n").map(|i| (i, 2));
    let crlf = buf.find("\r\n\r\n").map(|i| (i, 4));
    let (idx, len) = match (lf, crlf) {
        (Some((a, al)), Some((b, bl))) => {
            // CRLF-CRLF contains no LF-LF, so whichever starts first wins.
            if b < a {
                (b, bl)
            } else {
                (a, al)
            }
        }
        (Some(hit), None) | (None, Some(hit)) => hit,
        (None, None) => return None,
    };
    Some((&buf[..idx], idx + len))
}

enum FrameOutcome {
    Skip,
    Item(Value),
    Fatal(Error),
}

fn decode_frame(frame: &str, first: bool) -> FrameOutcome {
    let trimmed = frame.trim_matches(|c| c == '\r' || c == '\n' || c == ' ' || c == '\t');
    if trimmed.is_empty() {
        return FrameOutcome::Skip;
    }

    let payload = match trimmed.strip_prefix(DATA_PREFIX) {
        Some(rest) => rest.trim_start(),
        None => {
            return FrameOutcome::Fatal(Error::protocol_with_context(
                "stream segment missing 'data:' marker",
                ErrorContext::new()
                    .with_details(preview(trimmed))
                    .with_source("stream_dispatcher"),
            ));
        }
    };

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => {
            if first {
                if let Some(envelope) = envelope_from_body(&value) {
                    return FrameOutcome::Fatal(Error::Api(envelope));
                }
            }
            FrameOutcome::Item(value)
        }
        Err(e) => FrameOutcome::Fatal(Error::decode_with_context(
            format!("invalid JSON in stream segment: {}", e),
            ErrorContext::new()
                .with_details(preview(payload))
                .with_source("stream_dispatcher"),
        )),
    }
}

fn preview(s: &str) -> String {
    let mut end = s.len().min(120);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frames_split_on_lf_and_crlf() {
        let buf = "data:{\"a\":1}\n\ndata:{\"b\":2}\r\n\r\nrest";
        let (frame, rest) = take_frame(buf).unwrap();
        assert_eq!(frame, "data:{\"a\":1}");
        let buf = &buf[rest..];
        let (frame, rest) = take_frame(buf).unwrap();
        assert_eq!(frame, "data:{\"b\":2}");
        assert_eq!(&buf[rest..], "rest");
    }

    #[test]
    fn missing_marker_is_fatal() {
        match decode_frame("event: ping", false) {
            FrameOutcome::Fatal(Error::Protocol { .. }) => {}
            _ => panic!("expected stream-format error"),
        }
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        match decode_frame("data:{not json", false) {
            FrameOutcome::Fatal(Error::Decode { .. }) => {}
            _ => panic!("expected decode error"),
        }
    }

    #[test]
    fn first_frame_error_envelope_is_the_iteration_error() {
        let frame = r#"data:{"error":{"code":403,"message":"denied","status":"PERMISSION_DENIED"}}"#;
        match decode_frame(frame, true) {
            FrameOutcome::Fatal(Error::Api(e)) => assert_eq!(e.code, 403),
            _ => panic!("expected application error"),
        }
        // Past the first frame, an error-shaped object is just data.
        match decode_frame(frame, false) {
            FrameOutcome::Item(v) => assert!(v.get("error").is_some()),
            _ => panic!("expected item"),
        }
    }

    #[test]
    fn blank_frames_are_skipped() {
        assert!(matches!(decode_frame("\r\n", false), FrameOutcome::Skip));
        assert!(matches!(decode_frame("", true), FrameOutcome::Skip));
    }

    #[test]
    fn data_prefix_tolerates_optional_space() {
        match decode_frame("data: {\"a\":1}", false) {
            FrameOutcome::Item(v) => assert_eq!(v, json!({"a":1})),
            _ => panic!("expected item"),
        }
    }
}
