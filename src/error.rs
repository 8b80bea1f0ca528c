use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "http_options.base_url")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected value, failing offset)
    pub details: Option<String>,
    /// Source of the error (e.g., "request_builder", "upload_session")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// The server's structured error envelope.
///
/// Produced whenever a response body carries a top-level `error` object,
/// regardless of the transport status code — a 200 response can still carry
/// one and is treated as a failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<serde_json::Value>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "API error {} ({}): {}",
            self.code, self.status, self.message
        )
    }
}

impl std::error::Error for ApiError {}

/// Unified error type for the client core.
///
/// Each variant maps to one failure class: request construction, transport,
/// deadline expiry, protocol-sequence violations, server-reported application
/// errors, body decoding, and the pager's end-of-iteration sentinel. None of
/// these are retried internally; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Build error: {message}{}", format_context(.context))]
    Build {
        message: String,
        context: ErrorContext,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Live transport error: {0}")]
    LiveTransport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(std::time::Duration),

    #[error("Protocol error: {message}{}", format_context(.context))]
    Protocol {
        message: String,
        context: ErrorContext,
    },

    #[error("{0}")]
    Api(ApiError),

    #[error("Decode error: {message}{}", format_context(.context))]
    Decode {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Terminal pagination condition. Not a failure: callers iterate until
    /// they see this and stop.
    #[error("No more pages")]
    PageExhausted,
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new build error with structured context
    pub fn build_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Build {
            message: msg.into(),
            context,
        }
    }

    pub fn build(msg: impl Into<String>) -> Self {
        Error::Build {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a new protocol error with structured context
    pub fn protocol_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Protocol {
            message: msg.into(),
            context,
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a new decode error with structured context
    pub fn decode_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Decode {
            message: msg.into(),
            context,
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Build { context, .. }
            | Error::Protocol { context, .. }
            | Error::Decode { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Extract the server error envelope if this is an application error.
    pub fn as_api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) => Some(e),
            _ => None,
        }
    }
}

/// Pull a structured error envelope out of a decoded response body, if the
/// body carries a top-level `error` object.
pub(crate) fn envelope_from_body(body: &serde_json::Value) -> Option<ApiError> {
    let error = body.get("error")?;
    if !error.is_object() {
        return None;
    }
    serde_json::from_value(error.clone()).ok()
}
