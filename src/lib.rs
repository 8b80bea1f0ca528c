//! # genai-client
//!
//! Client core for a remote generative-media API, supporting two backend
//! addressing conventions behind one request path: an API-key-addressed
//! public endpoint and a project/location-addressed managed endpoint.
//!
//! ## Overview
//!
//! This crate is deliberately a *core*: it builds requests, drives the wire
//! protocols, and hands typed results back. Higher layers own retry policy,
//! feature-specific payload shapes, and anything resembling UI or storage.
//!
//! ## Key Features
//!
//! - **Unified Client**: [`Client`] is the single entry point for both
//!   addressing modes; per-call variation goes through [`HttpOptions`]
//! - **Unary + Streaming HTTP**: JSON calls and lazy `data:`-framed chunk
//!   streams with strict framing and one deadline per stream
//! - **Resumable Uploads**: the chunked start/active/finalize protocol with
//!   offset tracking and strict status-echo validation
//! - **Live Sessions**: bidirectional JSON-over-WebSocket with a
//!   setup/acknowledge handshake, realtime input, and session resumption
//! - **Pagination**: a generic [`Page`] over any injected list operation
//! - **Wire Codecs**: int64-as-string, duration-as-suffixed-string, and
//!   partial-date conversions in [`codec`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use genai_client::Client;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> genai_client::Result<()> {
//!     let client = Client::builder().api_key("your-api-key").build()?;
//!
//!     let response = client
//!         .post(
//!             "models/gemini-2.0-flash:generateContent",
//!             &json!({"contents": [{"parts": [{"text": "Hello"}]}]}),
//!             None,
//!         )
//!         .await?;
//!     println!("{response}");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Client facade and builder |
//! | [`config`] | Backend addressing and immutable client configuration |
//! | [`http`] | Request construction, timeout resolution, unary/stream dispatch |
//! | [`upload`] | Resumable chunked upload sessions |
//! | [`live`] | Bidirectional live sessions and their message unions |
//! | [`pager`] | Cursor-based pagination over list operations |
//! | [`codec`] | Wire codecs for non-JSON-native value shapes |

pub mod client;
pub mod codec;
pub mod config;
pub mod http;
pub mod live;
pub mod pager;
pub mod upload;

// Re-export main types for convenience
pub use client::{Client, ClientBuilder};
pub use config::Backend;
pub use http::{HttpOptions, JsonStream};
pub use live::{LiveConnectConfig, LiveRealtimeInput, LiveServerMessage, LiveSession};
pub use pager::{Page, PagedResponse};
pub use upload::{File, UploadConfig, UploadSession, MAX_CHUNK_SIZE};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{ApiError, Error, ErrorContext};
