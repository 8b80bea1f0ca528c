//! Resumable chunked upload protocol.
//!
//! Session shape: one create call obtains a server-issued upload URL, then
//! chunks go out strictly sequentially (each offset depends on the previous
//! chunk's acknowledged size) with an explicit command header, and the server
//! echoes a status header the client validates. Any echo mismatch is a fatal
//! protocol error, never a retry — retry policy belongs to the caller.

use crate::client::Client;
use crate::codec::int64_str;
use crate::error::{Error, ErrorContext};
use crate::http::options::HttpOptions;
use crate::http::request::{base_headers, build_url};
use crate::http::timeout::effective_timeout;
use crate::http::unary::{error_for_status, interpret_body};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Maximum bytes per chunk. The protocol does not document a server-side
/// constraint beyond the client's choice, so this stays a conservative
/// constant.
pub const MAX_CHUNK_SIZE: usize = 8 * 1024 * 1024;

const UPLOAD_PROTOCOL_HEADER: &str = "x-goog-upload-protocol";
const UPLOAD_COMMAND_HEADER: &str = "x-goog-upload-command";
const UPLOAD_OFFSET_HEADER: &str = "x-goog-upload-offset";
const UPLOAD_LENGTH_HEADER: &str = "x-goog-upload-header-content-length";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";
const UPLOAD_STATUS_HEADER: &str = "x-goog-upload-status";

/// Upload command flags. The wire encoding is an ad hoc comma-joined string;
/// only the three observed forms are ever produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UploadCommand(u8);

impl UploadCommand {
    pub(crate) const START: UploadCommand = UploadCommand(0b001);
    pub(crate) const ACTIVE: UploadCommand = UploadCommand(0b010);
    pub(crate) const FINALIZE: UploadCommand = UploadCommand(0b100);

    pub(crate) fn union(self, other: UploadCommand) -> UploadCommand {
        UploadCommand(self.0 | other.0)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            UploadCommand::START => "start",
            UploadCommand::ACTIVE => "active",
            c if c == UploadCommand::ACTIVE.union(UploadCommand::FINALIZE) => "active,finalize",
            _ => unreachable!("unobserved upload command combination"),
        }
    }
}

/// Declared metadata for the resource being created.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub mime_type: String,
    /// Total byte length when known ahead of time; sent as a header, not a
    /// body field. Absent when the source length is unknown.
    #[serde(skip)]
    pub size_bytes: Option<i64>,
}

impl UploadConfig {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            ..Self::default()
        }
    }
}

/// Canonical resource description returned on upload completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct File {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(
        default,
        with = "int64_str",
        skip_serializing_if = "Option::is_none"
    )]
    pub size_bytes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// An in-flight upload. Created by [`UploadSession::start`], driven chunk by
/// chunk, discarded once finalized or errored.
pub struct UploadSession<'c> {
    client: &'c Client,
    upload_url: String,
    headers: HashMap<String, String>,
    offset: u64,
    finalized: bool,
    deadline: Option<tokio::time::Instant>,
    budget: Duration,
}

impl<'c> UploadSession<'c> {
    /// Issue the create-session call and capture the server-issued upload URL.
    pub async fn start(
        client: &'c Client,
        config: &UploadConfig,
        options: &HttpOptions,
    ) -> Result<UploadSession<'c>> {
        let cfg = client.config();
        let version = options
            .api_version
            .as_deref()
            .unwrap_or(&cfg.api_version);
        let url = build_url(cfg, &format!("upload/{}/files", version), options)?;

        // One resolved timeout bounds the whole session: start and every
        // chunk share the deadline.
        let budget = effective_timeout(cfg, options).unwrap_or_default();
        let deadline = effective_timeout(cfg, options)
            .map(|t| tokio::time::Instant::now() + t);

        let mut headers = base_headers(cfg, options);
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert(UPLOAD_PROTOCOL_HEADER.to_string(), "resumable".to_string());
        headers.insert(
            UPLOAD_COMMAND_HEADER.to_string(),
            UploadCommand::START.as_str().to_string(),
        );
        if let Some(size) = config.size_bytes {
            headers.insert(UPLOAD_LENGTH_HEADER.to_string(), size.to_string());
        }

        let body = serde_json::json!({ "file": config });
        debug!(url = %url, "starting resumable upload");

        let mut builder = client.http().post(&url).body(serde_json::to_vec(&body)?);
        for (name, value) in &headers {
            builder = builder.header(name, value);
        }
        let response = Self::bounded(deadline, budget, builder.send()).await??;

        let upload_url = response
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let status = response.status();
        if !status.is_success() {
            let bytes = Self::bounded(deadline, budget, response.bytes()).await??;
            return Err(error_for_status(status, &bytes));
        }

        let upload_url = upload_url.ok_or_else(|| {
            Error::protocol_with_context(
                "upload URL not returned by create-session call",
                ErrorContext::new()
                    .with_field_path(UPLOAD_URL_HEADER)
                    .with_source("upload_session"),
            )
        })?;

        // Chunk requests go to the server-issued URL with the same auth and
        // identification headers; command and offset are added per chunk.
        let chunk_headers = base_headers(cfg, options);

        Ok(UploadSession {
            client,
            upload_url,
            headers: chunk_headers,
            offset: 0,
            finalized: false,
            deadline,
            budget,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Send one chunk at the current cumulative offset. Returns the decoded
    /// resource when `finalize` completes the session, `None` otherwise.
    pub async fn send_chunk(&mut self, data: &[u8], finalize: bool) -> Result<Option<File>> {
        if self.finalized {
            return Err(Error::protocol("upload session already finalized"));
        }

        let command = if finalize {
            UploadCommand::ACTIVE.union(UploadCommand::FINALIZE)
        } else {
            UploadCommand::ACTIVE
        };
        debug!(
            offset = self.offset,
            len = data.len(),
            command = command.as_str(),
            "sending upload chunk"
        );

        let mut builder = self
            .client
            .http()
            .post(&self.upload_url)
            .body(data.to_vec());
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        builder = builder
            .header(UPLOAD_COMMAND_HEADER, command.as_str())
            .header(UPLOAD_OFFSET_HEADER, self.offset.to_string());

        let response = Self::bounded(self.deadline, self.budget, builder.send()).await??;

        let upload_status = response
            .headers()
            .get(UPLOAD_STATUS_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let status = response.status();
        let bytes = Self::bounded(self.deadline, self.budget, response.bytes()).await??;

        if !status.is_success() {
            return Err(error_for_status(status, &bytes));
        }

        let expected = if finalize { "final" } else { "active" };
        match upload_status.as_deref() {
            Some(echoed) if echoed == expected => {}
            other => {
                return Err(Error::protocol_with_context(
                    format!(
                        "server echoed upload status {:?}, expected {:?}",
                        other.unwrap_or("<missing>"),
                        expected
                    ),
                    ErrorContext::new()
                        .with_field_path(UPLOAD_STATUS_HEADER)
                        .with_details(format!("offset {}", self.offset))
                        .with_source("upload_session"),
                ));
            }
        }

        self.offset += data.len() as u64;

        if finalize {
            self.finalized = true;
            let value = interpret_body(status, &bytes)?;
            let file_value = value.get("file").cloned().unwrap_or(value);
            let file: File = serde_json::from_value(file_value).map_err(|e| {
                Error::decode_with_context(
                    format!("invalid resource description on finalize: {}", e),
                    ErrorContext::new().with_source("upload_session"),
                )
            })?;
            return Ok(Some(file));
        }
        Ok(None)
    }

    async fn bounded<F, T>(
        deadline: Option<tokio::time::Instant>,
        budget: Duration,
        fut: F,
    ) -> Result<T>
    where
        F: std::future::Future<Output = T>,
    {
        match deadline {
            Some(d) => tokio::time::timeout_at(d, fut)
                .await
                .map_err(|_| Error::DeadlineExceeded(budget)),
            None => Ok(fut.await),
        }
    }
}

/// Drive a whole upload from an async source: start, chunk sequentially,
/// finalize on end-of-source. A zero-length source sends a single zero-byte
/// finalizing chunk.
pub async fn upload_from<R: AsyncRead + Unpin>(
    client: &Client,
    mut source: R,
    config: UploadConfig,
    options: &HttpOptions,
) -> Result<File> {
    let mut session = UploadSession::start(client, &config, options).await?;

    let mut current = read_chunk(&mut source, 0).await?;
    loop {
        // The last chunk is determined by reaching end-of-source: a short
        // chunk is final; a full one is final only if nothing follows it.
        let next = if current.len() == MAX_CHUNK_SIZE {
            read_chunk(&mut source, session.offset() + current.len() as u64).await?
        } else {
            Vec::new()
        };
        let finalize = next.is_empty();

        let result = session.send_chunk(&current, finalize).await?;
        if finalize {
            return result.ok_or_else(|| Error::protocol("finalized upload returned no resource"));
        }
        current = next;
    }
}

/// Read up to one full chunk, reporting the failing offset on error.
async fn read_chunk<R: AsyncRead + Unpin>(source: &mut R, offset: u64) -> Result<Vec<u8>> {
    let mut chunk = vec![0u8; MAX_CHUNK_SIZE];
    let mut filled = 0;
    while filled < MAX_CHUNK_SIZE {
        let n = source.read(&mut chunk[filled..]).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("reading upload source at offset {}: {}", offset + filled as u64, e),
            ))
        })?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    chunk.truncate(filled);
    Ok(chunk)
}
