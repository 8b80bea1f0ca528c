//! Client configuration and backend addressing.
//!
//! Two addressing conventions exist for the same service surface:
//!
//! - **key-addressed**: a fixed public host, authenticated with a single
//!   opaque API key, paths relative to the host.
//! - **project-addressed**: a managed regional host, authenticated with a
//!   bearer token, paths qualified by `projects/{project}/locations/{location}`.
//!
//! Both are consumed by one request builder; the difference is captured as a
//! tagged [`Backend`] variant plus the path-rewriting rules below, not as two
//! client types.

use crate::error::{Error, ErrorContext};
use crate::Result;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Default public host for the key-addressed backend.
pub const PUBLIC_BASE_URL: &str = "https://generativelanguage.googleapis.com";
/// Default API version for the key-addressed backend.
pub const PUBLIC_API_VERSION: &str = "v1beta";
/// Default API version for the project-addressed backend.
pub const MANAGED_API_VERSION: &str = "v1beta1";

/// Backend addressing mode plus the credential material that goes with it.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Public endpoint addressed by an opaque API key.
    KeyAddressed { api_key: String },
    /// Managed endpoint addressed by project and location, authenticated with
    /// a caller-supplied bearer token. Token acquisition is out of scope.
    ProjectAddressed {
        project: String,
        location: String,
        access_token: Option<String>,
    },
}

impl Backend {
    pub fn is_key_addressed(&self) -> bool {
        matches!(self, Backend::KeyAddressed { .. })
    }

    /// Default base URL for this addressing mode.
    pub fn default_base_url(&self) -> String {
        match self {
            Backend::KeyAddressed { .. } => PUBLIC_BASE_URL.to_string(),
            Backend::ProjectAddressed { location, .. } => {
                format!("https://{}-aiplatform.googleapis.com", location)
            }
        }
    }

    pub fn default_api_version(&self) -> &'static str {
        match self {
            Backend::KeyAddressed { .. } => PUBLIC_API_VERSION,
            Backend::ProjectAddressed { .. } => MANAGED_API_VERSION,
        }
    }

    /// Rewrite a request path for this addressing mode.
    ///
    /// Key-addressed paths pass through untouched. Project-addressed paths
    /// that are not already fully qualified (`projects/...`) are prefixed
    /// with the project/location qualifier, so shorthand `models/...` and
    /// `publishers/...` paths address the caller's project.
    pub fn rewrite_path(&self, path: &str) -> String {
        match self {
            Backend::KeyAddressed { .. } => path.to_string(),
            Backend::ProjectAddressed {
                project, location, ..
            } => {
                if path.starts_with("projects/") {
                    path.to_string()
                } else {
                    format!("projects/{}/locations/{}/{}", project, location, path)
                }
            }
        }
    }

    /// Fully qualify a model identifier for this addressing mode.
    ///
    /// Bare names (`gemini-2.0-flash`) become `models/{name}` on the
    /// key-addressed backend and
    /// `projects/{p}/locations/{l}/publishers/google/models/{name}` on the
    /// project-addressed one. Already-qualified names pass through.
    pub fn qualify_model(&self, model: &str) -> String {
        match self {
            Backend::KeyAddressed { .. } => {
                if model.contains('/') {
                    model.to_string()
                } else {
                    format!("models/{}", model)
                }
            }
            Backend::ProjectAddressed {
                project, location, ..
            } => {
                if model.starts_with("projects/") {
                    model.to_string()
                } else if model.starts_with("publishers/") {
                    format!("projects/{}/locations/{}/{}", project, location, model)
                } else if let Some(bare) = model.strip_prefix("models/") {
                    format!(
                        "projects/{}/locations/{}/publishers/google/models/{}",
                        project, location, bare
                    )
                } else {
                    format!(
                        "projects/{}/locations/{}/publishers/google/models/{}",
                        project, location, model
                    )
                }
            }
        }
    }

    /// Enforce the mode/credential consistency invariant.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Backend::KeyAddressed { api_key } => {
                if api_key.trim().is_empty() {
                    return Err(Error::build_with_context(
                        "key-addressed backend requires a non-empty API key",
                        ErrorContext::new()
                            .with_field_path("backend.api_key")
                            .with_source("client_config"),
                    ));
                }
            }
            Backend::ProjectAddressed {
                project, location, ..
            } => {
                if project.is_empty() || location.is_empty() {
                    return Err(Error::build_with_context(
                        "project-addressed backend requires project and location",
                        ErrorContext::new()
                            .with_field_path("backend.project/location")
                            .with_details(
                                "set them explicitly or via GENAI_PROJECT / GENAI_LOCATION",
                            )
                            .with_source("client_config"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Immutable per-client configuration. Constructed once by the builder;
/// per-call variation goes through `HttpOptions` overrides instead.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend: Backend,
    pub base_url: String,
    pub api_version: String,
    /// Headers attached to every request; per-call headers override these
    /// key-by-key.
    pub default_headers: HashMap<String, String>,
    /// Transport-level default timeout. `None` means no client-side bound.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    /// WebSocket base (`wss://host[:port]`) derived from the HTTP base URL.
    /// Plain-HTTP bases map to `ws://`, which keeps loopback test servers
    /// reachable.
    pub(crate) fn ws_base(&self) -> Result<String> {
        let parsed = url::Url::parse(&self.base_url).map_err(|e| {
            Error::build_with_context(
                format!("malformed base URL {:?}: {}", self.base_url, e),
                ErrorContext::new()
                    .with_field_path("config.base_url")
                    .with_source("client_config"),
            )
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::build("base URL has no host"))?;
        let scheme = if parsed.scheme() == "http" { "ws" } else { "wss" };
        Ok(match parsed.port() {
            Some(port) => format!("{}://{}:{}", scheme, host, port),
            None => format!("{}://{}", scheme, host),
        })
    }
}

/// Discover key-addressed credentials from the environment.
pub(crate) fn api_key_from_env() -> Option<String> {
    env::var("GENAI_API_KEY").ok().filter(|k| !k.is_empty())
}

/// Discover project/location/token from the environment.
pub(crate) fn project_from_env() -> (Option<String>, Option<String>, Option<String>) {
    let get = |name: &str| env::var(name).ok().filter(|v| !v.is_empty());
    (
        get("GENAI_PROJECT"),
        get("GENAI_LOCATION"),
        get("GENAI_ACCESS_TOKEN"),
    )
}
