//! Client facade: one configured entry point for unary, streaming, upload,
//! live, and list calls against either backend.

use crate::config::{api_key_from_env, project_from_env, Backend, ClientConfig};
use crate::error::{Error, ErrorContext};
use crate::http::options::HttpOptions;
use crate::http::request::build_request;
use crate::http::stream::{send_stream, JsonStream};
use crate::http::unary::send_unary;
use crate::live::{connect_live, LiveConnectConfig, LiveSession};
use crate::upload::{upload_from, File, UploadConfig};
use crate::Result;
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;

/// Handle to one configured backend. Cheap to clone; safe for concurrent use
/// — configuration is read-only after construction and every call owns its
/// own timeout and transport request.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    http: reqwest::Client,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.config.base_url)
            .field("api_version", &self.config.api_version)
            .field("key_addressed", &self.config.backend.is_key_addressed())
            .finish()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Issue a unary call and decode the JSON result.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        payload: &Value,
        options: Option<&HttpOptions>,
    ) -> Result<Value> {
        let default = HttpOptions::default();
        let options = options.unwrap_or(&default);
        let request = build_request(&self.config, method, path, payload, options)?;
        send_unary(&self.http, request).await
    }

    /// Issue a streaming call and expose the body as a lazy chunk sequence.
    pub async fn request_stream(
        &self,
        method: Method,
        path: &str,
        payload: &Value,
        options: Option<&HttpOptions>,
    ) -> Result<JsonStream> {
        let default = HttpOptions::default();
        let options = options.unwrap_or(&default);
        let request = build_request(&self.config, method, path, payload, options)?;
        send_stream(&self.http, request).await
    }

    pub async fn get(&self, path: &str, options: Option<&HttpOptions>) -> Result<Value> {
        self.request(Method::GET, path, &Value::Null, options).await
    }

    pub async fn post(
        &self,
        path: &str,
        payload: &Value,
        options: Option<&HttpOptions>,
    ) -> Result<Value> {
        self.request(Method::POST, path, payload, options).await
    }

    pub async fn delete(&self, path: &str, options: Option<&HttpOptions>) -> Result<Value> {
        self.request(Method::DELETE, path, &Value::Null, options)
            .await
    }

    /// Upload a source through the resumable chunked protocol and return the
    /// canonical resource description.
    pub async fn upload<R: AsyncRead + Unpin>(
        &self,
        source: R,
        config: UploadConfig,
        options: Option<&HttpOptions>,
    ) -> Result<File> {
        let default = HttpOptions::default();
        let options = options.unwrap_or(&default);
        upload_from(self, source, config, options).await
    }

    /// Open a live bidirectional session against the given model.
    pub async fn connect(&self, model: &str, config: LiveConnectConfig) -> Result<LiveSession> {
        connect_live(&self.config, model, config).await
    }
}

/// Builder for [`Client`].
///
/// Keep this surface area small and predictable: credentials, addressing,
/// base URL / version overrides, default headers, default timeout. Anything
/// per-call goes through [`HttpOptions`].
#[derive(Default)]
pub struct ClientBuilder {
    api_key: Option<String>,
    project: Option<String>,
    location: Option<String>,
    access_token: Option<String>,
    base_url: Option<String>,
    api_version: Option<String>,
    headers: HashMap<String, String>,
    timeout: Option<Duration>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the key-addressed public backend with this API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Use the project-addressed managed backend.
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Bearer token for the project-addressed backend. Token acquisition and
    /// refresh are the caller's concern.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Override the base URL (primarily for testing with mock servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Add a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Transport-level default timeout; participates in smallest-non-zero-wins
    /// resolution with per-call overrides and ambient deadlines.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Client> {
        let backend = self.resolve_backend()?;
        backend.validate()?;

        let base_url = self.base_url.unwrap_or_else(|| backend.default_base_url());
        let api_version = self
            .api_version
            .unwrap_or_else(|| backend.default_api_version().to_string());

        url::Url::parse(&base_url).map_err(|e| {
            Error::build_with_context(
                format!("malformed base URL {:?}: {}", base_url, e),
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_source("client_builder"),
            )
        })?;

        let config = ClientConfig {
            backend,
            base_url,
            api_version,
            default_headers: self.headers,
            timeout: self.timeout,
        };

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?;

        Ok(Client {
            config: Arc::new(config),
            http,
        })
    }

    fn resolve_backend(&self) -> Result<Backend> {
        let wants_managed =
            self.project.is_some() || self.location.is_some() || self.access_token.is_some();

        if let Some(key) = &self.api_key {
            if wants_managed {
                return Err(Error::build_with_context(
                    "API key and project/location are mutually exclusive",
                    ErrorContext::new()
                        .with_field_path("api_key")
                        .with_details("choose one addressing mode per client")
                        .with_source("client_builder"),
                ));
            }
            return Ok(Backend::KeyAddressed {
                api_key: key.clone(),
            });
        }

        if wants_managed {
            let (env_project, env_location, env_token) = project_from_env();
            return Ok(Backend::ProjectAddressed {
                project: self.project.clone().or(env_project).unwrap_or_default(),
                location: self.location.clone().or(env_location).unwrap_or_default(),
                access_token: self.access_token.clone().or(env_token),
            });
        }

        // Nothing explicit: discover from the environment, managed first.
        let (env_project, env_location, env_token) = project_from_env();
        if let (Some(project), Some(location)) = (env_project, env_location) {
            return Ok(Backend::ProjectAddressed {
                project,
                location,
                access_token: self.access_token.clone().or(env_token),
            });
        }
        if let Some(key) = api_key_from_env() {
            return Ok(Backend::KeyAddressed { api_key: key });
        }

        Err(Error::build_with_context(
            "no credentials configured",
            ErrorContext::new()
                .with_details(
                    "set an API key, or project and location (GENAI_API_KEY / GENAI_PROJECT / GENAI_LOCATION)",
                )
                .with_source("client_builder"),
        ))
    }
}
