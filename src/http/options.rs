//! Per-call HTTP option overrides.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Hook invoked on the serialized top-level request map before encoding.
/// May add or overwrite top-level keys (vendor extras, experiment flags).
pub type ExtrasHook = Arc<dyn Fn(Map<String, Value>) -> Map<String, Value> + Send + Sync>;

/// Per-call overrides, merged over client-level defaults with "most specific
/// wins, headers accumulate" semantics:
///
/// - `base_url` / `api_version`: call-level value replaces the client's.
/// - `headers`: a key present in both is replaced by the call-level value; a
///   key present only at client level survives.
/// - `timeout`: participates in smallest-non-zero-wins resolution together
///   with the client default and the ambient `deadline`. An explicit
///   `Duration::ZERO` means "no override here, fall back", not "zero budget".
#[derive(Clone, Default)]
pub struct HttpOptions {
    pub base_url: Option<String>,
    pub api_version: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout: Option<Duration>,
    /// Ambient cancellation deadline; converted to remaining time at dispatch.
    pub deadline: Option<Instant>,
    pub extras: Option<ExtrasHook>,
}

impl std::fmt::Debug for HttpOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOptions")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("deadline", &self.deadline)
            .field("extras", &self.extras.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

impl HttpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_extras(mut self, hook: ExtrasHook) -> Self {
        self.extras = Some(hook);
        self
    }

    /// Merge client-default headers under the per-call ones.
    pub(crate) fn merged_headers(
        &self,
        defaults: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut merged = defaults.clone();
        for (k, v) in &self.headers {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_headers_win_client_only_survive() {
        let mut defaults = HashMap::new();
        defaults.insert("x-client-only".to_string(), "keep".to_string());
        defaults.insert("x-shared".to_string(), "client".to_string());

        let opts = HttpOptions::new().with_header("x-shared", "call");
        let merged = opts.merged_headers(&defaults);

        assert_eq!(merged.get("x-client-only").unwrap(), "keep");
        assert_eq!(merged.get("x-shared").unwrap(), "call");
    }
}
