//! Effective-timeout resolution across the three configuration layers.

use crate::config::ClientConfig;
use crate::http::options::HttpOptions;
use std::time::{Duration, Instant};

/// Combine the ambient deadline, the transport-level default, and the
/// per-call override into one effective duration.
///
/// Only *set and non-zero* candidates participate: an explicit zero override
/// means "prefer no override, defer to the next layer". When no candidate
/// remains the result is `None` (no timeout). Otherwise the minimum wins.
/// The same resolution governs unary and streaming calls; for streams the
/// result bounds the whole stream's lifetime, not each chunk.
pub fn resolve_timeout(
    ambient: Option<Duration>,
    transport: Option<Duration>,
    per_call: Option<Duration>,
) -> Option<Duration> {
    [per_call, transport, ambient]
        .into_iter()
        .flatten()
        .filter(|d| !d.is_zero())
        .min()
}

/// Resolve the effective timeout for one call from config + options,
/// converting the ambient deadline to remaining time now.
///
/// An ambient deadline that has already elapsed is not an explicit zero
/// override — it keeps its meaning as an exhausted budget, so the call fails
/// immediately with a deadline error instead of running unbounded.
pub fn effective_timeout(config: &ClientConfig, options: &HttpOptions) -> Option<Duration> {
    let ambient = options
        .deadline
        .map(|d| d.saturating_duration_since(Instant::now()));
    if ambient == Some(Duration::ZERO) {
        return Some(Duration::from_nanos(1));
    }
    resolve_timeout(ambient, config.timeout, options.timeout)
}
