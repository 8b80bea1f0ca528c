//! HTTP request construction and dispatch (unary + streaming).

pub mod options;
pub mod request;
pub mod stream;
pub mod timeout;
pub mod unary;

pub use options::{ExtrasHook, HttpOptions};
pub use request::ApiRequest;
pub use stream::JsonStream;
pub use timeout::resolve_timeout;
