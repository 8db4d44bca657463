//! Tessel Config
//!
//! Serializable host configuration: which destinations guests may reach,
//! transport defaults, the values exposed through the config capability and
//! the invocation timeout.
//!
//! Configuration is loaded from JSON files (via CLI with `--config=host.json`).

mod error;
mod host;
mod http;

pub use error::ConfigError;
pub use host::HostConfig;
pub use http::HttpConfig;
