use tessel_host_http::HttpHostError;
use thiserror::Error;

/// Errors that can occur while setting up a host.
#[derive(Debug, Error)]
pub enum HostError {
  /// The HTTP capability could not be created.
  #[error("http capability: {0}")]
  Http(#[from] HttpHostError),
}
