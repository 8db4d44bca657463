use thiserror::Error;

/// Errors setting up the HTTP capability. Per-request failures are
/// [`tessel_world::ErrorCode`]s instead.
#[derive(Debug, Error)]
pub enum HttpHostError {
  #[error("failed to build http client: {0}")]
  Client(#[from] reqwest::Error),
}
