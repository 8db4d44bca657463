use tessel_world::{ErrorCode, HeaderError, PreconditionError};
use thiserror::Error;

/// Errors from the guest helpers.
#[derive(Debug, Error)]
pub enum GuestError {
  #[error("invalid url: {0}")]
  InvalidUrl(#[from] url::ParseError),

  #[error("invalid header: {0}")]
  Header(#[from] HeaderError),

  #[error("request failed: {0}")]
  Request(#[from] ErrorCode),

  #[error("invalid json: {0}")]
  Json(#[from] serde_json::Error),

  #[error(transparent)]
  Precondition(#[from] PreconditionError),
}

impl GuestError {
  /// Whether submitting a fresh copy of the request may succeed.
  pub fn is_transient(&self) -> bool {
    match self {
      Self::Request(code) => code.is_transient(),
      _ => false,
    }
  }

  /// The transport error code, if this came from the host.
  pub fn code(&self) -> Option<&ErrorCode> {
    match self {
      Self::Request(code) => Some(code),
      _ => None,
    }
  }
}
