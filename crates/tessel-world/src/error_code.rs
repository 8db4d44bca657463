//! Transport and protocol failure codes for outgoing requests.
//!
//! These are structured, classifiable errors, kept apart from a task's own
//! free-form `String` errors. Whether a code is worth retrying is fixed per
//! variant by [`ErrorCode::retryability`].

use thiserror::Error;

/// Whether an identical request may succeed if submitted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Retryability {
  /// Retrying the identical request cannot succeed.
  Fatal,
  /// Retrying may succeed.
  Transient,
}

/// Why an outgoing request failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorCode {
  /// The request could not be constructed or is malformed.
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  /// The destination is not permitted by the host's policy.
  #[error("destination not permitted by policy: {authority}")]
  PolicyDenied { authority: String },

  /// The request body exceeds the host's limit.
  #[error("request body exceeds limit of {limit} bytes")]
  RequestBodyTooLarge { limit: u64 },

  /// DNS resolution failed.
  #[error("dns error{}", .rcode.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
  DnsError {
    rcode: Option<String>,
    info: Option<String>,
  },

  /// The destination refused the connection.
  #[error("connection refused")]
  ConnectionRefused,

  /// The connection could not be established in time.
  #[error("connection timed out")]
  ConnectionTimeout,

  /// The connection was closed before the exchange completed.
  #[error("connection terminated")]
  ConnectionTerminated,

  /// TLS negotiation failed.
  #[error("tls protocol error")]
  TlsProtocolError,

  /// The peer's certificate was rejected.
  #[error("tls certificate error")]
  TlsCertificateError,

  /// The response violated the HTTP protocol.
  #[error("http protocol error: {0}")]
  HttpProtocolError(String),

  /// No response head arrived within the first-byte timeout.
  #[error("timed out waiting for first response byte")]
  FirstByteTimeout,

  /// The response body stalled past the between-bytes timeout.
  #[error("timed out reading response body")]
  BodyReadTimeout,

  /// The response body exceeds the host's limit.
  #[error("response body exceeds limit of {limit} bytes")]
  ResponseBodyTooLarge { limit: u64 },

  /// The in-flight operation was cancelled by the host.
  #[error("request cancelled")]
  Cancelled,

  /// The host failed in an unexpected way.
  #[error("internal error: {0}")]
  Internal(String),
}

impl ErrorCode {
  /// Fixed retry classification of this variant.
  pub fn retryability(&self) -> Retryability {
    match self {
      Self::InvalidRequest(_)
      | Self::PolicyDenied { .. }
      | Self::RequestBodyTooLarge { .. }
      | Self::TlsCertificateError
      | Self::HttpProtocolError(_)
      | Self::ResponseBodyTooLarge { .. } => Retryability::Fatal,

      Self::DnsError { .. }
      | Self::ConnectionRefused
      | Self::ConnectionTimeout
      | Self::ConnectionTerminated
      | Self::TlsProtocolError
      | Self::FirstByteTimeout
      | Self::BodyReadTimeout
      | Self::Cancelled
      | Self::Internal(_) => Retryability::Transient,
    }
  }

  pub fn is_transient(&self) -> bool {
    self.retryability() == Retryability::Transient
  }

  pub fn is_fatal(&self) -> bool {
    self.retryability() == Retryability::Fatal
  }

  /// Whether this code reports a rejection at submission time, meaning the
  /// request was never sent. Submission after the invocation has ended also
  /// fails synchronously, with [`ErrorCode::Cancelled`].
  pub fn is_send_time(&self) -> bool {
    matches!(
      self,
      Self::InvalidRequest(_) | Self::PolicyDenied { .. } | Self::RequestBodyTooLarge { .. }
    )
  }

  /// Shorthand for an [`ErrorCode::PolicyDenied`] on `authority`.
  pub fn policy_denied(authority: impl Into<String>) -> Self {
    Self::PolicyDenied {
      authority: authority.into(),
    }
  }

  /// Shorthand for an [`ErrorCode::InvalidRequest`].
  pub fn invalid_request(message: impl Into<String>) -> Self {
    Self::InvalidRequest(message.into())
  }
}
