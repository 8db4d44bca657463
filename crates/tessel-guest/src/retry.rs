use std::time::Duration;

use tessel_world::{ErrorCode, OutgoingHandler, RequestOptions};

use crate::error::GuestError;
use crate::request::{Request, Response};

/// Resubmits a request while it fails with a transient error.
///
/// Every attempt builds a fresh outgoing request. Fatal errors,
/// submission-time rejections and [`ErrorCode::Cancelled`] are returned
/// straight away: once the invocation has ended no attempt can succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first. Zero is treated as one.
  pub max_attempts: u32,
  /// Pause before the second attempt, doubled for each one after.
  pub backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      backoff: Duration::from_millis(100),
    }
  }
}

impl RetryPolicy {
  pub fn new(max_attempts: u32, backoff: Duration) -> Self {
    Self {
      max_attempts,
      backoff,
    }
  }

  /// No retries.
  pub fn none() -> Self {
    Self::new(1, Duration::ZERO)
  }

  pub fn send<H: OutgoingHandler + ?Sized>(
    &self,
    host: &H,
    request: &Request,
  ) -> Result<Response, GuestError> {
    self.send_with_options(host, request, None)
  }

  pub fn send_with_options<H: OutgoingHandler + ?Sized>(
    &self,
    host: &H,
    request: &Request,
    options: Option<RequestOptions>,
  ) -> Result<Response, GuestError> {
    let attempts = self.max_attempts.max(1);
    let mut delay = self.backoff;
    let mut attempt = 1;
    loop {
      let future = host.handle(request.to_outgoing()?, options)?;
      match future.block()? {
        Ok(response) => return Ok(response.into()),
        Err(code) if retryable(&code) && attempt < attempts => {
          if !delay.is_zero() {
            std::thread::sleep(delay);
          }
          delay = delay.saturating_mul(2);
          attempt += 1;
        }
        Err(code) => return Err(code.into()),
      }
    }
  }
}

fn retryable(code: &ErrorCode) -> bool {
  code.is_transient() && *code != ErrorCode::Cancelled
}
