use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use tessel_world::{ErrorCode, Fields, IncomingResponse, Method, RequestOptions};
use url::Url;

/// A request that passed validation and policy, ready to go on the wire.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
  pub method: Method,
  pub url: Url,
  pub headers: Fields,
  pub body: Bytes,
  /// Largest response body the transport may buffer.
  pub response_limit: Option<u64>,
}

pub type TransportFuture<'a> =
  Pin<Box<dyn Future<Output = Result<IncomingResponse, ErrorCode>> + Send + 'a>>;

/// Performs the network exchange for one request.
///
/// Implementations honor every timeout set in `options` and report failures
/// as [`ErrorCode`]s. They never retry.
pub trait Transport: Send + Sync {
  fn send(&self, request: PreparedRequest, options: RequestOptions) -> TransportFuture<'_>;
}
