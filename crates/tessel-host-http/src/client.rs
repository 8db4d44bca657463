use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use reqwest::Client;
use tessel_world::{ErrorCode, Fields, IncomingResponse, RequestOptions};
use tracing::trace;

use crate::error::HttpHostError;
use crate::transport::{PreparedRequest, Transport, TransportFuture};

/// [`Transport`] backed by `reqwest`.
///
/// Redirects are not followed, so every hop a guest makes goes through
/// policy. reqwest only sets a connect timeout on the client, so requested
/// timeouts are rounded up to [`CONNECT_TIMEOUT_STEPS_MS`] and one client is
/// cached per step.
pub struct ReqwestTransport {
  clients: Mutex<HashMap<Option<Duration>, Client>>,
}

impl ReqwestTransport {
  pub fn new() -> Result<Self, HttpHostError> {
    let default = build_client(None)?;
    Ok(Self {
      clients: Mutex::new(HashMap::from([(None, default)])),
    })
  }

  fn client_for(&self, connect_timeout: Option<Duration>) -> Result<Client, ErrorCode> {
    let connect_timeout = connect_step(connect_timeout);
    let mut clients = self.clients.lock();
    if let Some(client) = clients.get(&connect_timeout) {
      return Ok(client.clone());
    }
    let client =
      build_client(connect_timeout).map_err(|e| ErrorCode::Internal(e.to_string()))?;
    clients.insert(connect_timeout, client.clone());
    Ok(client)
  }

  async fn exchange(
    &self,
    request: PreparedRequest,
    options: RequestOptions,
  ) -> Result<IncomingResponse, ErrorCode> {
    let client = self.client_for(options.connect_timeout)?;
    let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
      .map_err(|_| ErrorCode::Internal(format!("client rejected method: {}", request.method)))?;

    let mut builder = client.request(method, request.url);
    for (name, value) in request.headers.entries() {
      builder = builder.header(name, value);
    }
    let pending = builder.body(request.body).send();

    let sent = match options.first_byte_timeout {
      Some(timeout) => tokio::time::timeout(timeout, pending)
        .await
        .map_err(|_| ErrorCode::FirstByteTimeout)?,
      None => pending.await,
    };
    let mut response = sent.map_err(|e| classify(&e))?;

    let limit = request.response_limit;
    if let (Some(limit), Some(length)) = (limit, response.content_length()) {
      if length > limit {
        return Err(ErrorCode::ResponseBodyTooLarge { limit });
      }
    }

    let status = response.status().as_u16();
    let mut headers = Fields::new();
    for (name, value) in response.headers() {
      if let Err(e) = headers.append_received(name.as_str(), value.as_bytes()) {
        trace!(error = %e, "dropping response header");
      }
    }

    let mut body = BytesMut::new();
    loop {
      let next = response.chunk();
      let chunk = match options.between_bytes_timeout {
        Some(timeout) => tokio::time::timeout(timeout, next)
          .await
          .map_err(|_| ErrorCode::BodyReadTimeout)?,
        None => next.await,
      };
      let Some(chunk) = chunk.map_err(|e| classify(&e))? else {
        break;
      };
      if let Some(limit) = limit {
        if (body.len() + chunk.len()) as u64 > limit {
          return Err(ErrorCode::ResponseBodyTooLarge { limit });
        }
      }
      body.extend_from_slice(&chunk);
    }

    Ok(IncomingResponse {
      status,
      headers,
      body: body.freeze(),
    })
  }
}

impl Transport for ReqwestTransport {
  fn send(&self, request: PreparedRequest, options: RequestOptions) -> TransportFuture<'_> {
    Box::pin(self.exchange(request, options))
  }
}

/// Connect timeouts clients are built with. Anything above the last step
/// runs without a connect timeout; the first-byte timeout still applies.
pub const CONNECT_TIMEOUT_STEPS_MS: &[u64] =
  &[100, 250, 500, 1_000, 2_000, 5_000, 10_000, 30_000, 60_000];

fn connect_step(timeout: Option<Duration>) -> Option<Duration> {
  let timeout = timeout?;
  CONNECT_TIMEOUT_STEPS_MS
    .iter()
    .map(|ms| Duration::from_millis(*ms))
    .find(|step| *step >= timeout)
}

fn build_client(connect_timeout: Option<Duration>) -> Result<Client, HttpHostError> {
  let mut builder = Client::builder().redirect(reqwest::redirect::Policy::none());
  if let Some(timeout) = connect_timeout {
    builder = builder.connect_timeout(timeout);
  }
  Ok(builder.build()?)
}

/// Map a reqwest failure onto the transport taxonomy.
///
/// Requests are validated before they reach reqwest, so a builder failure is
/// a host fault rather than a bad request.
pub(crate) fn classify(error: &reqwest::Error) -> ErrorCode {
  if error.is_builder() {
    return ErrorCode::Internal(format!("request rejected by client: {error}"));
  }
  if error.is_timeout() {
    return if error.is_connect() {
      ErrorCode::ConnectionTimeout
    } else {
      ErrorCode::FirstByteTimeout
    };
  }
  if let Some(code) = error.source().and_then(classify_chain) {
    return code;
  }

  if error.is_connect() || error.is_body() {
    ErrorCode::ConnectionTerminated
  } else if error.is_request() || error.is_decode() {
    ErrorCode::HttpProtocolError(error.to_string())
  } else {
    ErrorCode::Internal(error.to_string())
  }
}

/// reqwest hides most causes behind its source chain. Walk it for io errors
/// first, then match on the messages hyper and rustls use.
fn classify_chain(cause: &(dyn Error + 'static)) -> Option<ErrorCode> {
  let mut messages = Vec::new();
  let mut source = Some(cause);
  while let Some(cause) = source {
    if let Some(io) = cause.downcast_ref::<std::io::Error>() {
      if let Some(code) = classify_io(io) {
        return Some(code);
      }
    }
    messages.push(cause.to_string().to_ascii_lowercase());
    source = cause.source();
  }

  let mentions = |needle: &str| messages.iter().any(|m| m.contains(needle));
  if mentions("dns error") || mentions("failed to lookup address") {
    let info = messages.last().cloned();
    return Some(ErrorCode::DnsError { rcode: None, info });
  }
  if mentions("certificate") {
    return Some(ErrorCode::TlsCertificateError);
  }
  if mentions("tls") || mentions("handshake") {
    return Some(ErrorCode::TlsProtocolError);
  }
  if mentions("connection closed") || mentions("incomplete message") {
    return Some(ErrorCode::ConnectionTerminated);
  }
  None
}

fn classify_io(error: &std::io::Error) -> Option<ErrorCode> {
  use std::io::ErrorKind;

  match error.kind() {
    ErrorKind::ConnectionRefused => Some(ErrorCode::ConnectionRefused),
    ErrorKind::TimedOut => Some(ErrorCode::ConnectionTimeout),
    ErrorKind::ConnectionReset
    | ErrorKind::ConnectionAborted
    | ErrorKind::BrokenPipe
    | ErrorKind::UnexpectedEof => Some(ErrorCode::ConnectionTerminated),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_classify_io() {
    let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
    assert_eq!(classify_io(&refused), Some(ErrorCode::ConnectionRefused));

    let reset = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
    assert_eq!(classify_io(&reset), Some(ErrorCode::ConnectionTerminated));

    let other = std::io::Error::other("boom");
    assert_eq!(classify_io(&other), None);
  }

  /// A source chain of plain messages, outermost first.
  #[derive(Debug)]
  struct Cause {
    message: &'static str,
    source: Option<Box<dyn Error + Send + Sync>>,
  }

  impl std::fmt::Display for Cause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.write_str(self.message)
    }
  }

  impl Error for Cause {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
      self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
  }

  fn chain(messages: &[&'static str]) -> Cause {
    let mut source: Option<Box<dyn Error + Send + Sync>> = None;
    for message in messages.iter().skip(1).rev() {
      source = Some(Box::new(Cause {
        message: *message,
        source,
      }));
    }
    Cause {
      message: messages[0],
      source,
    }
  }

  #[test]
  fn test_classify_chain_dns() {
    let error = chain(&[
      "client error (Connect)",
      "dns error",
      "failed to lookup address information: Name or service not known",
    ]);
    assert_eq!(
      classify_chain(&error),
      Some(ErrorCode::DnsError {
        rcode: None,
        info: Some("failed to lookup address information: name or service not known".into()),
      })
    );
  }

  #[test]
  fn test_classify_chain_tls() {
    let certificate = chain(&[
      "client error (Connect)",
      "invalid peer certificate: UnknownIssuer",
    ]);
    assert_eq!(
      classify_chain(&certificate),
      Some(ErrorCode::TlsCertificateError)
    );
    assert!(ErrorCode::TlsCertificateError.is_fatal());

    let handshake = chain(&[
      "client error (Connect)",
      "received fatal alert: HandshakeFailure",
    ]);
    assert_eq!(classify_chain(&handshake), Some(ErrorCode::TlsProtocolError));

    let eof = chain(&["client error (Connect)", "tls handshake eof"]);
    assert_eq!(classify_chain(&eof), Some(ErrorCode::TlsProtocolError));
  }

  #[test]
  fn test_classify_chain_io_before_messages() {
    let error = Cause {
      message: "client error (Connect)",
      source: Some(Box::new(std::io::Error::from(
        std::io::ErrorKind::ConnectionRefused,
      ))),
    };
    assert_eq!(classify_chain(&error), Some(ErrorCode::ConnectionRefused));

    let closed = chain(&["connection closed before message completed"]);
    assert_eq!(
      classify_chain(&closed),
      Some(ErrorCode::ConnectionTerminated)
    );
    assert_eq!(classify_chain(&chain(&["something else"])), None);
  }

  #[test]
  fn test_connect_step_rounds_up() {
    assert_eq!(connect_step(None), None);
    assert_eq!(
      connect_step(Some(Duration::from_millis(1))),
      Some(Duration::from_millis(100))
    );
    assert_eq!(
      connect_step(Some(Duration::from_millis(1_000))),
      Some(Duration::from_secs(1))
    );
    assert_eq!(
      connect_step(Some(Duration::from_millis(1_001))),
      Some(Duration::from_secs(2))
    );
    assert_eq!(connect_step(Some(Duration::from_secs(61))), None);
  }

  #[test]
  fn test_client_cache_is_bounded() {
    let transport = ReqwestTransport::new().unwrap();
    for ms in 1..=200u64 {
      transport
        .client_for(Some(Duration::from_millis(ms * 37)))
        .unwrap();
    }
    assert!(transport.clients.lock().len() <= CONNECT_TIMEOUT_STEPS_MS.len() + 1);

    transport.client_for(Some(Duration::from_millis(900))).unwrap();
    transport.client_for(Some(Duration::from_millis(950))).unwrap();
    let len = transport.clients.lock().len();
    transport.client_for(Some(Duration::from_millis(999))).unwrap();
    assert_eq!(transport.clients.lock().len(), len);
  }
}
