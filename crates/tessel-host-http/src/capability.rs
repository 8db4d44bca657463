use std::sync::Arc;
use std::time::Duration;

use tessel_config::HttpConfig;
use reqwest::header::{HeaderName, HeaderValue};
use tessel_world::{
  ErrorCode, Fields, FutureIncomingResponse, IncomingResponse, OutgoingHandler, OutgoingRequest,
  RequestOptions, ResourceTable, Scheme,
};
use tokio::runtime::Handle;
use tracing::{Instrument, debug, debug_span};
use url::Url;

use crate::client::ReqwestTransport;
use crate::error::HttpHostError;
use crate::policy::HttpPolicy;
use crate::transport::{PreparedRequest, Transport};

/// Slots backing [`FutureIncomingResponse`]s.
pub type ResponseTable = ResourceTable<Result<IncomingResponse, ErrorCode>>;

/// Shared HTTP setup: policy, default options, transport and the runtime
/// requests run on. Cheap to clone; bind it to an invocation's table with
/// [`HttpHost::bind`].
#[derive(Clone)]
pub struct HttpHost {
  policy: Arc<HttpPolicy>,
  defaults: RequestOptions,
  transport: Arc<dyn Transport>,
  runtime: Handle,
}

impl HttpHost {
  pub fn new(policy: HttpPolicy, transport: Arc<dyn Transport>, runtime: Handle) -> Self {
    Self {
      policy: Arc::new(policy),
      defaults: RequestOptions::default(),
      transport,
      runtime,
    }
  }

  /// Build from configuration with the reqwest transport.
  pub fn from_config(config: &HttpConfig, runtime: Handle) -> Result<Self, HttpHostError> {
    let transport = Arc::new(ReqwestTransport::new()?);
    let host = Self::new(HttpPolicy::from_config(config), transport, runtime);
    Ok(host.with_defaults(default_options(config)))
  }

  /// Options applied where a request leaves a field unset.
  pub fn with_defaults(mut self, defaults: RequestOptions) -> Self {
    self.defaults = defaults;
    self
  }

  pub fn policy(&self) -> &HttpPolicy {
    &self.policy
  }

  pub fn bind(&self, table: ResponseTable) -> HttpCapability {
    HttpCapability {
      host: self.clone(),
      table,
    }
  }
}

fn default_options(config: &HttpConfig) -> RequestOptions {
  RequestOptions {
    connect_timeout: config.connect_timeout_ms.map(Duration::from_millis),
    first_byte_timeout: config.first_byte_timeout_ms.map(Duration::from_millis),
    between_bytes_timeout: config.between_bytes_timeout_ms.map(Duration::from_millis),
  }
}

/// The outgoing-request capability for one invocation.
pub struct HttpCapability {
  host: HttpHost,
  table: ResponseTable,
}

impl HttpCapability {
  pub fn table(&self) -> &ResponseTable {
    &self.table
  }

  /// Validate a request against its own shape and the policy.
  ///
  /// Checks run in a fixed order so the first problem found is reported:
  /// scheme, authority, path, headers, body size, options, then policy.
  fn prepare(
    &self,
    request: OutgoingRequest,
    options: Option<RequestOptions>,
  ) -> Result<(PreparedRequest, RequestOptions), ErrorCode> {
    let policy = &self.host.policy;

    let scheme = match request.scheme() {
      None => return Err(ErrorCode::invalid_request("missing scheme")),
      Some(Scheme::Other(name)) => {
        return Err(ErrorCode::invalid_request(format!("unsupported scheme: {name}")));
      }
      Some(scheme) => scheme.clone(),
    };

    let authority = request
      .authority()
      .ok_or_else(|| ErrorCode::invalid_request("missing authority"))?
      .to_string();
    let (host, port) = match request.host_and_port() {
      Some(parsed) => parsed?,
      None => return Err(ErrorCode::invalid_request("missing authority")),
    };
    let port = port.unwrap_or(match scheme {
      Scheme::Https => 443,
      _ => 80,
    });

    let url = Url::parse(&format!(
      "{scheme}://{authority}{}",
      request.path_with_query()
    ))
    .map_err(|e| ErrorCode::invalid_request(format!("invalid path: {e}")))?;

    check_headers(request.headers())?;

    if let Some(limit) = policy.max_request_body_bytes() {
      if request.body().len() as u64 > limit {
        return Err(ErrorCode::RequestBodyTooLarge { limit });
      }
    }

    let options = options.unwrap_or_default();
    options.validate()?;

    if !policy.permits(&scheme, &host, port) {
      return Err(ErrorCode::policy_denied(authority));
    }

    let parts = request.into_parts();
    let prepared = PreparedRequest {
      method: parts.method,
      url,
      headers: parts.headers,
      body: parts.body,
      response_limit: policy.max_response_body_bytes(),
    };
    Ok((prepared, options.merge_defaults(&self.host.defaults)))
  }
}

/// Every header must be one the transport can send as-is.
fn check_headers(headers: &Fields) -> Result<(), ErrorCode> {
  for (name, value) in headers.entries() {
    if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_bytes(value).is_err()
    {
      return Err(ErrorCode::invalid_request(format!("invalid header: {name}")));
    }
  }
  Ok(())
}

impl OutgoingHandler for HttpCapability {
  /// Returns as soon as the request is validated. The exchange runs on the
  /// host runtime and resolves the returned future exactly once. Once the
  /// invocation has ended, submission fails with [`ErrorCode::Cancelled`].
  fn handle(
    &self,
    request: OutgoingRequest,
    options: Option<RequestOptions>,
  ) -> Result<FutureIncomingResponse, ErrorCode> {
    let (prepared, options) = self.prepare(request, options).inspect_err(|e| {
      debug!(error = %e, "outgoing request rejected");
    })?;

    let (future, resolver) = self.table.push().map_err(|_| ErrorCode::Cancelled)?;

    let span = debug_span!(
      "outgoing_request",
      method = %prepared.method,
      url = %prepared.url,
    );
    let transport = Arc::clone(&self.host.transport);
    self.host.runtime.spawn(
      async move {
        let cancel = resolver.cancellation().clone();
        let result = tokio::select! {
          _ = cancel.cancelled() => Err(ErrorCode::Cancelled),
          result = transport.send(prepared, options) => result,
        };

        match &result {
          Ok(response) => debug!(status = response.status, "request completed"),
          Err(e) => debug!(error = %e, "request failed"),
        }
        if !resolver.resolve(result) {
          debug!("response discarded, future already reclaimed");
        }
      }
      .instrument(span),
    );

    Ok(future)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

  use bytes::Bytes;
  use tessel_world::{Method, PreconditionError};

  use super::*;
  use crate::transport::TransportFuture;

  /// Answers every request with 200 after `delay`.
  struct DelayedTransport {
    delay: Duration,
    calls: AtomicUsize,
  }

  impl DelayedTransport {
    fn new(delay: Duration) -> Arc<Self> {
      Arc::new(Self {
        delay,
        calls: AtomicUsize::new(0),
      })
    }
  }

  impl Transport for DelayedTransport {
    fn send(&self, request: PreparedRequest, _options: RequestOptions) -> TransportFuture<'_> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let delay = self.delay;
      Box::pin(async move {
        tokio::time::sleep(delay).await;
        Ok(IncomingResponse {
          status: 200,
          headers: Fields::new(),
          body: Bytes::from(request.url.to_string()),
        })
      })
    }
  }

  /// Never answers; records when its in-flight work is dropped.
  struct HangingTransport {
    dropped: Arc<AtomicBool>,
  }

  struct DropFlag(Arc<AtomicBool>);

  impl Drop for DropFlag {
    fn drop(&mut self) {
      self.0.store(true, Ordering::SeqCst);
    }
  }

  impl Transport for HangingTransport {
    fn send(&self, _request: PreparedRequest, _options: RequestOptions) -> TransportFuture<'_> {
      let flag = DropFlag(Arc::clone(&self.dropped));
      Box::pin(async move {
        let _flag = flag;
        std::future::pending::<()>().await;
        Err(ErrorCode::Internal("unreachable".into()))
      })
    }
  }

  fn capability(policy: HttpPolicy, transport: Arc<dyn Transport>) -> HttpCapability {
    HttpHost::new(policy, transport, Handle::current()).bind(ResponseTable::new())
  }

  fn get(url: &str) -> OutgoingRequest {
    OutgoingRequest::from_url(Method::Get, &Url::parse(url).unwrap(), Fields::new()).unwrap()
  }

  #[tokio::test]
  async fn test_policy_denied_creates_no_slot() {
    let transport = DelayedTransport::new(Duration::ZERO);
    let cap = capability(HttpPolicy::allow_hosts(["allowed.test"]), transport.clone());

    let err = cap.handle(get("https://denied.test/"), None).unwrap_err();
    assert_eq!(err, ErrorCode::policy_denied("denied.test"));
    assert!(err.is_fatal());
    assert!(cap.table().is_empty());
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_port_not_allowed() {
    let policy = HttpPolicy::allow_hosts(["allowed.test"]).with_allowed_ports([443]);
    let cap = capability(policy, DelayedTransport::new(Duration::ZERO));

    let err = cap.handle(get("https://allowed.test:8443/"), None).unwrap_err();
    assert_eq!(err, ErrorCode::policy_denied("allowed.test:8443"));
    assert!(cap.handle(get("https://allowed.test/"), None).is_ok());
  }

  #[tokio::test]
  async fn test_missing_scheme_and_authority() {
    let cap = capability(HttpPolicy::allow_hosts(["*"]), DelayedTransport::new(Duration::ZERO));

    let request = OutgoingRequest::new(Fields::new());
    let err = cap.handle(request, None).unwrap_err();
    assert!(matches!(err, ErrorCode::InvalidRequest(_)));

    let mut request = OutgoingRequest::new(Fields::new());
    request.set_scheme(Some(Scheme::Https)).unwrap();
    let err = cap.handle(request, None).unwrap_err();
    assert!(matches!(err, ErrorCode::InvalidRequest(_)));
    assert!(cap.table().is_empty());
  }

  #[tokio::test]
  async fn test_validation_precedes_policy() {
    let cap = capability(HttpPolicy::deny_all(), DelayedTransport::new(Duration::ZERO));

    let mut request = OutgoingRequest::new(Fields::new());
    request.set_scheme(Some(Scheme::Other("ftp".into()))).unwrap();
    request.set_authority(Some("denied.test")).unwrap();
    let err = cap.handle(request, None).unwrap_err();
    assert!(matches!(err, ErrorCode::InvalidRequest(_)));
  }

  #[tokio::test]
  async fn test_header_control_bytes_rejected_before_submission() {
    let cap = capability(HttpPolicy::allow_hosts(["*"]), DelayedTransport::new(Duration::ZERO));

    for value in ["a\x01b", "a\x1fb", "a\x7f"] {
      assert!(Fields::from_list([("x-trace", value)]).is_err());
      let mut request = get("http://example.test/");
      assert!(request.headers_mut().append("x-trace", value).is_err());
    }
    assert!(cap.table().is_empty());

    // Whatever Fields accepts, the transport accepts too.
    let mut request = get("http://example.test/");
    request.headers_mut().append("x-trace", "tab\tok").unwrap();
    request
      .headers_mut()
      .append("x-trace", b"caf\xe9".as_slice())
      .unwrap();
    assert_eq!(check_headers(request.headers()), Ok(()));
    let _future = cap.handle(request, None).unwrap();
    assert_eq!(cap.table().len(), 1);
  }

  #[tokio::test]
  async fn test_request_body_too_large() {
    let policy = HttpPolicy::allow_hosts(["*"]).with_max_request_body_bytes(4);
    let cap = capability(policy, DelayedTransport::new(Duration::ZERO));

    let mut request = get("http://example.test/upload");
    request.set_body("too long");
    let err = cap.handle(request, None).unwrap_err();
    assert_eq!(err, ErrorCode::RequestBodyTooLarge { limit: 4 });
    assert!(err.is_send_time());
  }

  #[tokio::test]
  async fn test_zero_timeout_rejected() {
    let cap = capability(HttpPolicy::allow_hosts(["*"]), DelayedTransport::new(Duration::ZERO));

    let options = RequestOptions::new().with_first_byte_timeout(Duration::ZERO);
    let err = cap.handle(get("http://example.test/"), Some(options)).unwrap_err();
    assert!(matches!(err, ErrorCode::InvalidRequest(_)));
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn test_submit_returns_pending_then_resolves() {
    let transport = DelayedTransport::new(Duration::from_millis(200));
    let cap = capability(HttpPolicy::allow_hosts(["api.test"]), transport);

    let started = std::time::Instant::now();
    let mut future = cap.handle(get("https://api.test/v1?q=1"), None).unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(!future.poll());
    assert_eq!(future.get(), Ok(None));

    future.subscribe().wait().await;
    let response = future.get().unwrap().unwrap().unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, Bytes::from("https://api.test/v1?q=1"));
    assert_eq!(future.get(), Err(PreconditionError::AlreadyConsumed));
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn test_close_cancels_in_flight_request() {
    let dropped = Arc::new(AtomicBool::new(false));
    let transport = Arc::new(HangingTransport {
      dropped: Arc::clone(&dropped),
    });
    let cap = capability(HttpPolicy::allow_hosts(["*"]), transport);

    let mut future = cap.handle(get("http://slow.test/"), None).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!dropped.load(Ordering::SeqCst));

    assert_eq!(cap.table().close(), 1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(future.get(), Err(PreconditionError::Reclaimed));

    let err = cap.handle(get("http://slow.test/"), None).unwrap_err();
    assert_eq!(err, ErrorCode::Cancelled);
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn test_dropping_future_cancels_request() {
    let dropped = Arc::new(AtomicBool::new(false));
    let transport = Arc::new(HangingTransport {
      dropped: Arc::clone(&dropped),
    });
    let cap = capability(HttpPolicy::allow_hosts(["*"]), transport);

    let future = cap.handle(get("http://slow.test/"), None).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(future);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(dropped.load(Ordering::SeqCst));
    assert!(cap.table().is_empty());
  }
}
