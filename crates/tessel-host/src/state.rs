use tessel_host_config::ConfigCapability;
use tessel_host_http::{HttpCapability, ResponseTable};
use tessel_host_log::LogCapability;
use tessel_world::{
  ErrorCode, FutureIncomingResponse, Imports, Level, OutgoingHandler, OutgoingRequest,
  RequestOptions,
};
use tracing::debug;

/// Host state for one invocation.
///
/// This is what a guest receives as its [`Imports`]. Dropping it closes the
/// invocation's table: pending requests are cancelled and outstanding guest
/// handles report `Reclaimed`.
pub struct HostState {
  pub(crate) http: HttpCapability,
  pub(crate) config: ConfigCapability,
  pub(crate) log: LogCapability,
  pub(crate) table: ResponseTable,
  pub(crate) task_id: String,
  pub(crate) execution_id: String,
}

impl HostState {
  pub fn task_id(&self) -> &str {
    &self.task_id
  }

  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  /// The invocation's table. Closing it ends the invocation early.
  pub fn table(&self) -> &ResponseTable {
    &self.table
  }
}

impl OutgoingHandler for HostState {
  fn handle(
    &self,
    request: OutgoingRequest,
    options: Option<RequestOptions>,
  ) -> Result<FutureIncomingResponse, ErrorCode> {
    self.http.handle(request, options)
  }
}

impl Imports for HostState {
  fn config_get(&self, key: &str) -> Option<String> {
    self.config.get(key).map(str::to_string)
  }

  fn log(&self, level: Level, message: &str) {
    self.log.log(level, message);
  }
}

impl Drop for HostState {
  fn drop(&mut self) {
    let pending = self.table.close();
    if pending > 0 {
      debug!(
        task_id = %self.task_id,
        execution_id = %self.execution_id,
        pending,
        "invocation ended with pending requests"
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;
  use std::sync::Arc;
  use std::time::Duration;

  use bytes::Bytes;
  use tessel_host_http::{HttpHost, HttpPolicy, PreparedRequest, Transport, TransportFuture};
  use tessel_world::{Fields, IncomingResponse, Method, PreconditionError};
  use tokio::runtime::Handle;
  use tokio_util::sync::CancellationToken;
  use url::Url;

  use super::*;
  use crate::Host;

  struct SlowTransport;

  impl Transport for SlowTransport {
    fn send(&self, _request: PreparedRequest, _options: RequestOptions) -> TransportFuture<'_> {
      Box::pin(async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(IncomingResponse {
          status: 200,
          headers: Fields::new(),
          body: Bytes::new(),
        })
      })
    }
  }

  fn host() -> Host {
    let http = HttpHost::new(
      HttpPolicy::allow_hosts(["*"]),
      Arc::new(SlowTransport),
      Handle::current(),
    );
    let config = ConfigCapability::new(HashMap::from([("API_KEY".into(), "secret".into())]));
    Host::new(http, config)
  }

  fn get(url: &str) -> OutgoingRequest {
    OutgoingRequest::from_url(Method::Get, &Url::parse(url).unwrap(), Fields::new()).unwrap()
  }

  #[tokio::test]
  async fn test_imports() {
    let state = host().state("square", "exec-1", CancellationToken::new());
    let imports: &dyn Imports = &state;

    assert_eq!(imports.config_get("API_KEY").as_deref(), Some("secret"));
    assert_eq!(imports.config_get("MISSING"), None);
    imports.log(Level::Info, "hello");
    assert_eq!(state.task_id(), "square");
    assert_eq!(state.execution_id(), "exec-1");
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn test_drop_reclaims_pending_futures() {
    let state = host().state("fetch", "exec-2", CancellationToken::new());
    let table = state.table().clone();

    let mut first = state.handle(get("http://a.test/"), None).unwrap();
    let second = state.handle(get("http://b.test/"), None).unwrap();
    assert_eq!(table.pending(), 2);

    drop(state);
    assert!(table.is_closed());
    assert!(table.is_empty());
    assert!(first.poll());
    assert!(second.subscribe().ready());
    assert_eq!(first.get(), Err(PreconditionError::Reclaimed));
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn test_cancel_token_resolves_in_flight_as_cancelled() {
    let cancel = CancellationToken::new();
    let state = host().state("fetch", "exec-3", cancel.clone());

    let future = state.handle(get("http://a.test/"), None).unwrap();
    cancel.cancel();

    let result = future.wait().await.unwrap();
    assert_eq!(result, Err(ErrorCode::Cancelled));
    assert_eq!(
      state.handle(get("http://a.test/"), None).unwrap_err(),
      ErrorCode::Cancelled
    );
  }
}
