use tessel_config::HostConfig;
use tessel_host_config::ConfigCapability;
use tessel_host_http::{HttpHost, ResponseTable};
use tessel_host_log::LogCapability;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::error::HostError;
use crate::state::HostState;

/// Capabilities shared by every invocation.
#[derive(Clone)]
pub struct Host {
  http: HttpHost,
  config: ConfigCapability,
}

impl Host {
  pub fn new(http: HttpHost, config: ConfigCapability) -> Self {
    Self { http, config }
  }

  /// Build with the reqwest transport. Requests run on `runtime`.
  pub fn from_config(config: &HostConfig, runtime: Handle) -> Result<Self, HostError> {
    let http = HttpHost::from_config(&config.http, runtime)?;
    Ok(Self::new(http, ConfigCapability::new(config.env.clone())))
  }

  pub fn http(&self) -> &HttpHost {
    &self.http
  }

  pub fn config(&self) -> &ConfigCapability {
    &self.config
  }

  /// Fresh state for one invocation. Cancelling `cancel` cancels every
  /// request the invocation has in flight.
  pub fn state(
    &self,
    task_id: impl Into<String>,
    execution_id: impl Into<String>,
    cancel: CancellationToken,
  ) -> HostState {
    let task_id = task_id.into();
    let execution_id = execution_id.into();
    let table = ResponseTable::with_cancellation(cancel);

    HostState {
      http: self.http.bind(table.clone()),
      config: self.config.clone(),
      log: LogCapability::new(task_id.clone(), execution_id.clone()),
      table,
      task_id,
      execution_id,
    }
  }
}
