//! Logging host capability.
//!
//! Guest log records become `tracing` events under the `tessel::guest`
//! target, tagged with the invocation they came from.

use tessel_world::Level;
use tracing::{debug, error, info, trace, warn};

/// Forwards one invocation's guest log records to `tracing`.
#[derive(Debug, Clone)]
pub struct LogCapability {
  task_id: String,
  execution_id: String,
}

impl LogCapability {
  pub fn new(task_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
    Self {
      task_id: task_id.into(),
      execution_id: execution_id.into(),
    }
  }

  pub fn log(&self, level: Level, message: &str) {
    let task_id = self.task_id.as_str();
    let execution_id = self.execution_id.as_str();
    match level {
      Level::Trace => trace!(target: "tessel::guest", task_id, execution_id, "{message}"),
      Level::Debug => debug!(target: "tessel::guest", task_id, execution_id, "{message}"),
      Level::Info => info!(target: "tessel::guest", task_id, execution_id, "{message}"),
      Level::Warn => warn!(target: "tessel::guest", task_id, execution_id, "{message}"),
      Level::Error => error!(target: "tessel::guest", task_id, execution_id, "{message}"),
    }
  }
}
