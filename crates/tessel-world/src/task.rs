//! The task-execution interface implemented by guests.

use bytes::Bytes;

use crate::http::OutgoingHandler;

/// Payload handed to one invocation of [`Task::run_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
  pub request: Bytes,
}

impl TaskRequest {
  pub fn new(request: impl Into<Bytes>) -> Self {
    Self {
      request: request.into(),
    }
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.request
  }
}

/// Outcome of a task: a finished output payload, or a diagnostic message.
pub type TaskResult = Result<Vec<u8>, String>;

/// Severity of a guest log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
  Trace,
  Debug,
  Info,
  Warn,
  Error,
}

/// Capabilities the host grants to one invocation.
///
/// Passed explicitly to [`Task::run_task`]; a guest has no other route to
/// the network, configuration or the host log.
pub trait Imports: OutgoingHandler {
  /// Read a configuration value granted to this task.
  fn config_get(&self, key: &str) -> Option<String>;

  /// Write a record to the host log.
  fn log(&self, level: Level, message: &str);
}

/// A guest task.
///
/// `run_task` reports every failure through its return value. Futures
/// created through `host` must be resolved or dropped before returning; any
/// still pending when the invocation ends are cancelled by the host.
pub trait Task: Send + Sync {
  fn run_task(&self, host: &dyn Imports, request: TaskRequest) -> TaskResult;
}
