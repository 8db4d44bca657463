//! Task invocation.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tessel_host::Host;
use tessel_world::{Task, TaskRequest, TaskResult};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{Span, error, info, instrument, warn};

use crate::error::TaskExecutionError;

/// Input required to run a task.
#[derive(Debug, Clone)]
pub struct TaskInput {
  /// Name of the task being run.
  pub task_id: String,
  /// Unique ID of this invocation.
  pub execution_id: String,
  /// Payload handed to the task.
  pub request: Bytes,
  /// Timeout in milliseconds. Falls back to the executor default.
  pub timeout_ms: Option<u64>,
}

/// Result of a finished invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRun {
  pub task_id: String,
  pub execution_id: String,
  /// What the task returned, success or its own error message.
  pub result: TaskResult,
}

/// Runs task invocations against a shared [`Host`].
pub struct TaskExecutor {
  host: Host,
  default_timeout_ms: Option<u64>,
}

impl TaskExecutor {
  pub fn new(host: Host) -> Self {
    Self {
      host,
      default_timeout_ms: None,
    }
  }

  /// Time limit for inputs that do not set their own.
  pub fn with_default_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
    self.default_timeout_ms = timeout_ms;
    self
  }

  /// Run one invocation of `task`.
  ///
  /// Every request the task still has in flight when this returns is
  /// cancelled, whether the task finished, timed out or was cancelled.
  #[instrument(
    name = "task_execute",
    skip(self, task, input, cancel),
    fields(
      task_id = %input.task_id,
      execution_id = %input.execution_id,
    )
  )]
  pub async fn execute(
    &self,
    task: Arc<dyn Task>,
    input: TaskInput,
    cancel: CancellationToken,
  ) -> Result<TaskRun, TaskExecutionError> {
    info!(request_bytes = input.request.len(), "task started");

    let result = self.execute_inner(task, &input, cancel).await;

    match &result {
      Ok(TaskRun { result: Ok(output), .. }) => {
        info!(output_bytes = output.len(), "task completed");
      }
      Ok(TaskRun {
        result: Err(message),
        ..
      }) => {
        warn!(error = %message, "task returned error");
      }
      Err(e) => {
        error!(error = %e, "task failed");
      }
    }

    result
  }

  async fn execute_inner(
    &self,
    task: Arc<dyn Task>,
    input: &TaskInput,
    cancel: CancellationToken,
  ) -> Result<TaskRun, TaskExecutionError> {
    if cancel.is_cancelled() {
      return Err(TaskExecutionError::Cancelled);
    }

    let invocation = cancel.child_token();
    let state = self
      .host
      .state(&input.task_id, &input.execution_id, invocation.clone());
    let table = state.table().clone();

    let request = TaskRequest::new(input.request.clone());
    let span = Span::current();
    let mut guest = tokio::task::spawn_blocking(move || {
      let _entered = span.enter();
      let result = task.run_task(&state, request);
      drop(state);
      result
    });

    let timeout_ms = input.timeout_ms.or(self.default_timeout_ms);
    let deadline = async {
      match timeout_ms {
        Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        None => std::future::pending().await,
      }
    };

    let outcome = tokio::select! {
      joined = &mut guest => joined.map_err(trapped),
      _ = cancel.cancelled() => Err(TaskExecutionError::Cancelled),
      _ = deadline => Err(TaskExecutionError::TimedOut {
        timeout_ms: timeout_ms.unwrap_or_default(),
      }),
    };

    // The guest thread cannot be stopped, but it loses every capability.
    invocation.cancel();
    let reclaimed = table.close();
    if outcome.is_err() && reclaimed > 0 {
      warn!(reclaimed, "abandoned guest left requests in flight");
    }

    Ok(TaskRun {
      task_id: input.task_id.clone(),
      execution_id: input.execution_id.clone(),
      result: outcome?,
    })
  }
}

fn trapped(error: JoinError) -> TaskExecutionError {
  if error.is_panic() {
    TaskExecutionError::Trapped {
      message: panic_message(error.into_panic()),
    }
  } else {
    TaskExecutionError::Runtime {
      message: error.to_string(),
    }
  }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "task panicked".to_string()
  }
}
