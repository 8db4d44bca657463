//! Task execution errors.

/// Why an invocation produced no result.
///
/// A task that returns `Err` is not an execution error; its message is
/// carried in [`crate::TaskRun::result`].
#[derive(Debug, thiserror::Error)]
pub enum TaskExecutionError {
  /// Cancelled before or while the task ran.
  #[error("task cancelled")]
  Cancelled,

  /// The task exceeded its time limit.
  #[error("task timed out after {timeout_ms}ms")]
  TimedOut { timeout_ms: u64 },

  /// The task panicked.
  #[error("task trapped: {message}")]
  Trapped { message: String },

  /// The task thread could not be joined.
  #[error("task runtime error: {message}")]
  Runtime { message: String },
}
