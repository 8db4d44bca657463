//! Squares an integer.

use serde::{Deserialize, Serialize};
use tessel_world::{Imports, Task, TaskRequest, TaskResult};

/// Fields other than `x` are ignored.
#[derive(Debug, Deserialize)]
struct SquareInput {
  x: u64,
}

#[derive(Debug, Serialize)]
struct SquareOutput {
  y: u64,
}

/// `{"x": n}` in, `{"y": n * n}` out, for unsigned `n`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Square;

impl Task for Square {
  fn run_task(&self, _host: &dyn Imports, request: TaskRequest) -> TaskResult {
    let input: SquareInput =
      serde_json::from_slice(request.as_bytes()).map_err(|e| format!("invalid input: {e}"))?;

    let y = input
      .x
      .checked_mul(input.x)
      .ok_or_else(|| format!("{} squared does not fit in an unsigned 64-bit integer", input.x))?;

    serde_json::to_vec(&SquareOutput { y }).map_err(|e| format!("failed to encode output: {e}"))
  }
}
