//! Task execution for tessel.
//!
//! [`TaskExecutor`] runs one invocation of a [`tessel_world::Task`]: it gives
//! the guest fresh host state, runs it on a blocking thread so the guest may
//! block on its pollables, and enforces the time limit and cancellation.

mod error;
mod executor;

pub use error::TaskExecutionError;
pub use executor::{TaskExecutor, TaskInput, TaskRun};
