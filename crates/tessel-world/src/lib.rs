//! The contract between tessel guests and their host.
//!
//! This crate defines:
//! - the [`Task`] interface guests implement and the [`Imports`] they receive
//! - the outgoing-request types and [`OutgoingHandler`] capability
//! - host-resolved futures ([`HostFuture`]), the per-invocation
//!   [`ResourceTable`] backing them, and [`Pollable`] readiness tokens
//! - the transport [`ErrorCode`] taxonomy
//! - checked `Result`/`Option` extraction
//!
//! It knows nothing about how the host performs I/O; see `tessel-host-http`.

mod error_code;
mod future;
mod http;
mod outcome;
mod poll;
mod table;
mod task;

pub use error_code::{ErrorCode, Retryability};
pub use future::{FutureIncomingResponse, HostFuture};
pub use http::{
  Fields, HeaderError, IncomingResponse, Method, OutgoingHandler, OutgoingRequest, RequestOptions,
  RequestParts, Scheme,
};
pub use outcome::{OptionExt, PreconditionError, ResultExt};
pub use poll::{Pollable, WaitReady, poll};
pub use table::{ResourceId, ResourceTable, Resolver};
pub use task::{Imports, Level, Task, TaskRequest, TaskResult};
