//! Shared host state for tessel task execution.
//!
//! A [`Host`] is built once from configuration. Each invocation gets a fresh
//! [`HostState`] from it: its own resource table and the capabilities bound
//! to that table. Dropping the state ends the invocation and reclaims every
//! future still pending.

mod error;
mod host;
mod state;

pub use error::HostError;
pub use host::Host;
pub use state::HostState;
