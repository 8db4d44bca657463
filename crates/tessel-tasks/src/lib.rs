//! Built-in tessel tasks.
//!
//! - [`Square`]: `{"x": n}` to `{"y": n²}`
//! - [`Fetch`]: one HTTP request through the outgoing-request capability
//!
//! [`TaskRegistry::builtin`] holds both under those names.

mod fetch;
mod registry;
mod square;

pub use fetch::{AUTHORIZATION_KEY, Fetch, MAX_RETRIES};
pub use registry::{RegistryError, TaskRegistry};
pub use square::Square;
