//! HTTP client host capability with policy enforcement.
//!
//! [`HttpCapability`] implements [`tessel_world::OutgoingHandler`]: it
//! validates each request synchronously against its shape and the
//! [`HttpPolicy`], then runs the exchange on the host's tokio runtime through
//! a [`Transport`] and resolves the guest's future when it finishes.
//!
//! The capability never retries. Retrying transient failures is left to the
//! guest.

mod capability;
mod client;
mod error;
mod policy;
mod transport;

pub use capability::{HttpCapability, HttpHost, ResponseTable};
pub use client::ReqwestTransport;
pub use error::HttpHostError;
pub use policy::HttpPolicy;
pub use transport::{PreparedRequest, Transport, TransportFuture};
