//! Guest-side helpers for tessel tasks.
//!
//! Thin conveniences over the raw capability in `tessel-world`:
//!
//! - [`Request`] and [`Response`] builders with JSON support
//! - [`send`] blocks on one request, [`send_all`] waits on many at once
//! - [`send_async`] and [`block_on`] for async-style guest code
//! - [`RetryPolicy`] resubmits on transient errors
//!
//! ```ignore
//! let response = tessel_guest::send(host, &Request::get("https://api.example.com/price"))?;
//! let price: Price = response.json()?;
//! ```

mod error;
mod request;
mod retry;
mod send;

pub use error::GuestError;
pub use request::{Request, Response};
pub use retry::RetryPolicy;
pub use send::{block_on, send, send_all, send_async, send_with_options};
