//! Guest handles to values the host will deliver later.

use std::sync::{Arc, Weak};

use crate::error_code::ErrorCode;
use crate::http::IncomingResponse;
use crate::outcome::{OptionExt, PreconditionError};
use crate::poll::Pollable;
use crate::table::{ResourceId, TableInner, Watch};

/// A one-shot, single-consumer handle to a value the host resolves later.
///
/// Starts pending and becomes ready exactly once, driven by the host. Use
/// [`HostFuture::poll`] to check readiness and [`HostFuture::get`] to take the
/// value. Dropping the handle before taking the value abandons it and cancels
/// the host's work.
pub struct HostFuture<T> {
  table: Arc<TableInner<T>>,
  watch: Weak<dyn Watch>,
  id: ResourceId,
}

/// Response to an outgoing request, once the host has one.
pub type FutureIncomingResponse = HostFuture<Result<IncomingResponse, ErrorCode>>;

impl<T> HostFuture<T> {
  pub(crate) fn new(table: Arc<TableInner<T>>, watch: Weak<dyn Watch>, id: ResourceId) -> Self {
    Self { table, watch, id }
  }

  pub fn id(&self) -> ResourceId {
    self.id
  }

  /// Whether the value is ready. Never blocks and has no side effects.
  pub fn poll(&self) -> bool {
    self.subscribe().ready()
  }

  /// Take the value.
  ///
  /// Returns `Ok(None)` while pending and `Ok(Some(_))` once. Reading again
  /// fails with [`PreconditionError::AlreadyConsumed`]; reading after the host
  /// reclaimed the slot fails with [`PreconditionError::Reclaimed`].
  pub fn get(&mut self) -> Result<Option<T>, PreconditionError> {
    self.table.take(self.id)
  }

  /// A readiness token for this future. It does not keep the future alive.
  pub fn subscribe(&self) -> Pollable {
    Pollable::new(self.watch.clone(), self.id)
  }

  /// Block the calling thread until ready, then take the value.
  pub fn block(mut self) -> Result<T, PreconditionError> {
    self.subscribe().block();
    self.get()?.extract_some()
  }

  /// Wait without blocking the thread, then take the value.
  pub async fn wait(mut self) -> Result<T, PreconditionError> {
    self.subscribe().wait().await;
    self.get()?.extract_some()
  }
}

impl<T> Drop for HostFuture<T> {
  fn drop(&mut self) {
    self.table.abandon(self.id);
  }
}

impl<T> std::fmt::Debug for HostFuture<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("HostFuture").field("id", &self.id).finish()
  }
}
