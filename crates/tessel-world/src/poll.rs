//! Readiness tokens and the wait-any primitive.

use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll, Waker};

use futures::executor::block_on;
use futures::future::poll_fn;

use crate::table::{ResourceId, Watch};

/// A readiness token for a host resource.
///
/// Holds only a weak reference, so it never keeps the resource alive. A
/// token whose resource has been reclaimed reports ready, which lets wait
/// loops finish; the owning handle then reports the reclamation.
#[derive(Clone)]
pub struct Pollable {
  watch: Weak<dyn Watch>,
  id: ResourceId,
}

impl Pollable {
  pub(crate) fn new(watch: Weak<dyn Watch>, id: ResourceId) -> Self {
    Self { watch, id }
  }

  pub fn id(&self) -> ResourceId {
    self.id
  }

  /// Whether the resource is ready. Never blocks.
  pub fn ready(&self) -> bool {
    match self.watch.upgrade() {
      Some(watch) => watch.is_ready(self.id),
      None => true,
    }
  }

  /// Block the calling thread until ready.
  pub fn block(&self) {
    poll(&[self]);
  }

  /// Wait until ready without blocking the thread.
  pub fn wait(&self) -> WaitReady<'_> {
    WaitReady { pollable: self }
  }

  /// Register a waker. Returns `true` if already ready.
  fn register(&self, waker: &Waker) -> bool {
    match self.watch.upgrade() {
      Some(watch) => watch.register(self.id, waker),
      None => true,
    }
  }

  fn unregister(&self, waker: &Waker) {
    if let Some(watch) = self.watch.upgrade() {
      watch.unregister(self.id, waker);
    }
  }
}

impl std::fmt::Debug for Pollable {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Pollable")
      .field("id", &self.id)
      .field("ready", &self.ready())
      .finish()
  }
}

/// Future returned by [`Pollable::wait`].
#[must_use = "futures do nothing unless awaited"]
pub struct WaitReady<'a> {
  pollable: &'a Pollable,
}

impl Future for WaitReady<'_> {
  type Output = ();

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
    if self.pollable.register(cx.waker()) {
      Poll::Ready(())
    } else {
      Poll::Pending
    }
  }
}

/// Block until at least one pollable is ready.
///
/// Returns the indices of every ready member, in ascending order. Pollables
/// may come from unrelated resources. Only the calling thread blocks, and it
/// parks rather than spins. An empty list returns immediately.
///
/// Not for use inside async code; await [`Pollable::wait`] there instead.
pub fn poll(pollables: &[&Pollable]) -> Vec<usize> {
  if pollables.is_empty() {
    return Vec::new();
  }

  let mut registered: Option<Waker> = None;
  let ready = block_on(poll_fn(|cx| {
    let ready = ready_indices(pollables);
    if !ready.is_empty() {
      return Poll::Ready(ready);
    }

    let mut raced = false;
    for pollable in pollables {
      raced |= pollable.register(cx.waker());
    }
    if registered.as_ref().is_none_or(|w| !w.will_wake(cx.waker())) {
      registered = Some(cx.waker().clone());
    }

    // A member became ready between the scan and registration.
    if raced {
      Poll::Ready(ready_indices(pollables))
    } else {
      Poll::Pending
    }
  }));

  // Members still pending keep no wake-up for a waiter that has left.
  if let Some(waker) = registered {
    for pollable in pollables {
      pollable.unregister(&waker);
    }
  }
  ready
}

fn ready_indices(pollables: &[&Pollable]) -> Vec<usize> {
  pollables
    .iter()
    .enumerate()
    .filter(|(_, pollable)| pollable.ready())
    .map(|(index, _)| index)
    .collect()
}
