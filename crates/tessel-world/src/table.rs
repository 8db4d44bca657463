//! Host-owned table of one-shot future slots.
//!
//! Each invocation gets its own [`ResourceTable`]. A slot is created pending
//! by [`ResourceTable::push`], which hands the guest a [`HostFuture`] and the
//! host a [`Resolver`]. Only the resolver can move the slot to ready, and it
//! is consumed in doing so.

use std::sync::{Arc, Weak};
use std::task::Waker;

use parking_lot::Mutex;
use slab::Slab;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::future::HostFuture;
use crate::outcome::PreconditionError;

/// Key of a slot. The generation keeps stale handles from matching a reused
/// slab index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId {
  index: usize,
  generation: u64,
}

enum SlotState<T> {
  Pending,
  Ready(T),
  Consumed,
}

struct Slot<T> {
  generation: u64,
  state: SlotState<T>,
  wakers: Vec<Waker>,
  cancel: CancellationToken,
}

impl<T> Slot<T> {
  fn wake_all(&mut self) {
    for waker in self.wakers.drain(..) {
      waker.wake();
    }
  }
}

struct Slots<T> {
  entries: Slab<Slot<T>>,
  next_generation: u64,
  closed: bool,
}

impl<T> Slots<T> {
  fn get(&self, id: ResourceId) -> Option<&Slot<T>> {
    self
      .entries
      .get(id.index)
      .filter(|slot| slot.generation == id.generation)
  }

  fn get_mut(&mut self, id: ResourceId) -> Option<&mut Slot<T>> {
    self
      .entries
      .get_mut(id.index)
      .filter(|slot| slot.generation == id.generation)
  }

  fn remove(&mut self, id: ResourceId) -> Option<Slot<T>> {
    self.get(id)?;
    Some(self.entries.remove(id.index))
  }
}

pub(crate) struct TableInner<T> {
  slots: Mutex<Slots<T>>,
  cancel: CancellationToken,
}

/// Readiness queries used by [`crate::Pollable`], independent of the slot
/// value type.
pub(crate) trait Watch: Send + Sync {
  fn is_ready(&self, id: ResourceId) -> bool;

  /// Register `waker` for the slot. Returns `true` if the slot is already
  /// ready (or gone) and no wake-up will follow.
  fn register(&self, id: ResourceId, waker: &Waker) -> bool;

  /// Drop every registration that would wake the same task as `waker`.
  fn unregister(&self, id: ResourceId, waker: &Waker);
}

impl<T: Send> Watch for TableInner<T> {
  fn is_ready(&self, id: ResourceId) -> bool {
    let slots = self.slots.lock();
    !matches!(
      slots.get(id).map(|slot| &slot.state),
      Some(SlotState::Pending)
    )
  }

  fn register(&self, id: ResourceId, waker: &Waker) -> bool {
    let mut slots = self.slots.lock();
    match slots.get_mut(id) {
      Some(slot) if matches!(slot.state, SlotState::Pending) => {
        if !slot.wakers.iter().any(|w| w.will_wake(waker)) {
          slot.wakers.push(waker.clone());
        }
        false
      }
      _ => true,
    }
  }

  fn unregister(&self, id: ResourceId, waker: &Waker) {
    if let Some(slot) = self.slots.lock().get_mut(id) {
      slot.wakers.retain(|w| !w.will_wake(waker));
    }
  }
}

impl<T> TableInner<T> {
  #[cfg(test)]
  pub(crate) fn waiters(&self, id: ResourceId) -> usize {
    self.slots.lock().get(id).map_or(0, |slot| slot.wakers.len())
  }

  /// Read the slot for a guest. `Ok(None)` while pending.
  pub(crate) fn take(&self, id: ResourceId) -> Result<Option<T>, PreconditionError> {
    let mut slots = self.slots.lock();
    let slot = slots.get_mut(id).ok_or(PreconditionError::Reclaimed)?;
    match std::mem::replace(&mut slot.state, SlotState::Consumed) {
      SlotState::Pending => {
        slot.state = SlotState::Pending;
        Ok(None)
      }
      SlotState::Ready(value) => Ok(Some(value)),
      SlotState::Consumed => Err(PreconditionError::AlreadyConsumed),
    }
  }

  /// Remove a slot the guest no longer holds, cancelling it if still pending.
  pub(crate) fn abandon(&self, id: ResourceId) {
    let removed = self.slots.lock().remove(id);
    if let Some(mut slot) = removed {
      if matches!(slot.state, SlotState::Pending) {
        trace!(index = id.index, "abandoning pending future");
        slot.cancel.cancel();
      }
      slot.wake_all();
    }
  }
}

/// Per-invocation table of pending host futures.
///
/// Cloning shares the same table.
pub struct ResourceTable<T> {
  inner: Arc<TableInner<T>>,
}

impl<T> Clone for ResourceTable<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T: Send + 'static> Default for ResourceTable<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Send + 'static> ResourceTable<T> {
  pub fn new() -> Self {
    Self::with_cancellation(CancellationToken::new())
  }

  /// Create a table whose slots are cancelled when `parent` is.
  pub fn with_cancellation(parent: CancellationToken) -> Self {
    Self {
      inner: Arc::new(TableInner {
        slots: Mutex::new(Slots {
          entries: Slab::new(),
          next_generation: 0,
          closed: false,
        }),
        cancel: parent.child_token(),
      }),
    }
  }

  /// Allocate a pending slot.
  ///
  /// Fails with [`PreconditionError::Reclaimed`] once the table is closed.
  pub fn push(&self) -> Result<(HostFuture<T>, Resolver<T>), PreconditionError> {
    let mut slots = self.inner.slots.lock();
    if slots.closed || self.inner.cancel.is_cancelled() {
      return Err(PreconditionError::Reclaimed);
    }

    let generation = slots.next_generation;
    slots.next_generation += 1;

    let cancel = self.inner.cancel.child_token();
    let index = slots.entries.insert(Slot {
      generation,
      state: SlotState::Pending,
      wakers: Vec::new(),
      cancel: cancel.clone(),
    });
    let id = ResourceId { index, generation };

    let watch: Arc<dyn Watch> = self.inner.clone();
    let future = HostFuture::new(Arc::clone(&self.inner), Arc::downgrade(&watch), id);
    let resolver = Resolver {
      table: Arc::downgrade(&self.inner),
      id,
      cancel,
      resolved: false,
    };
    Ok((future, resolver))
  }

  /// Number of live slots, pending or not.
  pub fn len(&self) -> usize {
    self.inner.slots.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Number of slots still waiting on the host.
  pub fn pending(&self) -> usize {
    self
      .inner
      .slots
      .lock()
      .entries
      .iter()
      .filter(|(_, slot)| matches!(slot.state, SlotState::Pending))
      .count()
  }

  #[cfg(test)]
  pub(crate) fn waiters(&self, id: ResourceId) -> usize {
    self.inner.waiters(id)
  }

  pub fn is_closed(&self) -> bool {
    self.inner.slots.lock().closed
  }

  /// Close the table, cancelling and reclaiming every slot.
  ///
  /// Returns how many slots were still pending. Outstanding guest handles
  /// report [`PreconditionError::Reclaimed`] afterwards.
  pub fn close(&self) -> usize {
    let drained: Vec<Slot<T>> = {
      let mut slots = self.inner.slots.lock();
      slots.closed = true;
      slots.entries.drain().collect()
    };
    self.inner.cancel.cancel();

    let mut pending = 0;
    for mut slot in drained {
      if matches!(slot.state, SlotState::Pending) {
        pending += 1;
      }
      slot.wake_all();
    }

    if pending > 0 {
      debug!(pending, "reclaimed pending futures on close");
    }
    pending
  }
}

/// Host side of a slot. Resolving consumes it, so a slot becomes ready at
/// most once.
///
/// Dropping an unresolved resolver reclaims the slot; the guest then sees
/// [`PreconditionError::Reclaimed`].
pub struct Resolver<T> {
  table: Weak<TableInner<T>>,
  id: ResourceId,
  cancel: CancellationToken,
  resolved: bool,
}

impl<T> Resolver<T> {
  pub fn id(&self) -> ResourceId {
    self.id
  }

  /// Token cancelled when the guest abandons the future or the table closes.
  pub fn cancellation(&self) -> &CancellationToken {
    &self.cancel
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Deliver the value. Returns `false` if the slot was already reclaimed,
  /// in which case the value is discarded.
  pub fn resolve(mut self, value: T) -> bool {
    self.resolved = true;
    let Some(table) = self.table.upgrade() else {
      return false;
    };

    let mut slots = table.slots.lock();
    match slots.get_mut(self.id) {
      Some(slot) if matches!(slot.state, SlotState::Pending) => {
        slot.state = SlotState::Ready(value);
        slot.wake_all();
        true
      }
      _ => false,
    }
  }
}

impl<T> Drop for Resolver<T> {
  fn drop(&mut self) {
    if self.resolved {
      return;
    }
    if let Some(table) = self.table.upgrade() {
      let removed = table.slots.lock().remove(self.id);
      if let Some(mut slot) = removed {
        debug!(index = self.id.index, "resolver dropped without a value");
        slot.wake_all();
      }
    }
  }
}
