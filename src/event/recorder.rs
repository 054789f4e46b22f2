use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{DomainEvent, SharedEvent};
use crate::unit_of_work;

static NEXT_RECORDER_ID: AtomicU64 = AtomicU64::new(1);

/// Ordered buffer of uncommitted domain events, owned by one aggregate.
///
/// Recording is pure in-memory bookkeeping and never fails. Draining reads
/// and clears the buffer in one critical section, so the same recorder state
/// is never delivered twice.
///
/// While a command is being dispatched, the first `record` call enlists the
/// recorder with the active [`UnitOfWork`](crate::UnitOfWork); the unit of
/// work drains it once the command handler has succeeded.
pub struct EventRecorder {
    id: u64,
    pending: Arc<Mutex<Vec<SharedEvent>>>,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRecorder")
            .field("id", &self.id)
            .field("pending", &self.len())
            .finish()
    }
}

impl Clone for EventRecorder {
    /// A cloned aggregate gets its own, empty recorder. Pending events stay
    /// with the original so each is drained exactly once.
    fn clone(&self) -> Self {
        EventRecorder::new()
    }
}

impl EventRecorder {
    pub fn new() -> Self {
        EventRecorder {
            id: next_id(),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Append an event.
    pub fn record<E: DomainEvent>(&mut self, event: E) {
        self.record_shared(Arc::new(event));
    }

    /// Append an already shared event.
    pub fn record_shared(&mut self, event: SharedEvent) {
        lock(&self.pending).push(event);
        unit_of_work::enlist_current(self.handle());
    }

    /// Take every pending event, in recording order, and clear the buffer.
    pub fn drain_all(&mut self) -> Vec<SharedEvent> {
        self.handle().drain()
    }

    /// Pending events in recording order, without clearing them.
    pub fn peek(&self) -> Vec<SharedEvent> {
        lock(&self.pending).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn handle(&self) -> RecorderHandle {
        RecorderHandle {
            id: self.id,
            pending: Arc::clone(&self.pending),
        }
    }
}

/// Drain capability over a recorder, held by a unit of work.
#[derive(Clone)]
pub(crate) struct RecorderHandle {
    id: u64,
    pending: Arc<Mutex<Vec<SharedEvent>>>,
}

impl RecorderHandle {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn drain(&self) -> Vec<SharedEvent> {
        std::mem::take(&mut *lock(&self.pending))
    }
}

fn next_id() -> u64 {
    NEXT_RECORDER_ID.fetch_add(1, Ordering::Relaxed)
}

// Every critical section leaves the buffer consistent, so a poisoned lock is
// still safe to use.
fn lock(pending: &Mutex<Vec<SharedEvent>>) -> MutexGuard<'_, Vec<SharedEvent>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}
