//! Unit of work: tracks the aggregates touched by one command and publishes
//! their recorded events once, after the command handler has succeeded.
//!
//! ```text
//!            begin()               handler ok            drained
//!   Idle ─────────────▶ Tracking ─────────────▶ Draining ────────▶ Closed
//!                          │
//!                          └──────────────────────────────────────▶ Closed
//!                                 handler failed (discard)
//! ```
//!
//! A discarded unit of work never drains: the events stay on the in-memory
//! aggregate instances, whose mutation was not persisted either.

mod coordinator;

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::aggregate::AggregateRoot;
use crate::event::{DomainEvent, EventRecorder, RecorderHandle, SharedEvent};

pub use coordinator::UnitOfWorkCoordinator;

tokio::task_local! {
    static CURRENT: UnitOfWork;
}

/// Lifecycle of a [`UnitOfWork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    /// Accepting aggregates; nothing has been drained.
    Tracking,
    /// The command succeeded and tracked recorders are being drained.
    Draining,
    /// Drained or discarded. Further enlistment is ignored.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    ReadWrite,
    ReadOnly,
}

struct Tracked {
    state: UnitOfWorkState,
    /// Recorders in first-touch order.
    recorders: Vec<RecorderHandle>,
}

struct Inner {
    id: Uuid,
    access: Access,
    tracked: Mutex<Tracked>,
    /// Events recorded inside a read-only scope.
    violations: AtomicUsize,
}

/// The scope of one command execution across which event recording and
/// publication are coordinated.
///
/// Cheap to clone; clones refer to the same unit of work.
#[derive(Clone)]
pub struct UnitOfWork {
    inner: Arc<Inner>,
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.inner.id)
            .field("access", &self.inner.access)
            .field("state", &self.state())
            .field("tracked", &self.tracked_count())
            .finish()
    }
}

impl UnitOfWork {
    pub(crate) fn begin() -> Self {
        Self::with_access(Access::ReadWrite)
    }

    /// A scope in which recording events is a violation. Recorded events are
    /// counted, never tracked.
    pub(crate) fn read_only() -> Self {
        Self::with_access(Access::ReadOnly)
    }

    fn with_access(access: Access) -> Self {
        UnitOfWork {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                access,
                tracked: Mutex::new(Tracked {
                    state: UnitOfWorkState::Tracking,
                    recorders: Vec::new(),
                }),
                violations: AtomicUsize::new(0),
            }),
        }
    }

    /// The unit of work installed for the current task, if any.
    pub fn current() -> Option<UnitOfWork> {
        CURRENT.try_with(UnitOfWork::clone).ok()
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> UnitOfWorkState {
        self.lock().state
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.access == Access::ReadOnly
    }

    /// Number of distinct recorders enlisted so far.
    pub fn tracked_count(&self) -> usize {
        self.lock().recorders.len()
    }

    /// Number of events recorded while this read-only scope was active.
    pub fn violations(&self) -> usize {
        self.inner.violations.load(Ordering::SeqCst)
    }

    /// Enlist an aggregate explicitly. Re-enlisting keeps its original
    /// position in touch order.
    pub fn track<A: AggregateRoot + ?Sized>(&self, aggregate: &A) {
        self.track_recorder(aggregate.recorder());
    }

    pub fn track_recorder(&self, recorder: &EventRecorder) {
        self.enlist(recorder.handle());
    }

    /// Run `future` with this unit of work installed as the current one, so
    /// aggregates recording events inside it enlist themselves.
    pub async fn scope<F: Future>(&self, future: F) -> F::Output {
        CURRENT.scope(self.clone(), future).await
    }

    fn enlist(&self, handle: RecorderHandle) {
        if self.inner.access == Access::ReadOnly {
            let count = self.inner.violations.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(uow = %self.inner.id, recorder = handle.id(), count, "event recorded inside a read-only scope");
            return;
        }

        let mut tracked = self.lock();
        if tracked.state != UnitOfWorkState::Tracking {
            debug!(uow = %self.inner.id, state = ?tracked.state, "ignoring enlistment after tracking ended");
            return;
        }
        if tracked.recorders.iter().all(|r| r.id() != handle.id()) {
            tracked.recorders.push(handle);
        }
    }

    /// A fresh unit of work for one handler attempt. Its recorders reach
    /// `self` only through [`absorb`](Self::absorb).
    pub(crate) fn attempt(&self) -> UnitOfWork {
        Self::with_access(self.inner.access)
    }

    /// Take over the recorders of a successful attempt, in its touch order,
    /// and close it.
    pub(crate) fn absorb(&self, attempt: &UnitOfWork) {
        let recorders = {
            let mut tracked = attempt.lock();
            tracked.state = UnitOfWorkState::Closed;
            std::mem::take(&mut tracked.recorders)
        };
        debug!(uow = %self.inner.id, attempt = %attempt.inner.id, recorders = recorders.len(), "absorbing attempt");
        for handle in recorders {
            self.enlist(handle);
        }
    }

    /// Drain every tracked recorder: first-touched first, recording order
    /// within each. Closes the unit of work; a second call returns nothing.
    /// An event reachable from two recorders is returned once.
    pub(crate) fn drain(&self) -> Vec<SharedEvent> {
        let recorders = {
            let mut tracked = self.lock();
            if tracked.state != UnitOfWorkState::Tracking {
                return Vec::new();
            }
            tracked.state = UnitOfWorkState::Draining;
            std::mem::take(&mut tracked.recorders)
        };

        let mut seen = HashSet::new();
        let events: Vec<SharedEvent> = recorders
            .iter()
            .flat_map(RecorderHandle::drain)
            .filter(|event| seen.insert(event.event_id()))
            .collect();

        self.lock().state = UnitOfWorkState::Closed;
        events
    }

    /// Drop every tracked recorder without draining it. Returns how many
    /// recorders were released.
    pub(crate) fn discard(&self) -> usize {
        let mut tracked = self.lock();
        tracked.state = UnitOfWorkState::Closed;
        let released = tracked.recorders.len();
        tracked.recorders.clear();
        released
    }

    fn lock(&self) -> MutexGuard<'_, Tracked> {
        self.inner
            .tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Enlist a recorder with the unit of work of the current task, if there is
/// one.
pub(crate) fn enlist_current(handle: RecorderHandle) {
    let _ = CURRENT.try_with(|uow| uow.enlist(handle));
}
