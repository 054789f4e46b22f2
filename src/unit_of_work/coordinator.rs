use tracing::debug;

use super::UnitOfWork;
use crate::dispatch::{EventDispatcher, PublicationReport};

/// Opens a unit of work per command and, depending on the handler's outcome,
/// either drains and publishes its events or discards it.
#[derive(Clone, Debug)]
pub struct UnitOfWorkCoordinator {
    events: EventDispatcher,
}

impl UnitOfWorkCoordinator {
    pub fn new(events: EventDispatcher) -> Self {
        UnitOfWorkCoordinator { events }
    }

    /// Start tracking a new command execution.
    pub fn begin(&self) -> UnitOfWork {
        let uow = UnitOfWork::begin();
        debug!(uow = %uow.id(), "unit of work started");
        uow
    }

    /// The handler succeeded: drain every tracked aggregate in touch order and
    /// publish the events one at a time, in that order.
    ///
    /// Subscriber failures are collected in the report; they never undo the
    /// command.
    pub async fn complete(&self, uow: &UnitOfWork) -> PublicationReport {
        let events = uow.drain();
        debug!(uow = %uow.id(), events = events.len(), "unit of work drained");
        self.events.publish_all(events).await
    }

    /// The handler failed: forget tracked aggregates without draining them.
    pub fn discard(&self, uow: &UnitOfWork) {
        let released = uow.discard();
        debug!(uow = %uow.id(), released, "unit of work discarded");
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }
}
