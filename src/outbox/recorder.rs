use async_trait::async_trait;
use tracing::debug;

use super::{OutboxMessage, OutboxStore};
use crate::error::HandlerError;
use crate::event::DomainEvent;
use crate::handler::AnyEventHandler;

/// Catch-all subscriber that saves every published event to an outbox.
///
/// Register it with [`HandlerRegistry::subscribe_all`](crate::HandlerRegistry::subscribe_all)
/// so each event of a successful command becomes a pending message, in
/// publication order.
#[derive(Clone, Debug)]
pub struct OutboxRecorder<S> {
    store: S,
}

impl<S: OutboxStore> OutboxRecorder<S> {
    pub fn new(store: S) -> Self {
        OutboxRecorder { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: OutboxStore + 'static> AnyEventHandler for OutboxRecorder<S> {
    async fn handle(&self, event: &dyn DomainEvent) -> Result<(), HandlerError> {
        let message = OutboxMessage::from_event(event).map_err(HandlerError::other)?;
        debug!(
            message_id = %message.id,
            event = %message.event_type,
            "saving event to outbox"
        );
        self.store.save(message).await.map_err(HandlerError::other)
    }

    fn name(&self) -> &str {
        "outbox"
    }
}
