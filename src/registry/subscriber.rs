use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::event::DomainEvent;
use crate::handler::{AnyEventHandler, EventHandler};

/// Subscriber with its event type erased, so subscribers of every event type
/// can be invoked through `&dyn DomainEvent`.
#[async_trait]
pub(crate) trait ErasedSubscriber: Send + Sync {
    async fn handle(&self, event: &dyn DomainEvent) -> Result<(), HandlerError>;
}

pub(crate) struct Typed<E, H> {
    handler: Arc<H>,
    _event: PhantomData<fn(&E)>,
}

impl<E, H> Typed<E, H> {
    pub(crate) fn new(handler: Arc<H>) -> Self {
        Typed {
            handler,
            _event: PhantomData,
        }
    }
}

#[async_trait]
impl<E, H> ErasedSubscriber for Typed<E, H>
where
    E: DomainEvent,
    H: EventHandler<E>,
{
    async fn handle(&self, event: &dyn DomainEvent) -> Result<(), HandlerError> {
        match event.downcast_ref::<E>() {
            Some(event) => self.handler.handle(event).await,
            None => Err(HandlerError::Rejected(format!(
                "{} delivered to a subscriber of {}",
                event.event_type(),
                type_name::<E>()
            ))),
        }
    }
}

pub(crate) struct CatchAll<H> {
    handler: Arc<H>,
}

impl<H> CatchAll<H> {
    pub(crate) fn new(handler: Arc<H>) -> Self {
        CatchAll { handler }
    }
}

#[async_trait]
impl<H: AnyEventHandler> ErasedSubscriber for CatchAll<H> {
    async fn handle(&self, event: &dyn DomainEvent) -> Result<(), HandlerError> {
        self.handler.handle(event).await
    }
}

/// A subscriber resolved for one publication.
#[derive(Clone)]
pub(crate) struct ResolvedSubscriber {
    pub(crate) name: String,
    pub(crate) handler: Arc<dyn ErasedSubscriber>,
}
