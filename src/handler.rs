//! Handler traits the surrounding application implements.
//!
//! A command or query type is bound to exactly one handler; an event type
//! may have any number of subscribers.

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::event::DomainEvent;
use crate::message::{Command, Query};
use crate::unit_of_work::UnitOfWork;

/// The single handler bound to a command type.
///
/// Handlers mutate aggregates through their domain methods. Aggregates that
/// record events while the handler runs are enlisted with `uow`
/// automatically; aggregates mutated on other tasks must be enlisted with
/// [`UnitOfWork::track`].
///
/// `uow` covers one attempt: when a pipeline behavior runs the handler
/// again, the retry gets a fresh unit of work and the failed attempt's
/// enlistments are dropped.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    type Command: Command;

    async fn handle(
        &self,
        command: &Self::Command,
        uow: &UnitOfWork,
    ) -> Result<<Self::Command as Command>::Output, HandlerError>;
}

/// The single handler bound to a query type. Must not mutate aggregates.
#[async_trait]
pub trait QueryHandler: Send + Sync + 'static {
    type Query: Query;

    async fn handle(
        &self,
        query: &Self::Query,
    ) -> Result<<Self::Query as Query>::Output, HandlerError>;
}

/// A subscriber to one event type.
#[async_trait]
pub trait EventHandler<E: DomainEvent>: Send + Sync + 'static {
    async fn handle(&self, event: &E) -> Result<(), HandlerError>;

    /// Name used in failure reports.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A subscriber to every published event, whatever its type.
#[async_trait]
pub trait AnyEventHandler: Send + Sync + 'static {
    async fn handle(&self, event: &dyn DomainEvent) -> Result<(), HandlerError>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
