//! The process-wide entry point: one registry, one pipeline, and the three
//! dispatchers built around them.
//!
//! ```ignore
//! let registry = Arc::new(HandlerRegistry::new());
//! registry.register_command(OpenAccountHandler::new(store.clone()))?;
//! registry.subscribe::<AccountOpened, _>(SendWelcomeEmail);
//!
//! let mediator = Mediator::builder()
//!     .registry(registry)
//!     .behavior(LoggingBehavior)
//!     .behavior(ReadOnlyQueryGuard)
//!     .build();
//!
//! let account_id = mediator.send(OpenAccount { owner: "ada".into() }).await?;
//! ```

use std::sync::Arc;

use crate::dispatch::{
    CommandDispatcher, CommandOutcome, EventDispatcher, PublishMode, QueryDispatcher,
};
use crate::error::{DispatchError, PublishError};
use crate::event::DomainEvent;
use crate::message::{Command, Query};
use crate::pipeline::{CancellationSignal, Pipeline, PipelineBehavior};
use crate::registry::HandlerRegistry;
use crate::unit_of_work::UnitOfWorkCoordinator;

/// Routes commands, queries and events to their handlers.
///
/// Cheap to clone; clones share the registry and pipeline, so a handler may
/// hold a `Mediator` and send further commands.
#[derive(Clone, Debug)]
pub struct Mediator {
    registry: Arc<HandlerRegistry>,
    commands: CommandDispatcher,
    queries: QueryDispatcher,
    events: EventDispatcher,
}

impl Mediator {
    /// A mediator over `registry` with no behaviors and sequential
    /// publication.
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self::builder().registry(registry).build()
    }

    pub fn builder() -> MediatorBuilder {
        MediatorBuilder::default()
    }

    /// Dispatch a command. Its recorded events are published before this
    /// returns; subscriber failures are logged, not returned.
    pub async fn send<C: Command>(&self, command: C) -> Result<C::Output, DispatchError> {
        self.commands.dispatch(command).await
    }

    /// Dispatch a command and report how publication of its events went.
    pub async fn send_with_report<C: Command>(
        &self,
        command: C,
    ) -> Result<CommandOutcome<C::Output>, DispatchError> {
        self.commands
            .dispatch_with_report(command, CancellationSignal::new())
            .await
    }

    pub async fn send_cancellable<C: Command>(
        &self,
        command: C,
        cancellation: CancellationSignal,
    ) -> Result<C::Output, DispatchError> {
        self.commands
            .dispatch_with_report(command, cancellation)
            .await
            .map(|outcome| outcome.output)
    }

    pub async fn ask<Q: Query>(&self, query: Q) -> Result<Q::Output, DispatchError> {
        self.queries.dispatch(query).await
    }

    pub async fn ask_cancellable<Q: Query>(
        &self,
        query: Q,
        cancellation: CancellationSignal,
    ) -> Result<Q::Output, DispatchError> {
        self.queries.dispatch_cancellable(query, cancellation).await
    }

    /// Publish an event directly, outside any unit of work.
    pub async fn publish(&self, event: &dyn DomainEvent) -> Result<(), PublishError> {
        self.events.publish(event).await
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn pipeline(&self) -> &Pipeline {
        self.commands.pipeline()
    }

    pub fn publish_mode(&self) -> PublishMode {
        self.events.mode()
    }
}

/// Builder for [`Mediator`].
#[derive(Default)]
pub struct MediatorBuilder {
    registry: Option<Arc<HandlerRegistry>>,
    pipeline: Pipeline,
    publish_mode: PublishMode,
}

impl MediatorBuilder {
    /// Use `registry`. Without one the mediator starts with an empty
    /// registry, reachable through [`Mediator::registry`].
    pub fn registry(mut self, registry: impl Into<Arc<HandlerRegistry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Append a behavior; behaviors wrap the handler in the order added.
    pub fn behavior<B: PipelineBehavior>(mut self, behavior: B) -> Self {
        self.pipeline.push(Arc::new(behavior));
        self
    }

    pub fn shared_behavior(mut self, behavior: Arc<dyn PipelineBehavior>) -> Self {
        self.pipeline.push(behavior);
        self
    }

    pub fn publish_mode(mut self, mode: PublishMode) -> Self {
        self.publish_mode = mode;
        self
    }

    pub fn build(self) -> Mediator {
        let registry = self.registry.unwrap_or_default();
        let events = EventDispatcher::new(Arc::clone(&registry)).with_mode(self.publish_mode);
        let coordinator = UnitOfWorkCoordinator::new(events.clone());

        Mediator {
            commands: CommandDispatcher::new(Arc::clone(&registry), self.pipeline.clone(), coordinator),
            queries: QueryDispatcher::new(Arc::clone(&registry), self.pipeline),
            events,
            registry,
        }
    }
}
