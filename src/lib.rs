mod aggregate;
mod dispatch;
mod error;
mod event;
mod handler;
mod mediator;
mod message;
mod pipeline;
mod registry;
mod unit_of_work;

#[cfg(feature = "outbox")]
pub mod outbox;

pub use aggregate::AggregateRoot;
pub use dispatch::{
    CommandDispatcher, CommandOutcome, EventDispatcher, PublicationReport, PublishMode,
    QueryDispatcher,
};
pub use error::{
    BoxError, DispatchError, HandlerError, PayloadError, PublishError, RegistryError,
    SubscriberFailure,
};
pub use event::{
    decode_payload, encode_payload, AsAny, DomainEvent, EventMetadata, EventRecorder, SharedEvent,
};
pub use handler::{AnyEventHandler, CommandHandler, EventHandler, QueryHandler};
pub use mediator::{Mediator, MediatorBuilder};
pub use message::{Command, Query, RequestKind};
pub use pipeline::{
    CancellationBehavior, CancellationSignal, LoggingBehavior, Next, Pipeline, PipelineBehavior,
    PipelineContext, ReadOnlyQueryGuard, Response,
};
pub use registry::{HandlerRegistry, SubscriptionId};
pub use unit_of_work::{UnitOfWork, UnitOfWorkCoordinator, UnitOfWorkState};

// Handler traits are implemented with `#[async_trait]`.
pub use async_trait::async_trait;
