use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::PublicationReport;
use crate::error::{DispatchError, HandlerError};
use crate::handler::CommandHandler;
use crate::message::{Command, RequestKind};
use crate::pipeline::{CancellationSignal, Pipeline, PipelineContext, Response, Terminal};
use crate::registry::HandlerRegistry;
use crate::unit_of_work::{UnitOfWork, UnitOfWorkCoordinator};

/// Result of a successful command, with the report of the events its unit of
/// work published.
#[derive(Debug)]
pub struct CommandOutcome<T> {
    pub output: T,
    pub publication: PublicationReport,
}

/// Sends each command to its single handler, through the pipeline, inside a
/// unit of work.
#[derive(Clone)]
pub struct CommandDispatcher {
    registry: Arc<HandlerRegistry>,
    pipeline: Pipeline,
    coordinator: UnitOfWorkCoordinator,
}

impl fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("pipeline", &self.pipeline)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

struct CommandTerminal<'a, C: Command> {
    handler: Arc<dyn CommandHandler<Command = C>>,
    command: &'a C,
    uow: &'a UnitOfWork,
}

/// Each call is one handler attempt with its own unit of work, so a retry
/// behavior never publishes what a failed attempt recorded.
#[async_trait]
impl<'a, C: Command> Terminal for CommandTerminal<'a, C> {
    async fn call(&self) -> Result<Response, HandlerError> {
        let attempt = self.uow.attempt();
        let result = attempt
            .scope(self.handler.handle(self.command, &attempt))
            .await;

        match result {
            Ok(output) => {
                self.uow.absorb(&attempt);
                Ok(Response::new(output))
            }
            Err(err) => {
                let released = attempt.discard();
                debug!(uow = %self.uow.id(), attempt = %attempt.id(), released, "handler attempt discarded");
                Err(err)
            }
        }
    }
}

impl CommandDispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        pipeline: Pipeline,
        coordinator: UnitOfWorkCoordinator,
    ) -> Self {
        CommandDispatcher {
            registry,
            pipeline,
            coordinator,
        }
    }

    /// Dispatch a command and return its handler's output.
    ///
    /// Returns only after the events recorded during the command have been
    /// offered to their subscribers. Subscriber failures do not fail the
    /// command; use [`dispatch_with_report`](Self::dispatch_with_report) to
    /// see them.
    pub async fn dispatch<C: Command>(&self, command: C) -> Result<C::Output, DispatchError> {
        self.dispatch_with_report(command, CancellationSignal::new())
            .await
            .map(|outcome| outcome.output)
    }

    /// Dispatch a command: resolve its handler, run it through the pipeline
    /// with a fresh unit of work installed, then either publish the recorded
    /// events (success) or discard them (failure).
    pub async fn dispatch_with_report<C: Command>(
        &self,
        command: C,
        cancellation: CancellationSignal,
    ) -> Result<CommandOutcome<C::Output>, DispatchError> {
        let request_type = type_name::<C>();
        let handler = self.registry.resolve_command::<C>()?;

        let ctx = PipelineContext::new(RequestKind::Command, &command, cancellation);
        debug!(dispatch = %ctx.dispatch_id(), command = request_type, "dispatching command");

        let uow = self.coordinator.begin();
        let terminal = CommandTerminal {
            handler,
            command: &command,
            uow: &uow,
        };
        let result = uow.scope(self.pipeline.execute(&ctx, &terminal)).await;

        let response = match result {
            Ok(response) => response,
            Err(source) => {
                warn!(
                    dispatch = %ctx.dispatch_id(),
                    command = request_type,
                    error = %source,
                    "command failed; discarding unit of work"
                );
                self.coordinator.discard(&uow);
                return Err(DispatchError::HandlerExecution {
                    request_type,
                    source,
                });
            }
        };

        let output = match response.downcast::<C::Output>() {
            Ok(output) => output,
            Err(_) => {
                self.coordinator.discard(&uow);
                return Err(DispatchError::UnexpectedResponse { request_type });
            }
        };

        let publication = self.coordinator.complete(&uow).await;
        debug!(
            dispatch = %ctx.dispatch_id(),
            command = request_type,
            published = publication.published,
            failed = publication.failures.len(),
            "command completed"
        );

        Ok(CommandOutcome {
            output,
            publication,
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}
