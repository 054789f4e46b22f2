use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{Next, PipelineBehavior, PipelineContext, Response};
use crate::error::HandlerError;
use crate::message::RequestKind;
use crate::unit_of_work::UnitOfWork;

/// Logs every dispatch before and after the inner call, with elapsed time.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingBehavior;

#[async_trait]
impl PipelineBehavior for LoggingBehavior {
    async fn handle(
        &self,
        ctx: &PipelineContext<'_>,
        next: Next<'_>,
    ) -> Result<Response, HandlerError> {
        info!(
            dispatch = %ctx.dispatch_id(),
            kind = %ctx.kind(),
            request = ctx.request_type(),
            "handling request"
        );
        let started = Instant::now();

        let result = next.run().await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(_) => info!(
                dispatch = %ctx.dispatch_id(),
                request = ctx.request_type(),
                elapsed_ms,
                "request handled"
            ),
            Err(error) => warn!(
                dispatch = %ctx.dispatch_id(),
                request = ctx.request_type(),
                elapsed_ms,
                error = %error,
                "request failed"
            ),
        }
        result
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// Fails the dispatch with [`HandlerError::Cancelled`] when the context's
/// signal is set, checked before and after the inner call.
///
/// A handler that completed before the post-check has already produced its
/// effects; for commands the failure discards the unit of work, so none of
/// its events are published.
#[derive(Debug, Clone, Copy, Default)]
pub struct CancellationBehavior;

#[async_trait]
impl PipelineBehavior for CancellationBehavior {
    async fn handle(
        &self,
        ctx: &PipelineContext<'_>,
        next: Next<'_>,
    ) -> Result<Response, HandlerError> {
        if ctx.is_cancelled() {
            return Err(HandlerError::Cancelled);
        }
        let response = next.run().await?;
        if ctx.is_cancelled() {
            return Err(HandlerError::Cancelled);
        }
        Ok(response)
    }

    fn name(&self) -> &str {
        "cancellation"
    }
}

/// Rejects queries whose handler records domain events.
///
/// The rest of the chain runs inside a read-only unit-of-work scope; any
/// event an aggregate records there is counted and the query fails with
/// [`HandlerError::Rejected`], even if the handler itself succeeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyQueryGuard;

#[async_trait]
impl PipelineBehavior for ReadOnlyQueryGuard {
    async fn handle(
        &self,
        ctx: &PipelineContext<'_>,
        next: Next<'_>,
    ) -> Result<Response, HandlerError> {
        let scope = UnitOfWork::read_only();
        let result = scope.scope(next.run()).await;

        match scope.violations() {
            0 => result,
            recorded => {
                warn!(
                    dispatch = %ctx.dispatch_id(),
                    request = ctx.request_type(),
                    recorded,
                    "query recorded domain events"
                );
                Err(HandlerError::Rejected(format!(
                    "query {} recorded {} domain event(s)",
                    ctx.request_type(),
                    recorded
                )))
            }
        }
    }

    fn applies_to(&self, kind: RequestKind) -> bool {
        kind == RequestKind::Query
    }

    fn name(&self) -> &str {
        "read-only-query-guard"
    }
}
