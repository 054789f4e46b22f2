use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{DispatchError, HandlerError};
use crate::handler::QueryHandler;
use crate::message::{Query, RequestKind};
use crate::pipeline::{CancellationSignal, Pipeline, PipelineContext, Response, Terminal};
use crate::registry::HandlerRegistry;

/// Sends each query to its single handler through the pipeline. Queries
/// never open a unit of work and never publish events.
#[derive(Clone)]
pub struct QueryDispatcher {
    registry: Arc<HandlerRegistry>,
    pipeline: Pipeline,
}

impl fmt::Debug for QueryDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDispatcher")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

struct QueryTerminal<'a, Q: Query> {
    handler: Arc<dyn QueryHandler<Query = Q>>,
    query: &'a Q,
}

#[async_trait]
impl<'a, Q: Query> Terminal for QueryTerminal<'a, Q> {
    async fn call(&self) -> Result<Response, HandlerError> {
        self.handler.handle(self.query).await.map(Response::new)
    }
}

impl QueryDispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, pipeline: Pipeline) -> Self {
        QueryDispatcher { registry, pipeline }
    }

    pub async fn dispatch<Q: Query>(&self, query: Q) -> Result<Q::Output, DispatchError> {
        self.dispatch_cancellable(query, CancellationSignal::new()).await
    }

    pub async fn dispatch_cancellable<Q: Query>(
        &self,
        query: Q,
        cancellation: CancellationSignal,
    ) -> Result<Q::Output, DispatchError> {
        let request_type = type_name::<Q>();
        let handler = self.registry.resolve_query::<Q>()?;

        let ctx = PipelineContext::new(RequestKind::Query, &query, cancellation);
        debug!(dispatch = %ctx.dispatch_id(), query = request_type, "dispatching query");

        let terminal = QueryTerminal {
            handler,
            query: &query,
        };
        let response = self
            .pipeline
            .execute(&ctx, &terminal)
            .await
            .map_err(|source| {
                warn!(
                    dispatch = %ctx.dispatch_id(),
                    query = request_type,
                    error = %source,
                    "query failed"
                );
                DispatchError::HandlerExecution {
                    request_type,
                    source,
                }
            })?;

        response
            .downcast::<Q::Output>()
            .map_err(|_| DispatchError::UnexpectedResponse { request_type })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}
