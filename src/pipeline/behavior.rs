use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::PipelineContext;
use crate::error::HandlerError;
use crate::message::RequestKind;

/// Type-erased handler output travelling back through the pipeline.
///
/// A behavior that short-circuits builds one with [`Response::new`]; it must
/// hold the request's `Output` type or the dispatch fails with
/// [`DispatchError::UnexpectedResponse`](crate::DispatchError::UnexpectedResponse).
pub struct Response(Box<dyn Any + Send>);

impl Response {
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Response(Box::new(value))
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.0.is::<T>()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Take the value out, or hand the response back if it is not a `T`.
    pub fn downcast<T: 'static>(self) -> Result<T, Response> {
        self.0.downcast::<T>().map(|value| *value).map_err(Response)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response").finish_non_exhaustive()
    }
}

/// Cross-cutting interceptor wrapped around handler invocation.
///
/// A behavior runs its before-logic, awaits [`Next::run`] for the rest of the
/// chain, then runs its after-logic. It may return without calling `next`
/// (short-circuit); errors from `next` propagate unless the behavior handles
/// them itself and produces a substitute response.
#[async_trait]
pub trait PipelineBehavior: Send + Sync + 'static {
    async fn handle(
        &self,
        ctx: &PipelineContext<'_>,
        next: Next<'_>,
    ) -> Result<Response, HandlerError>;

    /// Whether this behavior wraps dispatches of `kind`. Skipped behaviors do
    /// not change the relative order of the others.
    fn applies_to(&self, _kind: RequestKind) -> bool {
        true
    }

    fn name(&self) -> &str {
        type_name::<Self>()
    }
}

/// The innermost call: the resolved handler, bound to its request.
#[async_trait]
pub(crate) trait Terminal: Send + Sync {
    async fn call(&self) -> Result<Response, HandlerError>;
}

/// The remainder of the chain after the current behavior.
///
/// `Copy`, so a behavior may run the remainder more than once (retry).
#[derive(Clone, Copy)]
pub struct Next<'a> {
    ctx: &'a PipelineContext<'a>,
    behaviors: &'a [Arc<dyn PipelineBehavior>],
    index: usize,
    terminal: &'a dyn Terminal,
}

impl<'a> Next<'a> {
    /// Run the next behavior, or the handler once every behavior has run.
    pub fn run(self) -> BoxFuture<'a, Result<Response, HandlerError>> {
        Box::pin(async move {
            let caller = self.ctx.position();
            self.ctx.set_position(self.index);

            let result = match self.behaviors.get(self.index) {
                Some(behavior) => {
                    let next = Next {
                        index: self.index + 1,
                        ..self
                    };
                    behavior.handle(self.ctx, next).await
                }
                None => self.terminal.call().await,
            };

            // The caller's after-phase sees its own position again.
            self.ctx.set_position(caller);
            result
        })
    }

    /// Behaviors still to run before the handler.
    pub fn remaining(&self) -> usize {
        self.behaviors.len().saturating_sub(self.index)
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// Ordered behavior list. Registration order is the before-order; the
/// after-order is its reverse.
///
/// The behaviors that apply to each [`RequestKind`] are filtered once, when
/// they are added, so a dispatch only borrows its chain.
#[derive(Clone, Default)]
pub struct Pipeline {
    behaviors: Vec<Arc<dyn PipelineBehavior>>,
    commands: Vec<Arc<dyn PipelineBehavior>>,
    queries: Vec<Arc<dyn PipelineBehavior>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a behavior. It wraps inside every behavior added before it.
    pub fn push(&mut self, behavior: Arc<dyn PipelineBehavior>) {
        if behavior.applies_to(RequestKind::Command) {
            self.commands.push(Arc::clone(&behavior));
        }
        if behavior.applies_to(RequestKind::Query) {
            self.queries.push(Arc::clone(&behavior));
        }
        self.behaviors.push(behavior);
    }

    pub fn with<B: PipelineBehavior>(mut self, behavior: B) -> Self {
        self.push(Arc::new(behavior));
        self
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    pub fn behavior_names(&self) -> Vec<&str> {
        self.behaviors.iter().map(|b| b.name()).collect()
    }

    /// The behaviors wrapping dispatches of `kind`, in registration order.
    pub fn behaviors_for(&self, kind: RequestKind) -> &[Arc<dyn PipelineBehavior>] {
        match kind {
            RequestKind::Command => &self.commands,
            RequestKind::Query => &self.queries,
        }
    }

    /// Run the behaviors that apply to `ctx.kind()`, in order, around
    /// `terminal`.
    pub(crate) async fn execute(
        &self,
        ctx: &PipelineContext<'_>,
        terminal: &dyn Terminal,
    ) -> Result<Response, HandlerError> {
        let behaviors = self.behaviors_for(ctx.kind());
        ctx.set_chain_len(behaviors.len());

        Next {
            ctx,
            behaviors,
            index: 0,
            terminal,
        }
        .run()
        .await
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.behavior_names()).finish()
    }
}
