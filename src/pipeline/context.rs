use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::message::RequestKind;

/// Cooperative cancellation flag shared between a caller and the dispatch it
/// started.
///
/// Cancelling never interrupts a handler that is already running; behaviors
/// check the flag between phases.
#[derive(Clone, Debug, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-dispatch state handed to every pipeline behavior.
///
/// Borrows the request for the duration of the dispatch call and is dropped
/// when the call returns.
pub struct PipelineContext<'r> {
    dispatch_id: Uuid,
    kind: RequestKind,
    request_type: &'static str,
    request: &'r (dyn Any + Send + Sync),
    cancellation: CancellationSignal,
    position: AtomicUsize,
    chain_len: AtomicUsize,
}

impl<'r> PipelineContext<'r> {
    pub(crate) fn new<R: Any + Send + Sync>(
        kind: RequestKind,
        request: &'r R,
        cancellation: CancellationSignal,
    ) -> Self {
        PipelineContext {
            dispatch_id: Uuid::new_v4(),
            kind,
            request_type: type_name::<R>(),
            request,
            cancellation,
            position: AtomicUsize::new(0),
            chain_len: AtomicUsize::new(0),
        }
    }

    /// Identifier of this dispatch, for correlating log lines.
    pub fn dispatch_id(&self) -> Uuid {
        self.dispatch_id
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Type name of the request being dispatched.
    pub fn request_type(&self) -> &'static str {
        self.request_type
    }

    /// The request, if it is a `T`.
    pub fn request<T: Any>(&self) -> Option<&T> {
        self.request.downcast_ref::<T>()
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Index of the behavior currently running. Equals
    /// [`chain_len`](Self::chain_len) while the handler itself runs.
    pub fn position(&self) -> usize {
        self.position.load(Ordering::SeqCst)
    }

    /// Number of behaviors wrapping this dispatch.
    pub fn chain_len(&self) -> usize {
        self.chain_len.load(Ordering::SeqCst)
    }

    pub(crate) fn set_position(&self, position: usize) {
        self.position.store(position, Ordering::SeqCst);
    }

    pub(crate) fn set_chain_len(&self, len: usize) {
        self.chain_len.store(len, Ordering::SeqCst);
    }
}

impl fmt::Debug for PipelineContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("dispatch_id", &self.dispatch_id)
            .field("kind", &self.kind)
            .field("request_type", &self.request_type)
            .field("cancelled", &self.is_cancelled())
            .field("position", &self.position())
            .field("chain_len", &self.chain_len())
            .finish()
    }
}
