//! Pipeline behaviors: interceptors composed around handler invocation.
//!
//! Behaviors registered as `[A, B, C]` run their before-logic in that order
//! and their after-logic in reverse, around one inner call:
//!
//! ```text
//! A before ─▶ B before ─▶ C before ─▶ handler ─▶ C after ─▶ B after ─▶ A after
//! ```

mod behavior;
mod builtin;
mod context;

pub use behavior::{Next, Pipeline, PipelineBehavior, Response};
pub(crate) use behavior::Terminal;
pub use builtin::{CancellationBehavior, LoggingBehavior, ReadOnlyQueryGuard};
pub use context::{CancellationSignal, PipelineContext};
