//! Transactional outbox hand-off.
//!
//! [`OutboxRecorder`] subscribes to every published event and saves it as an
//! [`OutboxMessage`]; [`OutboxRelay`] later moves pending messages to an
//! [`OutboxPublisher`]. Cross-process delivery is only as strong as the
//! [`OutboxStore`] behind it.

mod error;
mod in_memory;
mod message;
mod publisher;
mod recorder;
mod relay;
mod store;

pub use error::OutboxError;
pub use in_memory::InMemoryOutbox;
pub use message::{OutboxMessage, OutboxStatus, CAUSATION_ID, CORRELATION_ID};
pub use publisher::{LogPublisher, LogPublisherError, OutboxPublisher};
pub use recorder::OutboxRecorder;
pub use relay::{MessageOutcome, OutboxRelay, RelayResult};
pub use store::OutboxStore;
