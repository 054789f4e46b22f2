use thiserror::Error;
use uuid::Uuid;

use crate::error::PayloadError;

/// Failure while handing events to, or relaying them from, an outbox.
#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("failed to encode {event_type}: {source}")]
    Encode {
        event_type: String,
        #[source]
        source: PayloadError,
    },
    #[error("outbox store error: {0}")]
    Store(String),
    #[error("failed to publish outbox message {message_id}: {reason}")]
    Publish { message_id: Uuid, reason: String },
}
