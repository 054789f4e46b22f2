use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use super::OutboxMessage;

/// Hands outbox messages to an external system (broker, webhook, log).
#[async_trait]
pub trait OutboxPublisher: Send + Sync {
    type Error: fmt::Display + Send;

    /// Publish one message. The publisher picks the wire format: the raw
    /// bitcode payload, [`OutboxMessage::to_json`], or a decoded event.
    async fn publish(&self, message: &OutboxMessage) -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum LogPublisherError {
    #[error("log publisher buffer poisoned")]
    BufferPoisoned,
    #[error("failed to serialize outbox message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Writes each message as a JSON line to the log, or to a buffer.
#[derive(Clone, Debug, Default)]
pub struct LogPublisher {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl LogPublisher {
    pub fn new() -> Self {
        LogPublisher { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        LogPublisher {
            buffer: Some(buffer),
        }
    }
}

#[async_trait]
impl OutboxPublisher for LogPublisher {
    type Error = LogPublisherError;

    async fn publish(&self, message: &OutboxMessage) -> Result<(), Self::Error> {
        let line = format!("[OUTBOX] {} {}", message.event_type, message.to_json()?);
        match &self.buffer {
            Some(buffer) => buffer
                .lock()
                .map_err(|_| LogPublisherError::BufferPoisoned)?
                .push(line),
            None => info!(message_id = %message.id, "{}", line),
        }
        Ok(())
    }
}
