//! InMemoryOutbox - Vec-backed outbox store for tests and single-process use.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use super::{OutboxError, OutboxMessage, OutboxStatus, OutboxStore};

/// Vec-backed outbox for tests and single-process use.
///
/// Messages keep insertion order. Clone-friendly via Arc.
#[derive(Clone, Debug, Default)]
pub struct InMemoryOutbox {
    messages: Arc<RwLock<Vec<OutboxMessage>>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored message, in insertion order.
    pub fn all(&self) -> Result<Vec<OutboxMessage>, OutboxError> {
        let messages = self.messages.read().map_err(|_| poisoned())?;
        Ok(messages.clone())
    }

    pub fn with_status(&self, status: OutboxStatus) -> Result<Vec<OutboxMessage>, OutboxError> {
        let messages = self.messages.read().map_err(|_| poisoned())?;
        Ok(messages.iter().filter(|m| m.status == status).cloned().collect())
    }

    /// Number of stored messages. A poisoned lock is read through: every
    /// write leaves the list consistent, so the count is still exact.
    pub fn len(&self) -> usize {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutbox {
    async fn save(&self, message: OutboxMessage) -> Result<(), OutboxError> {
        let mut messages = self.messages.write().map_err(|_| poisoned())?;
        if messages.iter().any(|m| m.id == message.id) {
            return Err(OutboxError::Store(format!(
                "outbox message {} already saved",
                message.id
            )));
        }
        messages.push(message);
        Ok(())
    }

    async fn pending(&self, limit: usize) -> Result<Vec<OutboxMessage>, OutboxError> {
        let messages = self.messages.read().map_err(|_| poisoned())?;
        Ok(messages
            .iter()
            .filter(|m| m.is_pending())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update(&self, message: &OutboxMessage) -> Result<(), OutboxError> {
        let mut messages = self.messages.write().map_err(|_| poisoned())?;
        let stored = messages
            .iter_mut()
            .find(|m| m.id == message.id)
            .ok_or_else(|| OutboxError::Store(format!("unknown outbox message {}", message.id)))?;
        *stored = message.clone();
        Ok(())
    }
}

fn poisoned() -> OutboxError {
    OutboxError::Store("lock poisoned".into())
}
