use async_trait::async_trait;

use super::{OutboxError, OutboxMessage};

/// Durable storage for outbox messages. Persistent implementations belong
/// to the application, next to its aggregates.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn save(&self, message: OutboxMessage) -> Result<(), OutboxError>;

    /// Up to `limit` pending messages, oldest first.
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxMessage>, OutboxError>;

    /// Replace the stored copy of `message`.
    async fn update(&self, message: &OutboxMessage) -> Result<(), OutboxError>;
}
