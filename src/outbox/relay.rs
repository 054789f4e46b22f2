use tracing::{debug, warn};

use super::{OutboxError, OutboxMessage, OutboxPublisher, OutboxStore};

/// Counts from one relay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayResult {
    pub claimed: usize,
    pub completed: usize,
    pub released: usize,
    pub failed: usize,
}

/// What happened to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Not pending; left untouched.
    Skipped,
    Completed,
    /// Publishing failed; the message stays pending for the next pass.
    Released,
    /// Publishing failed on the last allowed attempt.
    Failed,
}

/// Moves pending outbox messages to a publisher, one batch per
/// [`relay`](Self::relay) call. Scheduling passes is the caller's job.
#[derive(Debug)]
pub struct OutboxRelay<P> {
    publisher: P,
    batch_size: usize,
    max_attempts: u32,
}

impl<P> OutboxRelay<P> {
    pub fn new(publisher: P) -> Self {
        Self {
            publisher,
            batch_size: 10,
            max_attempts: 3,
        }
    }

    /// Maximum messages loaded per pass.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Attempts before a message is marked failed.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

impl<P: OutboxPublisher> OutboxRelay<P> {
    /// Publish one message and update its status. The caller persists it.
    pub async fn process_message(&self, message: &mut OutboxMessage) -> MessageOutcome {
        if !message.is_pending() {
            return MessageOutcome::Skipped;
        }

        message.record_attempt();
        match self.publisher.publish(message).await {
            Ok(()) => {
                message.complete();
                MessageOutcome::Completed
            }
            Err(err) => {
                let reason = err.to_string();
                warn!(
                    message_id = %message.id,
                    event = %message.event_type,
                    attempts = message.attempts,
                    error = %reason,
                    "outbox publish failed"
                );
                if message.attempts >= self.max_attempts {
                    message.fail(reason);
                    MessageOutcome::Failed
                } else {
                    message.release(reason);
                    MessageOutcome::Released
                }
            }
        }
    }

    /// Load up to `batch_size` pending messages, publish each, and store the
    /// result. Store failures abort the pass.
    pub async fn relay<S: OutboxStore + ?Sized>(&self, store: &S) -> Result<RelayResult, OutboxError> {
        let mut result = RelayResult::default();

        for mut message in store.pending(self.batch_size).await? {
            match self.process_message(&mut message).await {
                MessageOutcome::Skipped => continue,
                MessageOutcome::Completed => result.completed += 1,
                MessageOutcome::Released => result.released += 1,
                MessageOutcome::Failed => result.failed += 1,
            }
            result.claimed += 1;
            store.update(&message).await?;
        }

        debug!(
            claimed = result.claimed,
            completed = result.completed,
            released = result.released,
            failed = result.failed,
            "outbox relay pass finished"
        );
        Ok(result)
    }
}
