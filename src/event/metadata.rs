use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope data every domain event carries alongside its payload.
///
/// `occurred_at` is the logical occurrence time, stamped when the metadata is
/// created (normally inside the aggregate method that records the event).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub aggregate_id: Option<String>,
    /// Schema version of the event type.
    pub event_version: u32,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl EventMetadata {
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            aggregate_id: None,
            event_version: 1,
            correlation_id: None,
            causation_id: None,
        }
    }

    /// Metadata for an event raised by the aggregate with the given id.
    pub fn for_aggregate(aggregate_id: impl Into<String>) -> Self {
        Self::new().with_aggregate_id(aggregate_id)
    }

    pub fn with_aggregate_id(mut self, aggregate_id: impl Into<String>) -> Self {
        self.aggregate_id = Some(aggregate_id.into());
        self
    }

    pub fn with_event_version(mut self, version: u32) -> Self {
        self.event_version = version;
        self
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_causation_id(mut self, id: impl Into<String>) -> Self {
        self.causation_id = Some(id.into());
        self
    }

    /// Metadata for an event caused by `cause`: inherits its correlation id
    /// (or starts one from the cause's event id) and records the causation.
    pub fn caused_by(cause: &EventMetadata) -> Self {
        let correlation = cause
            .correlation_id
            .clone()
            .unwrap_or_else(|| cause.event_id.to_string());
        Self::new()
            .with_correlation_id(correlation)
            .with_causation_id(cause.event_id.to_string())
    }
}
