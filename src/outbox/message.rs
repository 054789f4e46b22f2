use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OutboxError;
use crate::error::PayloadError;
use crate::event::{decode_payload, DomainEvent};

pub const CORRELATION_ID: &str = "correlation_id";
pub const CAUSATION_ID: &str = "causation_id";

/// Delivery status of an outbox message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    #[default]
    Pending,
    Published,
    Failed,
}

/// A published domain event, encoded for hand-off to a broker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_id: Option<String>,
    pub event_version: u32,
    /// The event struct, bitcode encoded.
    #[serde(with = "payload_serde")]
    pub payload: Vec<u8>,
    /// Correlation and causation ids, plus anything set with `set_meta`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    pub occurred_at: DateTime<Utc>,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

mod payload_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(payload: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(payload).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

impl OutboxMessage {
    /// Encode `event` as a pending message. Metadata carries the event's
    /// correlation and causation ids when it has them.
    pub fn from_event(event: &dyn DomainEvent) -> Result<Self, OutboxError> {
        let payload = event.encode_payload().map_err(|source| OutboxError::Encode {
            event_type: event.event_type().to_string(),
            source,
        })?;
        let meta = event.metadata();

        let mut metadata = HashMap::new();
        if let Some(id) = &meta.correlation_id {
            metadata.insert(CORRELATION_ID.to_string(), id.clone());
        }
        if let Some(id) = &meta.causation_id {
            metadata.insert(CAUSATION_ID.to_string(), id.clone());
        }

        Ok(OutboxMessage {
            id: Uuid::new_v4(),
            event_id: meta.event_id,
            event_type: event.event_type().to_string(),
            aggregate_id: meta.aggregate_id.clone(),
            event_version: meta.event_version,
            payload,
            metadata,
            occurred_at: meta.occurred_at,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
        })
    }

    /// Decode the payload back into the event struct.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        decode_payload(&self.payload)
    }

    pub fn is_pending(&self) -> bool {
        self.status == OutboxStatus::Pending
    }

    pub fn is_published(&self) -> bool {
        self.status == OutboxStatus::Published
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutboxStatus::Failed
    }

    /// Count a delivery attempt on a pending message.
    pub fn record_attempt(&mut self) {
        if self.is_pending() {
            self.attempts += 1;
        }
    }

    pub fn complete(&mut self) {
        if self.is_pending() {
            self.status = OutboxStatus::Published;
            self.last_error = None;
        }
    }

    /// Keep the message pending for a later attempt.
    pub fn release(&mut self, error: impl Into<String>) {
        if self.is_pending() {
            self.last_error = non_empty(error.into());
        }
    }

    /// Give up on the message.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.is_pending() {
            self.status = OutboxStatus::Failed;
            self.last_error = non_empty(error.into());
        }
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|s| s.as_str())
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.meta(CORRELATION_ID)
    }

    pub fn causation_id(&self) -> Option<&str> {
        self.meta(CAUSATION_ID)
    }

    /// JSON envelope with the payload base64 encoded.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn non_empty(error: String) -> Option<String> {
    if error.is_empty() {
        None
    } else {
        Some(error)
    }
}
