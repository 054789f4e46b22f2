use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::EventMetadata;
use crate::error::PayloadError;

/// Gives trait objects access to their concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An immutable fact about something that already happened inside an
/// aggregate.
///
/// Events carry a type tag, [`EventMetadata`] (including the occurrence
/// time), and a payload: the event struct itself, encodable for hand-off to
/// an outbox. Use [`impl_domain_event!`](crate::impl_domain_event) for
/// serde-serializable structs.
pub trait DomainEvent: AsAny + fmt::Debug + Send + Sync {
    /// Stable type tag (e.g. `"account.opened"`).
    fn event_type(&self) -> &str;

    fn metadata(&self) -> &EventMetadata;

    /// Encode the payload as bytes.
    fn encode_payload(&self) -> Result<Vec<u8>, PayloadError>;

    fn event_id(&self) -> Uuid {
        self.metadata().event_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.metadata().occurred_at
    }
}

/// A recorded event, shared between the recorder that drained it and the
/// subscribers it is published to.
pub type SharedEvent = Arc<dyn DomainEvent>;

impl dyn DomainEvent {
    /// `TypeId` of the concrete event type behind this trait object.
    pub fn concrete_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }

    pub fn is<E: DomainEvent>(&self) -> bool {
        self.as_any().is::<E>()
    }

    pub fn downcast_ref<E: DomainEvent>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }
}

/// Encode a payload with bitcode.
pub fn encode_payload<T: Serialize + ?Sized>(payload: &T) -> Result<Vec<u8>, PayloadError> {
    bitcode::serialize(payload).map_err(PayloadError::Encode)
}

/// Decode a bitcode payload.
pub fn decode_payload<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, PayloadError> {
    bitcode::deserialize(bytes).map_err(PayloadError::Decode)
}

/// Implement [`DomainEvent`] for a serde-serializable struct.
///
/// ```ignore
/// #[derive(Debug, Serialize, Deserialize)]
/// pub struct AccountOpened {
///     #[serde(skip)]
///     pub metadata: EventMetadata,
///     pub account_id: String,
/// }
///
/// structus::impl_domain_event!(AccountOpened, "account.opened", metadata);
/// ```
#[macro_export]
macro_rules! impl_domain_event {
    ($ty:ty, $tag:expr, $metadata:ident) => {
        impl $crate::DomainEvent for $ty {
            fn event_type(&self) -> &str {
                $tag
            }

            fn metadata(&self) -> &$crate::EventMetadata {
                &self.$metadata
            }

            fn encode_payload(&self) -> Result<Vec<u8>, $crate::PayloadError> {
                $crate::encode_payload(self)
            }
        }
    };
}
