mod domain_event;
mod metadata;
mod recorder;

pub use domain_event::{decode_payload, encode_payload, AsAny, DomainEvent, SharedEvent};
pub use metadata::EventMetadata;
pub use recorder::EventRecorder;
pub(crate) use recorder::RecorderHandle;
