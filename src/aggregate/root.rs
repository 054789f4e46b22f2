use crate::event::{DomainEvent, EventRecorder, SharedEvent};

/// A consistency boundary that owns state and records domain events as a
/// result of its state changes.
///
/// The aggregate holds its [`EventRecorder`] by composition; implementors
/// only expose it. Domain methods call [`record_event`](Self::record_event)
/// after mutating state.
pub trait AggregateRoot: Send {
    fn recorder(&self) -> &EventRecorder;
    fn recorder_mut(&mut self) -> &mut EventRecorder;

    fn record_event<E: DomainEvent>(&mut self, event: E)
    where
        Self: Sized,
    {
        self.recorder_mut().record(event);
    }

    /// Take all pending events and clear them.
    fn drain_events(&mut self) -> Vec<SharedEvent> {
        self.recorder_mut().drain_all()
    }

    fn pending_events(&self) -> Vec<SharedEvent> {
        self.recorder().peek()
    }

    fn pending_event_count(&self) -> usize {
        self.recorder().len()
    }

    fn has_pending_events(&self) -> bool {
        !self.recorder().is_empty()
    }
}

/// Implement [`AggregateRoot`] for a struct holding an [`EventRecorder`] field.
///
/// ```ignore
/// #[derive(Default)]
/// pub struct Account {
///     events: EventRecorder,
///     balance: i64,
/// }
///
/// structus::impl_aggregate_root!(Account, events);
/// ```
#[macro_export]
macro_rules! impl_aggregate_root {
    ($ty:ty, $recorder:ident) => {
        impl $crate::AggregateRoot for $ty {
            fn recorder(&self) -> &$crate::EventRecorder {
                &self.$recorder
            }

            fn recorder_mut(&mut self) -> &mut $crate::EventRecorder {
                &mut self.$recorder
            }
        }
    };
}
