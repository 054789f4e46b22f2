use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::{HandlerError, PublishError, SubscriberFailure};
use crate::event::{DomainEvent, SharedEvent};
use crate::registry::{ErasedSubscriber, HandlerRegistry, ResolvedSubscriber};

/// How the subscribers of one event are invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PublishMode {
    /// One after another, in registration order.
    #[default]
    Sequential,
    /// All at once; `publish` returns when every subscriber has finished.
    /// Failures are still reported in registration order.
    Concurrent,
}

/// Outcome of publishing the events of one unit of work.
#[derive(Debug, Default)]
pub struct PublicationReport {
    /// Events handed to [`EventDispatcher::publish`], failed or not.
    pub published: usize,
    /// One entry per event with at least one failed subscriber.
    pub failures: Vec<PublishError>,
}

impl PublicationReport {
    /// Whether every subscriber of every event succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_event_types(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.event_type.as_str()).collect()
    }
}

/// Delivers events to their subscribers with failure isolation: a failing
/// (or panicking) subscriber never keeps the others from running.
#[derive(Clone)]
pub struct EventDispatcher {
    registry: Arc<HandlerRegistry>,
    mode: PublishMode,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        EventDispatcher {
            registry,
            mode: PublishMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: PublishMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> PublishMode {
        self.mode
    }

    /// Deliver one event to every subscriber of its type, then to catch-all
    /// subscribers.
    ///
    /// Every subscriber is attempted. If any failed, the error names each of
    /// them; no subscriber means a successful no-op.
    pub async fn publish(&self, event: &dyn DomainEvent) -> Result<(), PublishError> {
        let subscribers = self.registry.resolve_subscribers(event);
        if subscribers.is_empty() {
            debug!(event = event.event_type(), "no subscribers");
            return Ok(());
        }

        let outcomes = match self.mode {
            PublishMode::Sequential => {
                let mut outcomes = Vec::with_capacity(subscribers.len());
                for subscriber in &subscribers {
                    outcomes.push(invoke(subscriber, event).await);
                }
                outcomes
            }
            PublishMode::Concurrent => join_all(subscribers.iter().map(|s| invoke(s, event))).await,
        };

        let failures: Vec<SubscriberFailure> = subscribers
            .into_iter()
            .zip(outcomes)
            .filter_map(|(subscriber, outcome)| {
                let error = outcome.err()?;
                warn!(
                    event = event.event_type(),
                    event_id = %event.event_id(),
                    subscriber = %subscriber.name,
                    error = %error,
                    "subscriber failed"
                );
                Some(SubscriberFailure {
                    subscriber: subscriber.name,
                    error,
                })
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PublishError {
                event_type: event.event_type().to_string(),
                failures,
            })
        }
    }

    /// Publish events one at a time, in order. Failures are collected, never
    /// short-circuit the remaining events.
    pub async fn publish_all(&self, events: Vec<SharedEvent>) -> PublicationReport {
        let mut report = PublicationReport::default();
        for event in events {
            if let Err(err) = self.publish(event.as_ref()).await {
                report.failures.push(err);
            }
            report.published += 1;
        }
        report
    }
}

async fn invoke(subscriber: &ResolvedSubscriber, event: &dyn DomainEvent) -> Result<(), HandlerError> {
    match AssertUnwindSafe(subscriber.handler.handle(event)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "subscriber panicked".to_string()
    }
}
