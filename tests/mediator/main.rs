//! Mediator integration tests: dispatch, pipeline behaviors, unit of work
//! and event publication over a small bank-account domain.

mod events;
mod unit_of_work;

#[cfg(feature = "outbox")]
mod outbox;
