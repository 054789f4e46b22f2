//! Dispatchers: commands and queries to their single handler, events to
//! every subscriber.

mod command;
mod event;
mod query;

pub use command::{CommandDispatcher, CommandOutcome};
pub use event::{EventDispatcher, PublicationReport, PublishMode};
pub use query::QueryDispatcher;
