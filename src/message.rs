use std::fmt;

/// A request expressing intent to change state.
///
/// Each command type is bound to exactly one [`CommandHandler`](crate::CommandHandler).
/// `Output` is what the handler hands back on success: `()`, an identifier,
/// or a small result value.
pub trait Command: Send + Sync + 'static {
    type Output: Send + 'static;
}

/// A request expressing intent to read state without side effects.
///
/// Each query type is bound to exactly one [`QueryHandler`](crate::QueryHandler).
pub trait Query: Send + Sync + 'static {
    type Output: Send + 'static;
}

/// Which side of the command/query split a dispatch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Command,
    Query,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Command => write!(f, "command"),
            RequestKind::Query => write!(f, "query"),
        }
    }
}
