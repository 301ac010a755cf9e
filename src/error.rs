//! Error types for the chat server
//!
//! Defines fatal per-session errors and the soft registry errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Fatal per-session errors
///
/// Any of these terminates the whole session: the supervisor cancels the
/// sibling task and teardown removes the client from the registry.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error on the connection (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The client's message queue closed underneath the session (fatal -
    /// only observable during teardown races)
    #[error("client message queue closed")]
    QueueClosed,
}

/// Registration conflict: the requested name is already taken.
///
/// Consumed inside name negotiation; never fatal.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("the name {0} is already in use")]
pub struct AlreadyExists(pub String);

/// Targeted operation addressed a name that is not registered.
///
/// A soft error: surfaced to the sender only, the session continues.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no such client: {0}")]
pub struct NoSuchClient(pub String);
