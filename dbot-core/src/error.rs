//! Error types for the bot core.
//!
//! [`DbotError`] is the top-level error; [`HandlerError`] is used for handler failures.

use thiserror::Error;

/// Top-level error for dbot (bot transport, handler, config, IO, cancellation).
#[derive(Error, Debug)]
pub enum DbotError {
    #[error("Bot error: {0}")]
    Bot(String),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The surrounding cancellation token fired while the call was in flight.
    #[error("Operation canceled")]
    Canceled,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DbotError {
    /// Reports whether this error is the cancellation signal rather than a real failure.
    pub fn is_canceled(&self) -> bool {
        matches!(self, DbotError::Canceled)
    }
}

/// Errors produced by handlers (no text, no chat to reply to, invalid command, auth, state, empty content).
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("No text in message")]
    NoText,

    #[error("No chat to reply to")]
    NoChat,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Unauthorized access")]
    Unauthorized,

    #[error("State error: {0}")]
    State(String),

    #[error("Empty content")]
    EmptyContent,
}

/// Result type for core operations; uses [`DbotError`].
pub type Result<T> = std::result::Result<T, DbotError>;
