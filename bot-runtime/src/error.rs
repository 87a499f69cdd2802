//! Error types for the update pipeline.
//!
//! [`DispatchError`] is what the error handler receives at runtime. [`CommandError`] and
//! [`ConfigError`] are setup-time errors; [`RuntimeError`] is what `BotRuntime::run` returns.

use std::time::Duration;

use dbot_core::DbotError;
use thiserror::Error;

/// Runtime failures forwarded to the configured error handler. None of them stop the pipeline.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("handler failed on update {update_id}: {source}")]
    Handler {
        update_id: i64,
        /// Command name when the failing handler was a command handler.
        command: Option<String>,
        #[source]
        source: DbotError,
    },

    #[error("handler for update {update_id} exceeded timeout of {timeout:?}")]
    Timeout { update_id: i64, timeout: Duration },

    #[error("handler panicked on update {update_id}: {message}, stack: {backtrace}")]
    Panic {
        update_id: i64,
        message: String,
        backtrace: String,
    },

    #[error("failed to get updates, error: {0}")]
    Poll(#[source] DbotError),

    #[error("failed to submit update {update_id} to task pool: {source}")]
    Submit {
        update_id: i64,
        #[source]
        source: SubmitError,
    },
}

impl DispatchError {
    /// Update the error relates to; `None` for retrieval errors.
    pub fn update_id(&self) -> Option<i64> {
        match self {
            DispatchError::Handler { update_id, .. }
            | DispatchError::Timeout { update_id, .. }
            | DispatchError::Panic { update_id, .. }
            | DispatchError::Submit { update_id, .. } => Some(*update_id),
            DispatchError::Poll(_) => None,
        }
    }
}

/// Rejection from an external task pool.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("task pool is closed")]
    Closed,

    #[error("task pool is saturated")]
    Saturated,
}

/// Invalid command registration. Raised while commands are added, never at dispatch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("command name must be non-empty")]
    EmptyName,

    #[error("command description must be non-empty: {0}")]
    EmptyDescription(String),

    #[error("duplicate command name: {0}")]
    Duplicate(String),
}

/// Invalid [`crate::RuntimeConfig`] or builder wiring.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("poll limit must be within 1..=100, got {0}")]
    PollLimit(u8),

    #[error("poll timeout must be at most 50 seconds, got {0}")]
    PollTimeout(u32),

    #[error("worker count must be positive")]
    NoWorkers,

    #[error("auto setup of commands is enabled but no command registrar was configured")]
    MissingRegistrar,
}

/// Error returned by `BotRuntime::run`.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("failed to setup commands for scope {scope}, error: {source}")]
    Registration {
        scope: String,
        #[source]
        source: DbotError,
    },

    #[error("bot runtime is already running")]
    AlreadyRunning,
}
