//! # bot-runtime
//!
//! Update pipeline for dbot: one [`Poller`] fetches updates from an [`UpdateSource`] and feeds a
//! bounded queue, worker loops hand each update to the [`Dispatcher`], which routes it to a command
//! handler, the undefined-command handler or the generic update handler. Handler errors, panics and
//! timeouts are contained per update and reported to the [`ErrorHandler`].
//!
//! [`UpdateSource`]: dbot_core::UpdateSource

pub mod command;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod poller;
pub mod pool;
pub mod runtime;

pub use command::{Command, CommandTable};
pub use config::{RuntimeConfig, DEFAULT_POLL_LIMIT, DEFAULT_POLL_RETRY_DELAY, MAX_POLL_TIMEOUT_SECS};
pub use context::{Context, ContextPool, PooledContext};
pub use dispatcher::{Dispatcher, Handlers};
pub use error::{CommandError, ConfigError, DispatchError, RuntimeError, SubmitError};
pub use handler::{
    handler_fn, DefaultPanicHandler, ErrorHandler, FnHandler, Handler, LogErrorHandler,
    PanicHandler, PanicPayload, UnrecognizedCommandReply, UNRECOGNIZED_COMMAND_REPLY,
};
pub use poller::{OffsetHandle, Poller};
pub use pool::{BoundedTaskPool, TaskPool};
pub use runtime::{BotRuntime, BotRuntimeBuilder, ExecutionMode, ShutdownSignal};
pub use tokio_util::sync::CancellationToken;
