//! Handler traits: what runs per update, what receives errors, what receives panics.
//!
//! Command, undefined-command and generic update handlers all implement [`Handler`]. Errors they
//! return go to the [`ErrorHandler`]; panics are caught at the dispatch boundary and go to the
//! [`PanicHandler`].

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic;
use std::sync::{Arc, Once};

use async_trait::async_trait;
use dbot_core::Result;
use futures::future::BoxFuture;
use tracing::{debug, error};

use crate::context::Context;
use crate::error::DispatchError;

/// Reply sent when a command has no handler and no undefined-command handler is configured.
pub const UNRECOGNIZED_COMMAND_REPLY: &str = "Unrecognized command!!!";

/// Processes one update.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &Context) -> Result<()>;
}

/// [`Handler`] backed by a closure returning a boxed future. Built by [`handler_fn`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a Context) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    async fn handle(&self, ctx: &Context) -> Result<()> {
        (self.0)(ctx).await
    }
}

/// Wraps a closure as a handler:
///
/// ```ignore
/// let ping = handler_fn(|ctx| Box::pin(async move { ctx.reply_text("pong").await }));
/// ```
pub fn handler_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: for<'a> Fn(&'a Context) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Receives every runtime error of the pipeline. Must not block.
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, err: DispatchError);
}

impl<F> ErrorHandler for F
where
    F: Fn(DispatchError) + Send + Sync,
{
    fn handle_error(&self, err: DispatchError) {
        self(err)
    }
}

/// Default error handler: logs at debug level and discards.
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn handle_error(&self, err: DispatchError) {
        debug!(error = %err, update_id = ?err.update_id(), "dispatch error discarded");
    }
}

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static CAPTURED: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

/// Chains a panic hook that records the backtrace at the panic site while a handler is polled.
/// The previous hook still runs.
pub(crate) fn install_backtrace_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURING.with(Cell::get) {
                CAPTURED.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            }
            previous(info);
        }));
    });
}

/// Marks the current thread as polling a handler; restores the previous mark on drop.
pub(crate) struct CaptureGuard {
    previous: bool,
}

impl CaptureGuard {
    pub(crate) fn enter() -> Self {
        Self {
            previous: CAPTURING.with(|c| c.replace(true)),
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURING.with(|c| c.set(self.previous));
    }
}

/// Takes the backtrace recorded by the last captured panic on this thread.
pub(crate) fn take_captured_backtrace() -> Option<Backtrace> {
    CAPTURED.with(|slot| slot.borrow_mut().take())
}

/// Value recovered from a panicking handler, with the stack at the panic site when it was captured.
pub struct PanicPayload {
    payload: Box<dyn Any + Send>,
    backtrace: Option<Backtrace>,
}

impl PanicPayload {
    pub fn new(payload: Box<dyn Any + Send>) -> Self {
        Self {
            payload,
            backtrace: None,
        }
    }

    pub fn with_backtrace(mut self, backtrace: Option<Backtrace>) -> Self {
        self.backtrace = backtrace;
        self
    }

    /// Stack where the handler panicked.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_ref()
    }

    /// Panic message when the payload is a string, a placeholder otherwise.
    pub fn message(&self) -> String {
        if let Some(s) = self.payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = self.payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        }
    }

    pub fn into_inner(self) -> Box<dyn Any + Send> {
        self.payload
    }
}

impl std::fmt::Debug for PanicPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PanicPayload").field(&self.message()).finish()
    }
}

/// Called once per contained panic, with the context of the update that panicked.
#[async_trait]
pub trait PanicHandler: Send + Sync {
    async fn handle_panic(&self, ctx: &Context, panic: PanicPayload);
}

/// Default panic handler: logs, then forwards a [`DispatchError::Panic`] with the stack to the error handler.
/// Sends nothing to the user.
pub struct DefaultPanicHandler {
    errors: Arc<dyn ErrorHandler>,
}

impl DefaultPanicHandler {
    pub fn new(errors: Arc<dyn ErrorHandler>) -> Self {
        Self { errors }
    }
}

#[async_trait]
impl PanicHandler for DefaultPanicHandler {
    async fn handle_panic(&self, ctx: &Context, panic: PanicPayload) {
        let message = panic.message();
        let backtrace = match panic.backtrace() {
            Some(trace) => trace.to_string(),
            None => Backtrace::force_capture().to_string(),
        };
        error!(update_id = ctx.update().id, panic = %message, "handler panicked");
        self.errors.handle_error(DispatchError::Panic {
            update_id: ctx.update().id,
            message,
            backtrace,
        });
    }
}

/// Built-in undefined-command handler.
pub struct UnrecognizedCommandReply;

#[async_trait]
impl Handler for UnrecognizedCommandReply {
    async fn handle(&self, ctx: &Context) -> Result<()> {
        ctx.reply_text(UNRECOGNIZED_COMMAND_REPLY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_panic_payload_message() {
        assert_eq!(PanicPayload::new(Box::new("boom")).message(), "boom");
        assert_eq!(
            PanicPayload::new(Box::new(String::from("owned boom"))).message(),
            "owned boom"
        );
        assert_eq!(
            PanicPayload::new(Box::new(42_u32)).message(),
            "non-string panic payload"
        );
    }

    #[test]
    fn test_closure_error_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: Arc<dyn ErrorHandler> = Arc::new(move |err: DispatchError| {
            sink.lock().unwrap().push(err.update_id());
        });

        handler.handle_error(DispatchError::Timeout {
            update_id: 3,
            timeout: std::time::Duration::from_millis(5),
        });
        assert_eq!(*seen.lock().unwrap(), vec![Some(3)]);
    }
}
