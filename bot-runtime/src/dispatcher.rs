//! Dispatcher: resolves and runs the handler for one update.
//!
//! ## Routing
//! - command with a registered handler → that handler
//! - command without one → undefined-command handler (built-in reply by default)
//! - anything else → generic update handler, or nothing when none is configured
//!
//! ## Fault barrier
//! Every handler call runs under `catch_unwind` and, when configured, `tokio::time::timeout`.
//! A returned error goes to the error handler, a panic to the panic handler, an elapsed deadline
//! cancels the update's token and goes to the error handler. The context is reset and pooled in
//! every case.

use std::future::poll_fn;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use dbot_core::{DbotError, Update};
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::command::CommandTable;
use crate::context::{Context, ContextPool};
use crate::error::DispatchError;
use crate::handler::{
    install_backtrace_hook, take_captured_backtrace, CaptureGuard, ErrorHandler, Handler,
    PanicHandler, PanicPayload,
};

/// Handlers the dispatcher routes to, besides the command table.
#[derive(Clone)]
pub struct Handlers {
    pub updates: Option<Arc<dyn Handler>>,
    pub undefined_command: Arc<dyn Handler>,
    pub error: Arc<dyn ErrorHandler>,
    pub panic: Arc<dyn PanicHandler>,
}

enum Outcome {
    Done,
    Failed(DbotError),
    TimedOut(Duration),
    Panicked(PanicPayload),
}

/// Routes updates to handlers and contains their failures.
pub struct Dispatcher {
    commands: CommandTable,
    handlers: Handlers,
    pool: ContextPool,
    root: CancellationToken,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        commands: CommandTable,
        handlers: Handlers,
        pool: ContextPool,
        root: CancellationToken,
        timeout: Option<Duration>,
    ) -> Self {
        install_backtrace_hook();
        Self {
            commands,
            handlers,
            pool,
            root,
            timeout: timeout.filter(|d| !d.is_zero()),
        }
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub(crate) fn commands_mut(&mut self) -> &mut CommandTable {
        &mut self.commands
    }

    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    /// Forwards a pipeline error to the configured error handler.
    pub fn report(&self, err: DispatchError) {
        self.handlers.error.handle_error(err);
    }

    /// Dispatches one update to completion. Never panics and never returns an error.
    #[instrument(skip(self, update), fields(update_id = update.id))]
    pub async fn dispatch(&self, update: Update) {
        let update_id = update.id;
        let token = self.root.child_token();
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let ctx = self.pool.acquire(update, token, deadline);

        let Some((handler, command)) = self.resolve(&ctx) else {
            debug!("no handler for update, skipped");
            return;
        };

        match self.run_guarded(handler.as_ref(), &ctx).await {
            Outcome::Done => debug!(command = ?command, "update handled"),
            Outcome::Failed(source) => self.report(DispatchError::Handler {
                update_id,
                command: command.map(str::to_string),
                source,
            }),
            Outcome::TimedOut(timeout) => {
                ctx.cancellation_token().cancel();
                self.report(DispatchError::Timeout { update_id, timeout });
            }
            Outcome::Panicked(payload) => self.handle_panic(&ctx, payload).await,
        }
    }

    /// Picks the handler for the update, with the command name when it is a command.
    fn resolve<'a>(&'a self, ctx: &'a Context) -> Option<(&'a Arc<dyn Handler>, Option<&'a str>)> {
        match ctx.command() {
            Some(name) => {
                let handler = self
                    .commands
                    .get(name)
                    .map(|cmd| &cmd.handler)
                    .unwrap_or(&self.handlers.undefined_command);
                Some((handler, Some(name)))
            }
            None => self.handlers.updates.as_ref().map(|h| (h, None)),
        }
    }

    async fn run_guarded(&self, handler: &dyn Handler, ctx: &Context) -> Outcome {
        let mut guarded = AssertUnwindSafe(handler.handle(ctx)).catch_unwind();
        // The panic hook records the stack only while this future is being polled.
        let call = poll_fn(move |cx| {
            let _capture = CaptureGuard::enter();
            guarded.poll_unpin(cx)
        });
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_elapsed) => return Outcome::TimedOut(limit),
            },
            None => call.await,
        };
        match result {
            Ok(Ok(())) => Outcome::Done,
            Ok(Err(e)) => Outcome::Failed(e),
            Err(payload) => Outcome::Panicked(
                PanicPayload::new(payload).with_backtrace(take_captured_backtrace()),
            ),
        }
    }

    async fn handle_panic(&self, ctx: &Context, payload: PanicPayload) {
        let call = AssertUnwindSafe(self.handlers.panic.handle_panic(ctx, payload)).catch_unwind();
        if let Err(nested) = call.await {
            error!(
                update_id = ctx.update().id,
                panic = %PanicPayload::new(nested).message(),
                "panic handler panicked"
            );
        }
    }
}
