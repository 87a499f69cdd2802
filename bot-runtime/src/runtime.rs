//! Lifecycle of the update pipeline: build, run, stop, drain.
//!
//! ```text
//! Poller ──► bounded queue ──► worker loops ──► Dispatcher ──► handler
//!                                  │
//!                                  ├─ Workers(n): n loops dispatch inline
//!                                  ├─ TaskPool:   1 loop submits to the pool
//!                                  └─ Unbounded:  1 loop spawns a task per update
//! ```
//!
//! [`BotRuntime::run`] optionally registers commands, starts the loops and the poller, and returns
//! once shutdown is complete. [`BotRuntime::stop`] cancels the root token; after the loops exit,
//! updates still queued are dispatched concurrently (drain on) or discarded (drain off), then the
//! [`ShutdownSignal`] completes.
//!
//! Delivery: the offset advances when an update is accepted into the queue, before it is handled.
//! Offsets live in memory only, so a crash loses queued and in-flight updates (at most once).

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use dbot_core::{Bot, CommandRegistrar, Update, UpdateSource};
use futures::future::BoxFuture;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::command::{Command, CommandTable};
use crate::config::RuntimeConfig;
use crate::context::ContextPool;
use crate::dispatcher::{Dispatcher, Handlers};
use crate::error::{CommandError, ConfigError, DispatchError, RuntimeError, SubmitError};
use crate::handler::{
    DefaultPanicHandler, ErrorHandler, Handler, LogErrorHandler, PanicHandler,
    UnrecognizedCommandReply,
};
use crate::poller::{OffsetHandle, Poller};
use crate::pool::TaskPool;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;

/// How dispatches are executed. Chosen once when the runtime is built.
#[derive(Clone)]
pub enum ExecutionMode {
    /// Fixed number of loops, each dispatching one update at a time.
    Workers(usize),
    /// Submit-and-forget to an external pool.
    TaskPool(Arc<dyn TaskPool>),
    /// One spawned task per update.
    Unbounded,
}

impl fmt::Debug for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Workers(n) => write!(f, "Workers({})", n),
            ExecutionMode::TaskPool(_) => write!(f, "TaskPool"),
            ExecutionMode::Unbounded => write!(f, "Unbounded"),
        }
    }
}

/// Completes when shutdown (loops exited, drain finished) is done.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    done: CancellationToken,
}

impl ShutdownSignal {
    pub async fn wait(&self) {
        self.done.cancelled().await
    }

    pub fn is_complete(&self) -> bool {
        self.done.is_cancelled()
    }
}

/// Update pipeline: poller, bounded queue, workers, dispatcher.
///
/// Commands may only be added before the runtime is shared (`Arc`) and run.
pub struct BotRuntime {
    config: RuntimeConfig,
    dispatcher: Dispatcher,
    source: Arc<dyn UpdateSource>,
    registrar: Option<Arc<dyn CommandRegistrar>>,
    errors: Arc<dyn ErrorHandler>,
    mode: ExecutionMode,
    sender: mpsc::Sender<Update>,
    receiver: Mutex<mpsc::Receiver<Update>>,
    root: CancellationToken,
    done: CancellationToken,
    state: AtomicU8,
    offset: OffsetHandle,
    spawned: TaskTracker,
}

impl BotRuntime {
    pub fn builder(source: Arc<dyn UpdateSource>, bot: Arc<dyn Bot>) -> BotRuntimeBuilder {
        BotRuntimeBuilder::new(source, bot)
    }

    /// Adds commands.
    ///
    /// # Panics
    /// On an invalid or duplicate command; see [`CommandTable::add_commands`].
    pub fn add_commands(&mut self, commands: impl IntoIterator<Item = Command>) {
        self.dispatcher.commands_mut().add_commands(commands);
    }

    pub fn try_add_commands(
        &mut self,
        commands: impl IntoIterator<Item = Command>,
    ) -> Result<(), CommandError> {
        self.dispatcher.commands_mut().try_add_commands(commands)
    }

    pub fn commands(&self) -> &CommandTable {
        self.dispatcher.commands()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn mode(&self) -> &ExecutionMode {
        &self.mode
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Smallest update id not yet accepted into the queue.
    pub fn offset(&self) -> i64 {
        self.offset.get()
    }

    /// Updates currently waiting in the bounded queue.
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Root token; canceled by [`BotRuntime::stop`] or by the parent token given to the builder.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.root
    }

    /// Registers commands (when enabled), runs until stopped, drains, and returns.
    ///
    /// Errors only when command registration fails (nothing has started then; `run` may be
    /// retried unless the runtime was stopped meanwhile) or when the runtime is already running.
    /// A stop during registration abandons it and returns `Ok`.
    #[instrument(skip(self))]
    pub async fn run(self: Arc<Self>) -> Result<(), RuntimeError> {
        if self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            if self.state.load(Ordering::SeqCst) == FINISHED {
                debug!("run called after shutdown, nothing to do");
                return Ok(());
            }
            return Err(RuntimeError::AlreadyRunning);
        }

        if self.config.auto_setup_commands {
            let setup = tokio::select! {
                biased;
                _ = self.root.cancelled() => None,
                result = self.setup_commands() => Some(result),
            };
            match setup {
                None => {
                    info!("stopped during command registration");
                    self.finish().await;
                    return Ok(());
                }
                Some(Err(e)) => {
                    error!(error = %e, "command registration failed, not starting");
                    self.state.store(IDLE, Ordering::SeqCst);
                    // A stop that raced the failure saw RUNNING and left completion to us.
                    if self.root.is_cancelled() {
                        self.complete_if_idle();
                    }
                    return Err(e);
                }
                Some(Ok(())) => {}
            }
        }

        let loops = match self.mode {
            ExecutionMode::Workers(n) => n,
            ExecutionMode::TaskPool(_) | ExecutionMode::Unbounded => 1,
        };
        let mut workers = JoinSet::new();
        for worker in 0..loops {
            workers.spawn(Arc::clone(&self).worker_loop(worker));
        }

        let poller = Poller::new(
            Arc::clone(&self.source),
            self.sender.clone(),
            self.root.clone(),
            Arc::clone(&self.errors),
            &self.config,
        )
        .with_offset_handle(self.offset.clone());
        let poller = tokio::spawn(poller.run());

        info!(mode = ?self.mode, queue_capacity = self.config.queue_capacity(), "bot runtime started");

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker loop aborted");
            }
        }
        match poller.await {
            Ok(offset) => debug!(offset, "poller joined"),
            Err(e) => error!(error = %e, "poller task aborted"),
        }

        self.finish().await;
        Ok(())
    }

    /// Cancels the root token and returns a signal that completes after full shutdown.
    pub fn stop(&self) -> ShutdownSignal {
        info!("stop requested");
        self.root.cancel();
        self.complete_if_idle();
        ShutdownSignal {
            done: self.done.clone(),
        }
    }

    /// Marks an idle runtime finished and completes the shutdown signal.
    fn complete_if_idle(&self) {
        if self
            .state
            .compare_exchange(IDLE, FINISHED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.done.cancel();
        }
    }

    #[instrument(skip(self))]
    async fn setup_commands(&self) -> Result<(), RuntimeError> {
        let Some(registrar) = &self.registrar else {
            return Ok(());
        };
        for (scope, commands) in self.commands().registrations() {
            info!(scope = %scope, count = commands.len(), "registering commands");
            registrar
                .set_commands(&scope, &commands)
                .await
                .map_err(|source| RuntimeError::Registration {
                    scope: scope.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    async fn worker_loop(self: Arc<Self>, worker: usize) {
        debug!(worker, "worker started");
        while let Some(update) = self.next_update().await {
            match &self.mode {
                ExecutionMode::Workers(_) => self.dispatcher.dispatch(update).await,
                ExecutionMode::TaskPool(pool) => self.submit(pool.as_ref(), update),
                ExecutionMode::Unbounded => {
                    let rt = Arc::clone(&self);
                    self.spawned
                        .spawn(async move { rt.dispatcher.dispatch(update).await });
                }
            }
        }
        debug!(worker, "worker stopped");
    }

    /// Next queued update, or `None` once the root token is canceled.
    async fn next_update(&self) -> Option<Update> {
        let mut receiver = tokio::select! {
            biased;
            _ = self.root.cancelled() => return None,
            receiver = self.receiver.lock() => receiver,
        };
        tokio::select! {
            biased;
            _ = self.root.cancelled() => None,
            update = receiver.recv() => update,
        }
    }

    fn submit(self: &Arc<Self>, pool: &dyn TaskPool, update: Update) {
        let update_id = update.id;
        let result = if pool.is_closed() {
            Err(SubmitError::Closed)
        } else {
            let rt = Arc::clone(self);
            let task: BoxFuture<'static, ()> =
                Box::pin(async move { rt.dispatcher.dispatch(update).await });
            pool.submit(task)
        };
        if let Err(source) = result {
            warn!(update_id, error = %source, "task pool rejected update, dropped");
            self.dispatcher
                .report(DispatchError::Submit { update_id, source });
        }
    }

    /// Waits for spawned dispatches, drains or discards the queue, and signals completion.
    async fn finish(self: &Arc<Self>) {
        self.spawned.close();
        self.spawned.wait().await;

        let pending: Vec<Update> = {
            let mut receiver = self.receiver.lock().await;
            let mut pending = Vec::new();
            while let Ok(update) = receiver.try_recv() {
                pending.push(update);
            }
            pending
        };

        if self.config.drain_on_stop {
            if !pending.is_empty() {
                info!(count = pending.len(), "draining queued updates");
            }
            let mut drain = JoinSet::new();
            for update in pending {
                let rt = Arc::clone(self);
                drain.spawn(async move { rt.dispatcher.dispatch(update).await });
            }
            while let Some(joined) = drain.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "drain task aborted");
                }
            }
        } else if !pending.is_empty() {
            warn!(count = pending.len(), "discarding queued updates");
        }

        self.state.store(FINISHED, Ordering::SeqCst);
        self.done.cancel();
        info!(offset = self.offset(), "shutdown complete");
    }
}

/// Builder for [`BotRuntime`]. Unset handlers fall back to the defaults in [`crate::handler`].
pub struct BotRuntimeBuilder {
    source: Arc<dyn UpdateSource>,
    bot: Arc<dyn Bot>,
    registrar: Option<Arc<dyn CommandRegistrar>>,
    config: RuntimeConfig,
    parent: Option<CancellationToken>,
    task_pool: Option<Arc<dyn TaskPool>>,
    updates_handler: Option<Arc<dyn Handler>>,
    undefined_command_handler: Option<Arc<dyn Handler>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    panic_handler: Option<Arc<dyn PanicHandler>>,
    commands: CommandTable,
}

impl BotRuntimeBuilder {
    fn new(source: Arc<dyn UpdateSource>, bot: Arc<dyn Bot>) -> Self {
        Self {
            source,
            bot,
            registrar: None,
            config: RuntimeConfig::default(),
            parent: None,
            task_pool: None,
            updates_handler: None,
            undefined_command_handler: None,
            error_handler: None,
            panic_handler: None,
            commands: CommandTable::new(),
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Registrar used for command auto-setup.
    pub fn registrar(mut self, registrar: Arc<dyn CommandRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    /// Process-wide token; the runtime's root token is derived from it.
    pub fn with_cancellation(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Dispatch through an external pool instead of fixed workers.
    pub fn task_pool(mut self, pool: Arc<dyn TaskPool>) -> Self {
        self.task_pool = Some(pool);
        self
    }

    /// Handler for every update that is not a command.
    pub fn updates_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.updates_handler = Some(handler);
        self
    }

    /// Handler for commands that have no registered handler.
    pub fn undefined_command_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.undefined_command_handler = Some(handler);
        self
    }

    pub fn error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn panic_handler(mut self, handler: Arc<dyn PanicHandler>) -> Self {
        self.panic_handler = Some(handler);
        self
    }

    /// Adds commands.
    ///
    /// # Panics
    /// On an invalid or duplicate command; see [`CommandTable::add_commands`].
    pub fn commands(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.commands.add_commands(commands);
        self
    }

    /// Validates the configuration and assembles the runtime.
    pub fn build(self) -> Result<BotRuntime, ConfigError> {
        match self.config.validate() {
            Err(ConfigError::NoWorkers) if self.task_pool.is_some() => {}
            result => result?,
        }
        if self.config.auto_setup_commands && self.registrar.is_none() {
            return Err(ConfigError::MissingRegistrar);
        }

        let root = match &self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };

        let errors: Arc<dyn ErrorHandler> = self
            .error_handler
            .unwrap_or_else(|| Arc::new(LogErrorHandler));
        let panic: Arc<dyn PanicHandler> = self
            .panic_handler
            .unwrap_or_else(|| Arc::new(DefaultPanicHandler::new(Arc::clone(&errors))));
        let handlers = Handlers {
            updates: self.updates_handler,
            undefined_command: self
                .undefined_command_handler
                .unwrap_or_else(|| Arc::new(UnrecognizedCommandReply)),
            error: Arc::clone(&errors),
            panic,
        };

        let pool = ContextPool::new(self.bot, self.config.context_pooling);
        let dispatcher = Dispatcher::new(
            self.commands,
            handlers,
            pool,
            root.clone(),
            self.config.effective_handler_timeout(),
        );

        let mode = match self.task_pool {
            Some(pool) => ExecutionMode::TaskPool(pool),
            None if self.config.unbounded_concurrency => ExecutionMode::Unbounded,
            None => ExecutionMode::Workers(self.config.workers),
        };

        let (sender, receiver) = mpsc::channel(self.config.queue_capacity());
        let offset = OffsetHandle::new(self.config.initial_offset);

        Ok(BotRuntime {
            config: self.config,
            dispatcher,
            source: self.source,
            registrar: self.registrar,
            errors,
            mode,
            sender,
            receiver: Mutex::new(receiver),
            root,
            done: CancellationToken::new(),
            state: AtomicU8::new(IDLE),
            offset,
            spawned: TaskTracker::new(),
        })
    }
}
