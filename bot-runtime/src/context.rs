//! Per-update execution context and the pool that recycles it.
//!
//! A [`Context`] wraps one [`Update`], a cancellation token derived from the runtime's root token,
//! the optional deadline and the outbound [`Bot`]. [`ContextPool`] hands out contexts wrapped in a
//! [`PooledContext`] guard that resets the context (token canceled, update cleared) and returns it
//! to the free list when dropped, whatever way the handler finished. Pooling only saves
//! allocations; a disabled pool allocates every time and behaves identically otherwise.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dbot_core::{Bot, Chat, HandlerError, Message, Result, SendOptions, Update, User};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Execution context handed to handlers for one update.
pub struct Context {
    update: Update,
    token: CancellationToken,
    deadline: Option<Instant>,
    bot: Arc<dyn Bot>,
}

impl Context {
    fn new(bot: Arc<dyn Bot>) -> Self {
        Self {
            update: Update::default(),
            token: CancellationToken::new(),
            deadline: None,
            bot,
        }
    }

    pub fn update(&self) -> &Update {
        &self.update
    }

    /// Message, edited message, channel post or edited channel post; `None` otherwise.
    pub fn message(&self) -> Option<&Message> {
        self.update.message()
    }

    pub fn is_command(&self) -> bool {
        self.update.is_command()
    }

    /// Command name (without `/` and `@botname`) if the message is a command.
    pub fn command(&self) -> Option<&str> {
        self.update.command()
    }

    /// Text after the command token; empty when not a command.
    pub fn command_args(&self) -> &str {
        self.update.command_arguments()
    }

    pub fn sent_from(&self) -> Option<&User> {
        self.update.sent_from()
    }

    pub fn from_chat(&self) -> Option<&Chat> {
        self.update.from_chat()
    }

    pub fn bot(&self) -> &Arc<dyn Bot> {
        &self.bot
    }

    /// Canceled when the runtime stops, the deadline passes, or dispatch of this update ends.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once this update's context is canceled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Detached copy of this context (same update, deadline and bot) governed by `token`.
    ///
    /// For work a handler hands off elsewhere: the copy is not pooled and is not canceled when
    /// dispatch of the update ends unless `token` is. Pass a child of
    /// [`Context::cancellation_token`] to keep it tied to this update.
    pub fn with_token(&self, token: CancellationToken) -> Context {
        Context {
            update: self.update.clone(),
            token,
            deadline: self.deadline,
            bot: Arc::clone(&self.bot),
        }
    }

    /// Replies with plain text to the chat the update came from.
    pub async fn reply_text(&self, text: &str) -> Result<()> {
        self.reply_with(text, &SendOptions::default()).await
    }

    /// Replies with Markdown; web page preview disabled.
    pub async fn reply_markdown(&self, text: &str) -> Result<()> {
        self.reply_with(text, &SendOptions::markdown()).await
    }

    /// Replies with HTML; web page preview disabled.
    pub async fn reply_html(&self, text: &str) -> Result<()> {
        self.reply_with(text, &SendOptions::html()).await
    }

    /// Replies to the update's chat with explicit options. Fails with `NoChat` when the update has no chat.
    pub async fn reply_with(&self, text: &str, options: &SendOptions) -> Result<()> {
        let chat = self.from_chat().ok_or(HandlerError::NoChat)?;
        self.bot.send_message(chat, text, options).await
    }

    fn reset(&mut self) {
        self.token.cancel();
        self.update = Update::default();
        self.deadline = None;
    }
}

/// Free list of execution contexts. Grows without bound on miss.
pub struct ContextPool {
    free: Mutex<Vec<Box<Context>>>,
    bot: Arc<dyn Bot>,
    enabled: bool,
    allocated: AtomicUsize,
}

impl ContextPool {
    /// Creates a pool; with `enabled = false` every acquire allocates and release drops.
    pub fn new(bot: Arc<dyn Bot>, enabled: bool) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            bot,
            enabled,
            allocated: AtomicUsize::new(0),
        }
    }

    /// Takes a context (recycled or new) and attaches the update, token and deadline.
    pub fn acquire(
        &self,
        update: Update,
        token: CancellationToken,
        deadline: Option<Instant>,
    ) -> PooledContext<'_> {
        let recycled = if self.enabled {
            self.free
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .pop()
        } else {
            None
        };
        let mut ctx = recycled.unwrap_or_else(|| {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            Box::new(Context::new(Arc::clone(&self.bot)))
        });
        ctx.update = update;
        ctx.token = token;
        ctx.deadline = deadline;
        PooledContext {
            pool: self,
            ctx: Some(ctx),
        }
    }

    fn release(&self, mut ctx: Box<Context>) {
        ctx.reset();
        if self.enabled {
            self.free
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(ctx);
        }
    }

    /// Contexts currently sitting in the free list.
    pub fn idle(&self) -> usize {
        self.free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Contexts allocated over the pool's lifetime.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

/// Guard returning its context to the pool on drop.
pub struct PooledContext<'a> {
    pool: &'a ContextPool,
    ctx: Option<Box<Context>>,
}

impl Deref for PooledContext<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        // Only `drop` takes the box out.
        self.ctx.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.pool.release(ctx);
        }
    }
}
