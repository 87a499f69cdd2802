//! Remote collaborators of the update pipeline: where updates come from and where commands are registered.

use crate::error::Result;
use crate::scope::CommandScope;
use crate::types::Update;
use async_trait::async_trait;

/// Parameters of one long-poll retrieval call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetUpdates {
    /// Smallest update id not yet acknowledged.
    pub offset: i64,
    /// Max updates per batch (1..=100).
    pub limit: u8,
    /// Server-side long-poll timeout in seconds.
    pub timeout_secs: u32,
    /// Update types to receive; empty means the server default.
    pub allowed_updates: Vec<String>,
}

/// Remote update source. A call may block up to `timeout_secs`.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Returns the next batch of updates with `id >= request.offset`, in increasing id order.
    async fn get_updates(&self, request: &GetUpdates) -> Result<Vec<Update>>;
}

/// A (name, description) pair as shown in the client's command menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

impl BotCommand {
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

/// Remote command registrar. Best-effort; failures are surfaced to the caller.
#[async_trait]
pub trait CommandRegistrar: Send + Sync {
    /// Replaces the command list for `scope`. An unscoped bucket registers without a scope selector.
    async fn set_commands(&self, scope: &CommandScope, commands: &[BotCommand]) -> Result<()>;
}
