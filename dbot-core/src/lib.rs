//! # dbot-core
//!
//! Core types and traits for the update pipeline: [`Update`] and its payloads, [`CommandScope`],
//! the outbound [`Bot`] transport, the remote [`UpdateSource`] and [`CommandRegistrar`], and tracing
//! initialization. Transport-agnostic; used by bot-runtime and dbot-telegram.

pub mod bot;
pub mod error;
pub mod logger;
pub mod scope;
pub mod source;
pub mod types;

pub use bot::{Bot, ParseMode, SendOptions};
pub use error::{DbotError, HandlerError, Result};
pub use logger::init_tracing;
pub use scope::{CommandScope, ScopeKind};
pub use source::{BotCommand, CommandRegistrar, GetUpdates, UpdateSource};
pub use types::{CallbackQuery, Chat, Message, Update, UpdateKind, User};
