//! # dbot-telegram
//!
//! Telegram transport layer: adapters from teloxide types, and [`TelegramBotAdapter`], which
//! implements [`dbot_core::Bot`], [`dbot_core::UpdateSource`] and [`dbot_core::CommandRegistrar`]
//! over the Bot API. Also the transport config and the shutdown signal helper used by binaries.
//! Knows nothing about routing or workers; that is bot-runtime's job.

mod adapters;
mod bot_adapter;
mod config;
mod shutdown;

pub use adapters::{TelegramMessageWrapper, TelegramUpdateWrapper, TelegramUserWrapper};
pub use bot_adapter::TelegramBotAdapter;
pub use config::TelegramConfig;
pub use shutdown::wait_for_shutdown_signal;
