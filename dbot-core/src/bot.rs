//! Outbound reply transport.
//!
//! [`Bot`] is transport-agnostic; `dbot-telegram` implements it via teloxide.

use crate::error::Result;
use crate::types::{Chat, Message};
use async_trait::async_trait;

/// Text formatting mode for outgoing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Markdown,
    MarkdownV2,
    Html,
}

/// Per-message send options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub parse_mode: Option<ParseMode>,
    pub disable_web_page_preview: bool,
    pub reply_to_message_id: Option<i32>,
    /// Overrides the target chat (the chat passed to `send_message` is used otherwise).
    pub chat_id: Option<i64>,
}

impl SendOptions {
    pub fn markdown() -> Self {
        Self {
            parse_mode: Some(ParseMode::Markdown),
            disable_web_page_preview: true,
            ..Self::default()
        }
    }

    pub fn html() -> Self {
        Self {
            parse_mode: Some(ParseMode::Html),
            disable_web_page_preview: true,
            ..Self::default()
        }
    }

    pub fn with_parse_mode(mut self, mode: ParseMode) -> Self {
        self.parse_mode = Some(mode);
        self
    }

    pub fn with_disable_web_page_preview(mut self, disable: bool) -> Self {
        self.disable_web_page_preview = disable;
        self
    }

    pub fn reply_to(mut self, message_id: i32) -> Self {
        self.reply_to_message_id = Some(message_id);
        self
    }

    pub fn with_chat_id(mut self, chat_id: i64) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    /// Chat the message goes to: the override if set, else `chat`.
    pub fn target_chat(&self, chat: &Chat) -> i64 {
        self.chat_id.unwrap_or(chat.id)
    }
}

/// Abstraction for sending messages. Implementations map to a transport (e.g. Telegram).
#[async_trait]
pub trait Bot: Send + Sync {
    /// Sends a text message to the given chat.
    async fn send_message(&self, chat: &Chat, text: &str, options: &SendOptions) -> Result<()>;

    /// Sends a reply quoting the given message (same chat).
    async fn reply_to(&self, message: &Message, text: &str) -> Result<()> {
        let options = SendOptions::default().reply_to(message.id);
        self.send_message(&message.chat, text, &options).await
    }
}
