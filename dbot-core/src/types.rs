//! Core types: user, chat, message, callback query and the [`Update`] envelope.
//!
//! An [`Update`] carries at most one payload ([`UpdateKind`]) and is identified by a strictly
//! increasing `id` assigned by the remote service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User identity (id, username, names).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub is_bot: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
}

/// Chat (channel, group or private) identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub chat_type: String,
}

/// A single message with sender, chat, text content and optional reply context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i32,
    /// Sender; `None` for channel posts.
    pub user: Option<User>,
    pub chat: Chat,
    /// Text or caption; empty for media without caption.
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub reply_to_message_id: Option<i32>,
}

impl Message {
    /// Reports whether the text starts with a command token (`/name`).
    pub fn is_command(&self) -> bool {
        split_command(&self.content).is_some()
    }

    /// Command name without the leading `/` and any `@botname` suffix.
    pub fn command(&self) -> Option<&str> {
        split_command(&self.content).map(|(name, _)| name)
    }

    /// Everything after the command token, with leading whitespace removed. Empty when not a command.
    pub fn command_arguments(&self) -> &str {
        split_command(&self.content)
            .map(|(_, args)| args)
            .unwrap_or("")
    }
}

/// Splits `/name@bot args` into (`name`, `args`). `/` alone or `/@bot` is not a command.
fn split_command(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix('/')?;
    let (token, args) = match rest.find(char::is_whitespace) {
        Some(i) => (&rest[..i], rest[i..].trim_start()),
        None => (rest, ""),
    };
    let name = token.split_once('@').map_or(token, |(name, _)| name);
    if name.is_empty() {
        return None;
    }
    Some((name, args))
}

/// Inline keyboard button press.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    /// Message the button was attached to, when still accessible.
    pub message: Option<Message>,
    pub data: Option<String>,
}

/// Payload of an [`Update`]; at most one of these is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum UpdateKind {
    Message(Message),
    EditedMessage(Message),
    ChannelPost(Message),
    EditedChannelPost(Message),
    CallbackQuery(CallbackQuery),
    /// Any update type the pipeline does not model.
    #[default]
    Other,
}

/// One inbound event. Immutable once received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub id: i64,
    pub kind: UpdateKind,
}

impl Update {
    pub fn new(id: i64, kind: UpdateKind) -> Self {
        Self { id, kind }
    }

    /// First present of message, edited message, channel post, edited channel post.
    pub fn message(&self) -> Option<&Message> {
        match &self.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m) => Some(m),
            UpdateKind::CallbackQuery(_) | UpdateKind::Other => None,
        }
    }

    pub fn callback_query(&self) -> Option<&CallbackQuery> {
        match &self.kind {
            UpdateKind::CallbackQuery(q) => Some(q),
            _ => None,
        }
    }

    /// User who triggered the update, if known.
    pub fn sent_from(&self) -> Option<&User> {
        match &self.kind {
            UpdateKind::CallbackQuery(q) => Some(&q.from),
            _ => self.message().and_then(|m| m.user.as_ref()),
        }
    }

    /// Chat the update belongs to, if any.
    pub fn from_chat(&self) -> Option<&Chat> {
        match &self.kind {
            UpdateKind::CallbackQuery(q) => q.message.as_ref().map(|m| &m.chat),
            _ => self.message().map(|m| &m.chat),
        }
    }

    pub fn is_command(&self) -> bool {
        self.message().is_some_and(Message::is_command)
    }

    pub fn command(&self) -> Option<&str> {
        self.message().and_then(Message::command)
    }

    pub fn command_arguments(&self) -> &str {
        self.message().map_or("", Message::command_arguments)
    }
}
