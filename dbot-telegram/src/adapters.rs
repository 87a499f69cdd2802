//! Adapters from Telegram (teloxide) types to dbot_core types.
//! Depends only on teloxide and dbot_core type definitions.

use dbot_core::{CallbackQuery, Chat, Message, Update, UpdateKind, User};
use teloxide::types::{MaybeInaccessibleMessage, UpdateKind as TgUpdateKind};

/// Wraps a teloxide User for conversion to core [`User`].
pub struct TelegramUserWrapper<'a>(pub &'a teloxide::types::User);

impl TelegramUserWrapper<'_> {
    pub fn to_core(&self) -> User {
        User {
            id: self.0.id.0 as i64,
            is_bot: self.0.is_bot,
            username: self.0.username.clone(),
            first_name: Some(self.0.first_name.clone()),
            last_name: self.0.last_name.clone(),
            language_code: self.0.language_code.clone(),
        }
    }
}

/// Chat type name as Telegram spells it.
fn chat_type(chat: &teloxide::types::Chat) -> &'static str {
    if chat.is_private() {
        "private"
    } else if chat.is_supergroup() {
        "supergroup"
    } else if chat.is_group() {
        "group"
    } else {
        "channel"
    }
}

/// Wraps a teloxide Message for conversion to core [`Message`].
pub struct TelegramMessageWrapper<'a>(pub &'a teloxide::types::Message);

impl TelegramMessageWrapper<'_> {
    /// Text, or caption for media messages; empty otherwise.
    pub fn to_core(&self) -> Message {
        Message {
            id: self.0.id.0,
            user: self.0.from.as_ref().map(|u| TelegramUserWrapper(u).to_core()),
            chat: Chat {
                id: self.0.chat.id.0,
                chat_type: chat_type(&self.0.chat).to_string(),
            },
            content: self
                .0
                .text()
                .or_else(|| self.0.caption())
                .unwrap_or("")
                .to_string(),
            created_at: self.0.date,
            reply_to_message_id: self.0.reply_to_message().map(|m| m.id.0),
        }
    }
}

fn message(m: &teloxide::types::Message) -> Message {
    TelegramMessageWrapper(m).to_core()
}

/// Wraps a teloxide Update for conversion to core [`Update`]. Kinds the pipeline does not model
/// become [`UpdateKind::Other`] but keep their id, so the offset still advances past them.
pub struct TelegramUpdateWrapper<'a>(pub &'a teloxide::types::Update);

impl TelegramUpdateWrapper<'_> {
    pub fn to_core(&self) -> Update {
        let kind = match &self.0.kind {
            TgUpdateKind::Message(m) => UpdateKind::Message(message(m)),
            TgUpdateKind::EditedMessage(m) => UpdateKind::EditedMessage(message(m)),
            TgUpdateKind::ChannelPost(m) => UpdateKind::ChannelPost(message(m)),
            TgUpdateKind::EditedChannelPost(m) => UpdateKind::EditedChannelPost(message(m)),
            TgUpdateKind::CallbackQuery(q) => UpdateKind::CallbackQuery(CallbackQuery {
                id: q.id.to_string(),
                from: TelegramUserWrapper(&q.from).to_core(),
                message: match &q.message {
                    Some(MaybeInaccessibleMessage::Regular(m)) => Some(message(m)),
                    _ => None,
                },
                data: q.data.clone(),
            }),
            _ => UpdateKind::Other,
        };
        Update::new(i64::from(self.0.id.0), kind)
    }
}
