//! Wraps teloxide::Bot and implements the three transport seams of dbot-core:
//! [`dbot_core::Bot`] (outbound messages), [`UpdateSource`] (getUpdates long polling) and
//! [`CommandRegistrar`] (setMyCommands). Tests substitute other implementations of these traits.

use std::time::Duration;

use async_trait::async_trait;
use dbot_core::{
    Bot as CoreBot, BotCommand, Chat, CommandRegistrar, CommandScope, DbotError, GetUpdates,
    ParseMode, Result, ScopeKind, SendOptions, Update, UpdateSource,
};
use teloxide::prelude::*;
use teloxide::types::{
    AllowedUpdate, BotCommandScope, ChatId, LinkPreviewOptions, MessageId, ParseMode as TgParseMode,
    Recipient, ReplyParameters, UserId,
};
use tracing::{debug, warn};

use crate::adapters::TelegramUpdateWrapper;
use crate::config::TelegramConfig;

/// Slack added on top of the long-poll timeout for the HTTP request timeout.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// Thin wrapper around teloxide::Bot that implements dbot-core's transport traits.
#[derive(Clone)]
pub struct TelegramBotAdapter {
    bot: teloxide::Bot,
}

impl TelegramBotAdapter {
    /// Creates an adapter from an existing teloxide Bot.
    pub fn new(bot: teloxide::Bot) -> Self {
        Self { bot }
    }

    /// Builds the teloxide Bot from config. The HTTP timeout exceeds `poll_timeout_secs` so a long
    /// poll is never cut off by the client; an invalid API URL falls back to the default one.
    pub fn from_config(config: &TelegramConfig, poll_timeout_secs: u32) -> anyhow::Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(u64::from(poll_timeout_secs)) + REQUEST_TIMEOUT_SLACK)
            .build()?;
        let bot = teloxide::Bot::with_client(config.bot_token.clone(), client);
        let bot = match config.telegram_api_url.as_deref() {
            Some(url_str) => match reqwest::Url::parse(url_str) {
                Ok(url) => bot.set_api_url(url),
                Err(e) => {
                    warn!(error = %e, url = %url_str, "Invalid TELEGRAM_API_URL, using default");
                    bot
                }
            },
            None => bot,
        };
        Ok(Self::new(bot))
    }

    /// Returns the underlying teloxide::Bot for direct API use when needed.
    pub fn inner(&self) -> &teloxide::Bot {
        &self.bot
    }
}

fn bot_error(e: teloxide::RequestError) -> DbotError {
    DbotError::Bot(e.to_string())
}

#[allow(deprecated)]
fn convert_parse_mode(mode: ParseMode) -> TgParseMode {
    match mode {
        ParseMode::Markdown => TgParseMode::Markdown,
        ParseMode::MarkdownV2 => TgParseMode::MarkdownV2,
        ParseMode::Html => TgParseMode::Html,
    }
}

/// Telegram scope for a core scope; `None` for the unscoped bucket (server default).
pub(crate) fn convert_scope(scope: &CommandScope) -> Option<BotCommandScope> {
    let recipient = |chat_id: i64| Recipient::Id(ChatId(chat_id));
    let scope = match scope.kind {
        ScopeKind::Unscoped => return None,
        ScopeKind::Default => BotCommandScope::Default,
        ScopeKind::AllPrivateChats => BotCommandScope::AllPrivateChats,
        ScopeKind::AllGroupChats => BotCommandScope::AllGroupChats,
        ScopeKind::AllChatAdministrators => BotCommandScope::AllChatAdministrators,
        ScopeKind::Chat { chat_id } => BotCommandScope::Chat {
            chat_id: recipient(chat_id),
        },
        ScopeKind::ChatAdministrators { chat_id } => BotCommandScope::ChatAdministrators {
            chat_id: recipient(chat_id),
        },
        ScopeKind::ChatMember { chat_id, user_id } => BotCommandScope::ChatMember {
            chat_id: recipient(chat_id),
            user_id: UserId(user_id as u64),
        },
    };
    Some(scope)
}

/// Parses an update type name as used by getUpdates' `allowed_updates`.
pub(crate) fn parse_allowed_update(name: &str) -> Option<AllowedUpdate> {
    let update = match name {
        "message" => AllowedUpdate::Message,
        "edited_message" => AllowedUpdate::EditedMessage,
        "channel_post" => AllowedUpdate::ChannelPost,
        "edited_channel_post" => AllowedUpdate::EditedChannelPost,
        "inline_query" => AllowedUpdate::InlineQuery,
        "chosen_inline_result" => AllowedUpdate::ChosenInlineResult,
        "callback_query" => AllowedUpdate::CallbackQuery,
        "shipping_query" => AllowedUpdate::ShippingQuery,
        "pre_checkout_query" => AllowedUpdate::PreCheckoutQuery,
        "poll" => AllowedUpdate::Poll,
        "poll_answer" => AllowedUpdate::PollAnswer,
        "my_chat_member" => AllowedUpdate::MyChatMember,
        "chat_member" => AllowedUpdate::ChatMember,
        "chat_join_request" => AllowedUpdate::ChatJoinRequest,
        _ => return None,
    };
    Some(update)
}

#[async_trait]
impl CoreBot for TelegramBotAdapter {
    async fn send_message(&self, chat: &Chat, text: &str, options: &SendOptions) -> Result<()> {
        let mut req = self
            .bot
            .send_message(ChatId(options.target_chat(chat)), text.to_string());
        req.parse_mode = options.parse_mode.map(convert_parse_mode);
        if options.disable_web_page_preview {
            req.link_preview_options = Some(LinkPreviewOptions {
                is_disabled: true,
                url: None,
                prefer_small_media: false,
                prefer_large_media: false,
                show_above_text: false,
            });
        }
        if let Some(reply_to) = options.reply_to_message_id {
            req.reply_parameters = Some(ReplyParameters::new(MessageId(reply_to)));
        }
        req.await.map_err(bot_error)?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramBotAdapter {
    async fn get_updates(&self, request: &GetUpdates) -> Result<Vec<Update>> {
        let offset = i32::try_from(request.offset)
            .map_err(|_| DbotError::Bot(format!("update offset out of range: {}", request.offset)))?;
        let mut req = self.bot.get_updates();
        req.offset = Some(offset);
        req.limit = Some(request.limit);
        req.timeout = Some(request.timeout_secs);
        if !request.allowed_updates.is_empty() {
            req.allowed_updates = Some(
                request
                    .allowed_updates
                    .iter()
                    .filter_map(|name| {
                        let parsed = parse_allowed_update(name);
                        if parsed.is_none() {
                            warn!(update_type = %name, "Unknown allowed update type, ignored");
                        }
                        parsed
                    })
                    .collect(),
            );
        }

        let updates = req.await.map_err(bot_error)?;
        debug!(count = updates.len(), offset, "Received updates");
        Ok(updates
            .iter()
            .map(|u| TelegramUpdateWrapper(u).to_core())
            .collect())
    }
}

#[async_trait]
impl CommandRegistrar for TelegramBotAdapter {
    async fn set_commands(&self, scope: &CommandScope, commands: &[BotCommand]) -> Result<()> {
        let commands = commands
            .iter()
            .map(|c| teloxide::types::BotCommand::new(c.command.clone(), c.description.clone()));
        let mut req = self.bot.set_my_commands(commands);
        req.scope = convert_scope(scope);
        req.language_code = scope.language_code.clone();
        req.await.map_err(bot_error)?;
        Ok(())
    }
}
