//! Command scopes: which chats/users a command registration applies to.
//!
//! [`ScopeKind::Unscoped`] is the bucket for commands that declare no scope; it compares by value
//! like every other variant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scope selector, mirroring Telegram's `BotCommandScope` plus the `Unscoped` bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScopeKind {
    Default,
    AllPrivateChats,
    AllGroupChats,
    AllChatAdministrators,
    Chat { chat_id: i64 },
    ChatAdministrators { chat_id: i64 },
    ChatMember { chat_id: i64, user_id: i64 },
    Unscoped,
}

/// A [`ScopeKind`] optionally qualified by a language code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandScope {
    pub kind: ScopeKind,
    pub language_code: Option<String>,
}

impl CommandScope {
    pub fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            language_code: None,
        }
    }

    pub fn default_scope() -> Self {
        Self::new(ScopeKind::Default)
    }

    pub fn all_private_chats() -> Self {
        Self::new(ScopeKind::AllPrivateChats)
    }

    pub fn all_group_chats() -> Self {
        Self::new(ScopeKind::AllGroupChats)
    }

    pub fn all_chat_administrators() -> Self {
        Self::new(ScopeKind::AllChatAdministrators)
    }

    pub fn chat(chat_id: i64) -> Self {
        Self::new(ScopeKind::Chat { chat_id })
    }

    pub fn chat_administrators(chat_id: i64) -> Self {
        Self::new(ScopeKind::ChatAdministrators { chat_id })
    }

    pub fn chat_member(chat_id: i64, user_id: i64) -> Self {
        Self::new(ScopeKind::ChatMember { chat_id, user_id })
    }

    /// Bucket for commands registered without any scope.
    pub fn unscoped() -> Self {
        Self::new(ScopeKind::Unscoped)
    }

    /// Qualifies the scope with an IETF language code (e.g. `"en"`).
    pub fn with_language(mut self, language_code: impl Into<String>) -> Self {
        self.language_code = Some(language_code.into());
        self
    }

    pub fn is_unscoped(&self) -> bool {
        self.kind == ScopeKind::Unscoped
    }
}

impl fmt::Display for CommandScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ScopeKind::Default => write!(f, "default")?,
            ScopeKind::AllPrivateChats => write!(f, "all_private_chats")?,
            ScopeKind::AllGroupChats => write!(f, "all_group_chats")?,
            ScopeKind::AllChatAdministrators => write!(f, "all_chat_administrators")?,
            ScopeKind::Chat { chat_id } => write!(f, "chat:{}", chat_id)?,
            ScopeKind::ChatAdministrators { chat_id } => {
                write!(f, "chat_administrators:{}", chat_id)?
            }
            ScopeKind::ChatMember { chat_id, user_id } => {
                write!(f, "chat_member:{}:{}", chat_id, user_id)?
            }
            ScopeKind::Unscoped => write!(f, "unscoped")?,
        }
        if let Some(lang) = &self.language_code {
            write!(f, "[{}]", lang)?;
        }
        Ok(())
    }
}
