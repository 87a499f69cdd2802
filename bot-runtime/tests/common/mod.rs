//! Test doubles shared by the bot-runtime integration tests.
//!
//! [`RecordingBot`] captures every sent message, [`ScriptedSource`] replays a fixed script of
//! batches and failures and then long-polls forever, [`RecordingRegistrar`] captures command
//! registrations and can be told to fail, [`StalledRegistrar`] never answers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bot_runtime::{DispatchError, ErrorHandler};
use chrono::Utc;
use dbot_core::{
    Bot, BotCommand, Chat, CommandRegistrar, CommandScope, DbotError, GetUpdates, Message,
    Result, SendOptions, Update, UpdateKind, UpdateSource, User,
};
use tokio::sync::mpsc;

/// One recorded `send_message` call.
#[derive(Debug, Clone)]
pub struct Sent {
    pub chat_id: i64,
    pub text: String,
    pub options: SendOptions,
}

/// Bot that forwards every sent message to a channel held by the test.
pub struct RecordingBot {
    sent_tx: mpsc::UnboundedSender<Sent>,
}

impl RecordingBot {
    pub fn with_receiver() -> (Arc<Self>, mpsc::UnboundedReceiver<Sent>) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        (Arc::new(Self { sent_tx }), sent_rx)
    }
}

#[async_trait]
impl Bot for RecordingBot {
    async fn send_message(&self, chat: &Chat, text: &str, options: &SendOptions) -> Result<()> {
        let _ = self.sent_tx.send(Sent {
            chat_id: options.target_chat(chat),
            text: text.to_string(),
            options: options.clone(),
        });
        Ok(())
    }
}

/// One scripted answer to `get_updates`.
pub enum Step {
    Batch(Vec<Update>),
    Fail(String),
}

/// Update source that replays its script, then blocks like an idle long poll.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<GetUpdates>>,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn batches(batches: impl IntoIterator<Item = Vec<Update>>) -> Arc<Self> {
        Self::new(batches.into_iter().map(Step::Batch))
    }

    /// Source with an empty script: every request blocks.
    pub fn idle() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn requests(&self) -> Vec<GetUpdates> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn get_updates(&self, request: &GetUpdates) -> Result<Vec<Update>> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Batch(updates)) => Ok(updates),
            Some(Step::Fail(reason)) => Err(DbotError::Bot(reason)),
            None => std::future::pending().await,
        }
    }
}

/// Registrar that records every call; fails for one scope when configured.
#[derive(Default)]
pub struct RecordingRegistrar {
    calls: Mutex<Vec<(CommandScope, Vec<BotCommand>)>>,
    fail_on: Option<CommandScope>,
}

impl RecordingRegistrar {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(scope: CommandScope) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_on: Some(scope),
        })
    }

    pub fn calls(&self) -> Vec<(CommandScope, Vec<BotCommand>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRegistrar for RecordingRegistrar {
    async fn set_commands(&self, scope: &CommandScope, commands: &[BotCommand]) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((scope.clone(), commands.to_vec()));
        if self.fail_on.as_ref() == Some(scope) {
            return Err(DbotError::Bot(format!("setMyCommands rejected for {}", scope)));
        }
        Ok(())
    }
}

/// Registrar whose calls never complete, like a registration request stuck on the network.
#[derive(Default)]
pub struct StalledRegistrar {
    calls: AtomicUsize,
}

impl StalledRegistrar {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRegistrar for StalledRegistrar {
    async fn set_commands(&self, _scope: &CommandScope, _commands: &[BotCommand]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Error handler collecting everything it receives.
#[derive(Clone, Default)]
pub struct CollectedErrors(Arc<Mutex<Vec<DispatchError>>>);

impl CollectedErrors {
    pub fn handler(&self) -> Arc<dyn ErrorHandler> {
        let errors = self.clone();
        Arc::new(move |err: DispatchError| errors.0.lock().unwrap().push(err))
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    /// Runs `f` over the collected errors.
    pub fn with<R>(&self, f: impl FnOnce(&[DispatchError]) -> R) -> R {
        f(&self.0.lock().unwrap())
    }
}

pub fn test_user() -> User {
    User {
        id: 7,
        is_bot: false,
        username: Some("test_user".to_string()),
        first_name: Some("Test".to_string()),
        last_name: None,
        language_code: Some("en".to_string()),
    }
}

/// Text message update in chat `chat_id`.
pub fn text_update(id: i64, chat_id: i64, text: &str) -> Update {
    Update::new(
        id,
        UpdateKind::Message(Message {
            id: id as i32,
            user: Some(test_user()),
            chat: Chat {
                id: chat_id,
                chat_type: "private".to_string(),
            },
            content: text.to_string(),
            created_at: Utc::now(),
            reply_to_message_id: None,
        }),
    )
}

/// Polls `cond` until it holds; panics after two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
