use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bot_runtime::{handler_fn, BotRuntime, Command, DispatchError, RuntimeConfig};
use chrono::{Local, Utc};
use dbot_core::{init_tracing, CommandScope};
use dbot_telegram::{wait_for_shutdown_signal, TelegramBotAdapter, TelegramConfig};
use tracing::{info, warn};

fn commands() -> Vec<Command> {
    let clock = handler_fn(|ctx| {
        Box::pin(async move {
            let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
            info!(chat_id = ?ctx.from_chat().map(|c| c.id), time = %now, "Sending time");
            ctx.reply_text(&format!("Current time: {}", now)).await
        })
    });
    let utc = handler_fn(|ctx| {
        Box::pin(async move {
            let now = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
            ctx.reply_markdown(&format!("*UTC:* `{}`", now)).await
        })
    });
    let args = handler_fn(|ctx| {
        Box::pin(async move {
            ctx.reply_text(&format!("Args: '{}'", ctx.command_args())).await
        })
    });

    vec![
        Command::new("clock", "Show the local time", clock).with_scopes([
            CommandScope::all_private_chats(),
            CommandScope::all_group_chats(),
        ]),
        Command::new("utc", "Show the UTC time", utc),
        Command::new("args", "Echo command arguments", args).hidden(true),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = TelegramConfig::from_env()?;
    let log_file = config
        .log_file
        .clone()
        .unwrap_or_else(|| "logs/clock-bot.log".to_string());
    init_tracing(Some(&log_file))?;

    let mut runtime_config = RuntimeConfig::from_env();
    if runtime_config.handler_timeout.is_none() {
        runtime_config.handler_timeout = Some(Duration::from_secs(5));
    }
    let telegram = Arc::new(TelegramBotAdapter::from_config(
        &config,
        runtime_config.poll_timeout_secs,
    )?);

    let unknown = handler_fn(|ctx| {
        Box::pin(async move {
            warn!(command = ?ctx.command(), "Unknown command");
            ctx.reply_text("Unknown command, try /clock").await
        })
    });

    let runtime = Arc::new(
        BotRuntime::builder(telegram.clone(), telegram.clone())
            .config(runtime_config)
            .registrar(telegram)
            .undefined_command_handler(unknown)
            .error_handler(Arc::new(|err: DispatchError| {
                warn!(error = %err, update_id = ?err.update_id(), "Update failed")
            }))
            .commands(commands())
            .build()?,
    );
    info!(start_time = %Local::now().format("%Y-%m-%d %H:%M:%S"), log_file = %log_file, "Clock Bot started");

    let mut run = tokio::spawn(Arc::clone(&runtime).run());
    tokio::select! {
        signal = wait_for_shutdown_signal() => signal?,
        finished = &mut run => return Ok(finished??),
    }

    info!("Shutdown signal received, draining");
    runtime.stop().wait().await;
    run.await??;
    info!(offset = runtime.offset(), "Clock Bot stopped");
    Ok(())
}
