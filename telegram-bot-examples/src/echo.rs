use std::sync::Arc;

use anyhow::Result;
use bot_runtime::{handler_fn, BotRuntime, RuntimeConfig};
use chrono::Local;
use dbot_core::init_tracing;
use dbot_telegram::{wait_for_shutdown_signal, TelegramBotAdapter, TelegramConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = TelegramConfig::from_env()?;
    let log_file = config
        .log_file
        .clone()
        .unwrap_or_else(|| "logs/echo-bot.log".to_string());
    init_tracing(Some(&log_file))?;

    let runtime_config = RuntimeConfig {
        auto_setup_commands: false,
        ..RuntimeConfig::from_env()
    };
    let telegram = Arc::new(TelegramBotAdapter::from_config(
        &config,
        runtime_config.poll_timeout_secs,
    )?);

    let echo = handler_fn(|ctx| {
        Box::pin(async move {
            let Some(message) = ctx.message() else {
                return Ok(());
            };
            if message.content.is_empty() {
                return Ok(());
            }
            info!(
                user_id = ?ctx.sent_from().map(|u| u.id),
                chat_id = message.chat.id,
                message_content = %message.content,
                "Echoing message"
            );
            ctx.reply_text(&format!("Echo: {}", message.content)).await
        })
    });

    let runtime = Arc::new(
        BotRuntime::builder(telegram.clone(), telegram)
            .config(runtime_config)
            .updates_handler(echo)
            .build()?,
    );
    info!(start_time = %Local::now().format("%Y-%m-%d %H:%M:%S"), log_file = %log_file, "Echo Bot started");

    let mut run = tokio::spawn(Arc::clone(&runtime).run());
    tokio::select! {
        signal = wait_for_shutdown_signal() => signal?,
        finished = &mut run => return Ok(finished??),
    }

    info!("Shutdown signal received, draining");
    runtime.stop().wait().await;
    run.await??;
    info!(offset = runtime.offset(), "Echo Bot stopped");
    Ok(())
}
