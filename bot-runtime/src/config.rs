//! Runtime configuration: polling, queueing, concurrency and shutdown options.
//!
//! Loaded from env via [`RuntimeConfig::from_env`] or built from [`RuntimeConfig::default`];
//! validated once when the runtime is built and immutable afterwards.

use std::env;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default and maximum batch size of one retrieval call.
pub const DEFAULT_POLL_LIMIT: u8 = 100;
/// Server-side maximum long-poll timeout, also the default.
pub const MAX_POLL_TIMEOUT_SECS: u32 = 50;
/// Pause before retrying after a failed retrieval call.
pub const DEFAULT_POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Configuration of the update pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Per-update handler deadline. `None` or zero disables it.
    pub handler_timeout: Option<Duration>,
    /// Max updates per retrieval call (1..=100).
    pub poll_limit: u8,
    /// Long-poll timeout in seconds (0..=50).
    pub poll_timeout_secs: u32,
    /// Bounded queue capacity; 0 means "same as `poll_limit`".
    pub buffer_size: usize,
    /// Number of worker loops in fixed-worker mode.
    pub workers: usize,
    /// Spawn one task per update instead of using fixed workers. Ignored when a task pool is set.
    pub unbounded_concurrency: bool,
    /// Register commands with the remote service before starting.
    pub auto_setup_commands: bool,
    /// Dispatch updates still queued at stop time before completing shutdown.
    pub drain_on_stop: bool,
    /// Update types to request; empty means the server default.
    pub allowed_updates: Vec<String>,
    /// First offset to request (resume point). Kept in memory only.
    pub initial_offset: i64,
    pub poll_retry_delay: Duration,
    /// Recycle execution contexts between updates.
    pub context_pooling: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            handler_timeout: None,
            poll_limit: DEFAULT_POLL_LIMIT,
            poll_timeout_secs: MAX_POLL_TIMEOUT_SECS,
            buffer_size: 0,
            workers: default_workers(),
            unbounded_concurrency: false,
            auto_setup_commands: true,
            drain_on_stop: true,
            allowed_updates: Vec::new(),
            initial_offset: 0,
            poll_retry_delay: DEFAULT_POLL_RETRY_DELAY,
            context_pooling: true,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Parses env var `key`; `None` when unset or unparsable.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    let value = env::var(key).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl RuntimeConfig {
    /// Loads from env, keeping the default for every unset or unparsable variable:
    /// BOT_WORKERS, BOT_BUFFER_SIZE, BOT_POLL_LIMIT, BOT_POLL_TIMEOUT_SECS, BOT_HANDLER_TIMEOUT_SECS,
    /// BOT_AUTO_SETUP_COMMANDS, BOT_DRAIN_ON_STOP, BOT_ALLOWED_UPDATES (comma separated),
    /// BOT_INITIAL_OFFSET, BOT_UNBOUNDED_CONCURRENCY.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse("BOT_WORKERS") {
            config.workers = v;
        }
        if let Some(v) = env_parse("BOT_BUFFER_SIZE") {
            config.buffer_size = v;
        }
        if let Some(v) = env_parse("BOT_POLL_LIMIT") {
            config.poll_limit = v;
        }
        if let Some(v) = env_parse("BOT_POLL_TIMEOUT_SECS") {
            config.poll_timeout_secs = v;
        }
        if let Some(secs) = env_parse::<u64>("BOT_HANDLER_TIMEOUT_SECS") {
            config.handler_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(v) = env_bool("BOT_AUTO_SETUP_COMMANDS") {
            config.auto_setup_commands = v;
        }
        if let Some(v) = env_bool("BOT_DRAIN_ON_STOP") {
            config.drain_on_stop = v;
        }
        if let Ok(list) = env::var("BOT_ALLOWED_UPDATES") {
            config.allowed_updates = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = env_parse("BOT_INITIAL_OFFSET") {
            config.initial_offset = v;
        }
        if let Some(v) = env_bool("BOT_UNBOUNDED_CONCURRENCY") {
            config.unbounded_concurrency = v;
        }
        config
    }

    /// Checks value ranges. Worker count only matters in fixed-worker mode.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_limit == 0 || self.poll_limit > DEFAULT_POLL_LIMIT {
            return Err(ConfigError::PollLimit(self.poll_limit));
        }
        if self.poll_timeout_secs > MAX_POLL_TIMEOUT_SECS {
            return Err(ConfigError::PollTimeout(self.poll_timeout_secs));
        }
        if self.workers == 0 && !self.unbounded_concurrency {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }

    /// Capacity of the bounded queue between poller and workers.
    pub fn queue_capacity(&self) -> usize {
        if self.buffer_size == 0 {
            usize::from(self.poll_limit).max(1)
        } else {
            self.buffer_size
        }
    }

    /// Handler deadline, with zero treated as disabled.
    pub fn effective_handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout.filter(|d| !d.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 10] = [
        "BOT_WORKERS",
        "BOT_BUFFER_SIZE",
        "BOT_POLL_LIMIT",
        "BOT_POLL_TIMEOUT_SECS",
        "BOT_HANDLER_TIMEOUT_SECS",
        "BOT_AUTO_SETUP_COMMANDS",
        "BOT_DRAIN_ON_STOP",
        "BOT_ALLOWED_UPDATES",
        "BOT_INITIAL_OFFSET",
        "BOT_UNBOUNDED_CONCURRENCY",
    ];

    fn clear_env() {
        for key in VARS {
            env::remove_var(key);
        }
    }

    /// **Test: defaults match the documented values and validate.**
    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.poll_limit, 100);
        assert_eq!(config.poll_timeout_secs, 50);
        assert_eq!(config.queue_capacity(), 100);
        assert!(config.workers >= 1);
        assert!(config.auto_setup_commands);
        assert!(config.drain_on_stop);
        assert!(config.context_pooling);
        assert_eq!(config.poll_retry_delay, Duration::from_secs(3));
        assert_eq!(config.effective_handler_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_queue_capacity_follows_poll_limit() {
        let config = RuntimeConfig {
            poll_limit: 20,
            ..RuntimeConfig::default()
        };
        assert_eq!(config.queue_capacity(), 20);

        let config = RuntimeConfig {
            poll_limit: 20,
            buffer_size: 5,
            ..RuntimeConfig::default()
        };
        assert_eq!(config.queue_capacity(), 5);
    }

    #[test]
    fn test_zero_timeout_is_disabled() {
        let config = RuntimeConfig {
            handler_timeout: Some(Duration::ZERO),
            ..RuntimeConfig::default()
        };
        assert_eq!(config.effective_handler_timeout(), None);
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let bad_limit = RuntimeConfig {
            poll_limit: 0,
            ..RuntimeConfig::default()
        };
        assert_eq!(bad_limit.validate(), Err(ConfigError::PollLimit(0)));

        let bad_limit = RuntimeConfig {
            poll_limit: 101,
            ..RuntimeConfig::default()
        };
        assert_eq!(bad_limit.validate(), Err(ConfigError::PollLimit(101)));

        let bad_timeout = RuntimeConfig {
            poll_timeout_secs: 51,
            ..RuntimeConfig::default()
        };
        assert_eq!(bad_timeout.validate(), Err(ConfigError::PollTimeout(51)));

        let no_workers = RuntimeConfig {
            workers: 0,
            ..RuntimeConfig::default()
        };
        assert_eq!(no_workers.validate(), Err(ConfigError::NoWorkers));

        let unbounded = RuntimeConfig {
            workers: 0,
            unbounded_concurrency: true,
            ..RuntimeConfig::default()
        };
        assert!(unbounded.validate().is_ok());
    }

    /// **Test: from_env reads every recognised variable.**
    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        env::set_var("BOT_WORKERS", "3");
        env::set_var("BOT_BUFFER_SIZE", "7");
        env::set_var("BOT_POLL_LIMIT", "20");
        env::set_var("BOT_POLL_TIMEOUT_SECS", "30");
        env::set_var("BOT_HANDLER_TIMEOUT_SECS", "10");
        env::set_var("BOT_AUTO_SETUP_COMMANDS", "false");
        env::set_var("BOT_DRAIN_ON_STOP", "0");
        env::set_var("BOT_ALLOWED_UPDATES", "message, callback_query,,");
        env::set_var("BOT_INITIAL_OFFSET", "42");
        env::set_var("BOT_UNBOUNDED_CONCURRENCY", "yes");

        let config = RuntimeConfig::from_env();
        clear_env();

        assert_eq!(config.workers, 3);
        assert_eq!(config.buffer_size, 7);
        assert_eq!(config.poll_limit, 20);
        assert_eq!(config.poll_timeout_secs, 30);
        assert_eq!(config.handler_timeout, Some(Duration::from_secs(10)));
        assert!(!config.auto_setup_commands);
        assert!(!config.drain_on_stop);
        assert_eq!(config.allowed_updates, vec!["message", "callback_query"]);
        assert_eq!(config.initial_offset, 42);
        assert!(config.unbounded_concurrency);
    }

    /// **Test: unparsable values keep the defaults.**
    #[test]
    #[serial]
    fn test_from_env_ignores_garbage() {
        clear_env();
        env::set_var("BOT_WORKERS", "many");
        env::set_var("BOT_DRAIN_ON_STOP", "maybe");

        let config = RuntimeConfig::from_env();
        clear_env();

        assert_eq!(config, RuntimeConfig::default());
    }
}
