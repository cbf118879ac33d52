use std::time::Duration;

use tracing::warn;

use cadence_config::{CadenceConfig, ColdStartMode};
use cadence_scheduler::{ColdStart, PollConfig, RetentionPolicy, RetryPolicy, SuppressionPolicy};

/// Apply `CADENCE_DB`, `CADENCE_PORT`, `CADENCE_POLL_INTERVAL` and
/// `DISCORD_TOKEN` from the process environment.
pub fn apply_env_overrides(config: CadenceConfig) -> CadenceConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

pub fn apply_env_overrides_with<F>(mut config: CadenceConfig, lookup: F) -> CadenceConfig
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup("CADENCE_DB").filter(|v| !v.is_empty()) {
        config.database.path = path;
    }
    if let Some(port) = lookup("CADENCE_PORT") {
        match port.parse() {
            Ok(port) => config.api.port = port,
            Err(_) => warn!(value = %port, "Ignoring CADENCE_PORT, not a port number"),
        }
    }
    if let Some(interval) = lookup("CADENCE_POLL_INTERVAL") {
        match interval.parse() {
            Ok(secs) => config.poller.poll_interval_seconds = secs,
            Err(_) => warn!(value = %interval, "Ignoring CADENCE_POLL_INTERVAL, not a number of seconds"),
        }
    }
    if let Some(token) = lookup("DISCORD_TOKEN").filter(|v| !v.is_empty()) {
        config.discord.bot_token = Some(token);
    }
    config
}

/// Scheduler settings from the loaded config.
pub fn poll_config(config: &CadenceConfig) -> PollConfig {
    PollConfig {
        interval: Duration::from_secs(config.poller.poll_interval_seconds),
        cold_start: match config.poller.cold_start {
            ColdStartMode::SeedBaseline => ColdStart::SeedBaseline,
            ColdStartMode::GrantImmediately => ColdStart::GrantImmediately,
        },
        grant_timeout: Duration::from_secs(config.poller.grant_timeout_seconds),
        retry: RetryPolicy {
            max_attempts: config.retry.max_attempts,
            base_delay_ms: config.retry.base_delay_ms,
            backoff_factor: config.retry.backoff_factor,
            max_delay_ms: config.retry.max_delay_ms,
            jitter: config.retry.jitter,
        },
        suppression: SuppressionPolicy {
            after_failures: config.suppression.after_failures,
            base_cooldown_secs: config.suppression.base_cooldown_seconds,
            max_cooldown_secs: config.suppression.max_cooldown_seconds,
        },
        retention: retention_policy(config),
    }
}

pub fn retention_policy(config: &CadenceConfig) -> RetentionPolicy {
    RetentionPolicy {
        enabled: config.retention.enabled,
        margin_secs: config.retention.margin_seconds,
        every_cycles: config.retention.every_cycles,
    }
}
