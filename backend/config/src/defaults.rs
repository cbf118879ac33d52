//! Config defaults: the constants behind every `Default` impl, and
//! normalization of values left blank in the file.

use crate::schema::CadenceConfig;

pub const DEFAULT_DATABASE_PATH: &str = "cadence.db";

/// Seconds between the end of one cycle and the start of the next.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_GRANT_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 250;
pub const DEFAULT_RETRY_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5_000;

pub const DEFAULT_SUPPRESS_AFTER_FAILURES: u32 = 3;
pub const DEFAULT_SUPPRESS_BASE_COOLDOWN_SECS: u64 = 60;
pub const DEFAULT_SUPPRESS_MAX_COOLDOWN_SECS: u64 = 3_600;

pub const DEFAULT_RETENTION_MARGIN_SECS: u64 = 86_400;
/// With the default interval this prunes roughly once an hour.
pub const DEFAULT_RETENTION_EVERY_CYCLES: u64 = 720;

pub const DEFAULT_AUDIT_REASON: &str = "Activity role reward";

pub const DEFAULT_API_BIND: &str = "127.0.0.1";
pub const DEFAULT_API_PORT: u16 = 8088;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Fill blank strings and empty secrets with their defaults.
pub fn apply_all_defaults(config: CadenceConfig) -> CadenceConfig {
    let config = apply_path_defaults(config);
    let config = apply_discord_defaults(config);
    apply_logging_defaults(config)
}

fn apply_path_defaults(mut config: CadenceConfig) -> CadenceConfig {
    if config.database.path.trim().is_empty() {
        config.database.path = DEFAULT_DATABASE_PATH.to_string();
    }
    if config.api.bind_address.trim().is_empty() {
        config.api.bind_address = DEFAULT_API_BIND.to_string();
    }
    config
}

/// An empty token is the same as no token.
fn apply_discord_defaults(mut config: CadenceConfig) -> CadenceConfig {
    if config
        .discord
        .bot_token
        .as_deref()
        .is_some_and(|t| t.trim().is_empty())
    {
        config.discord.bot_token = None;
    }
    if config.discord.audit_reason.trim().is_empty() {
        config.discord.audit_reason = DEFAULT_AUDIT_REASON.to_string();
    }
    config
}

fn apply_logging_defaults(mut config: CadenceConfig) -> CadenceConfig {
    if config.logging.level.trim().is_empty() {
        config.logging.level = DEFAULT_LOG_LEVEL.to_string();
    }
    if config.logging.dir.trim().is_empty() {
        config.logging.dir = DEFAULT_LOG_DIR.to_string();
    }
    config
}
