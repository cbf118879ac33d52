//! cadence runtime configuration schema.
//!
//! Every section is optional in the file; missing keys take the values from
//! [`crate::defaults`].

use serde::{Deserialize, Serialize};

use crate::defaults::*;

/// Root configuration, read from `cadence.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub database: DatabaseConfig,
    pub poller: PollerConfig,
    pub retry: RetryConfig,
    pub suppression: SuppressionConfig,
    pub retention: RetentionConfig,
    pub discord: DiscordConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

impl CadenceConfig {
    /// A copy safe to print or log.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.discord.bot_token.is_some() {
            copy.discord.bot_token = Some("[REDACTED]".to_string());
        }
        copy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file holding rules, events and alerts.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DATABASE_PATH.to_string(),
        }
    }
}

/// First-cycle policy after a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColdStartMode {
    #[default]
    SeedBaseline,
    GrantImmediately,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub poll_interval_seconds: u64,
    pub cold_start: ColdStartMode,
    pub grant_timeout_seconds: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECS,
            cold_start: ColdStartMode::default(),
            grant_timeout_seconds: DEFAULT_GRANT_TIMEOUT_SECS,
        }
    }
}

/// In-cycle retry of transient grant failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            backoff_factor: DEFAULT_RETRY_BACKOFF_FACTOR,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionConfig {
    /// 0 disables suppression.
    pub after_failures: u32,
    pub base_cooldown_seconds: u64,
    pub max_cooldown_seconds: u64,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            after_failures: DEFAULT_SUPPRESS_AFTER_FAILURES,
            base_cooldown_seconds: DEFAULT_SUPPRESS_BASE_COOLDOWN_SECS,
            max_cooldown_seconds: DEFAULT_SUPPRESS_MAX_COOLDOWN_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub margin_seconds: u64,
    pub every_cycles: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            margin_seconds: DEFAULT_RETENTION_MARGIN_SECS,
            every_cycles: DEFAULT_RETENTION_EVERY_CYCLES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub bot_token: Option<String>,
    /// Reason recorded in the server audit log for each grant.
    pub audit_reason: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            audit_reason: DEFAULT_AUDIT_REASON.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: DEFAULT_API_BIND.to_string(),
            port: DEFAULT_API_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            dir: DEFAULT_LOG_DIR.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "poller:\n  poll_interval_seconds: 30\n  cold_start: grant_immediately\n";
        let cfg: CadenceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.poller.poll_interval_seconds, 30);
        assert_eq!(cfg.poller.cold_start, ColdStartMode::GrantImmediately);
        assert_eq!(cfg.poller.grant_timeout_seconds, DEFAULT_GRANT_TIMEOUT_SECS);
        assert_eq!(cfg.retry, RetryConfig::default());
        assert_eq!(cfg.api.port, DEFAULT_API_PORT);
    }

    #[test]
    fn empty_document_is_default() {
        let cfg: CadenceConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, CadenceConfig::default());
    }

    #[test]
    fn redacted_hides_token() {
        let mut cfg = CadenceConfig::default();
        cfg.discord.bot_token = Some("secret".to_string());
        let shown = serde_yaml::to_string(&cfg.redacted()).unwrap();
        assert!(!shown.contains("secret"));
        assert!(shown.contains("[REDACTED]"));
    }
}
