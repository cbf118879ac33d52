//! Config validation with field paths in every message.

use crate::schema::CadenceConfig;
use thiserror::Error;

const MAX_SENSIBLE_GRANT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config. `serving` adds the checks that only matter for the
/// long-running bot (a Discord token is required).
pub fn validate(config: &CadenceConfig, serving: bool) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_poller(config, &mut report);
    validate_retry(config, &mut report);
    validate_suppression(config, &mut report);
    validate_retention(config, &mut report);
    validate_api(config, &mut report);
    if serving {
        validate_discord(config, &mut report);
    }
    report
}

fn validate_poller(config: &CadenceConfig, report: &mut ValidationReport) {
    let poller = &config.poller;
    if poller.poll_interval_seconds == 0 {
        report.error("poller.poll_interval_seconds", "must be at least 1");
    }
    if poller.grant_timeout_seconds == 0 {
        report.error("poller.grant_timeout_seconds", "must be at least 1");
    } else if poller.grant_timeout_seconds > MAX_SENSIBLE_GRANT_TIMEOUT_SECS {
        report.warn(
            "poller.grant_timeout_seconds",
            format!(
                "timeouts above {MAX_SENSIBLE_GRANT_TIMEOUT_SECS}s let one unreachable grant stall the whole cycle"
            ),
        );
    }
}

fn validate_retry(config: &CadenceConfig, report: &mut ValidationReport) {
    let retry = &config.retry;
    if retry.max_attempts == 0 {
        report.error("retry.max_attempts", "must be at least 1 (the first attempt counts)");
    }
    if retry.backoff_factor < 1.0 || !retry.backoff_factor.is_finite() {
        report.error("retry.backoff_factor", "must be a finite number >= 1.0");
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        report.warn("retry.base_delay_ms", "base delay exceeds max_delay_ms and will be capped");
    }
}

fn validate_suppression(config: &CadenceConfig, report: &mut ValidationReport) {
    let s = &config.suppression;
    if s.after_failures == 0 {
        report.warn(
            "suppression.after_failures",
            "suppression disabled; permanently failing grants are retried every cycle",
        );
    }
    if s.base_cooldown_seconds > s.max_cooldown_seconds {
        report.error(
            "suppression.base_cooldown_seconds",
            "must not exceed suppression.max_cooldown_seconds",
        );
    }
}

fn validate_retention(config: &CadenceConfig, report: &mut ValidationReport) {
    let r = &config.retention;
    if r.enabled && r.every_cycles == 0 {
        report.error("retention.every_cycles", "must be at least 1 when retention is enabled");
    }
}

fn validate_api(config: &CadenceConfig, report: &mut ValidationReport) {
    let api = &config.api;
    if api.enabled && api.port == 0 {
        report.error("api.port", "port 0 is not allowed");
    } else if api.enabled && api.port < 1024 {
        report.warn(
            "api.port",
            format!("Port {} requires elevated privileges; consider using a port >= 1024", api.port),
        );
    }
}

fn validate_discord(config: &CadenceConfig, report: &mut ValidationReport) {
    if config
        .discord
        .bot_token
        .as_deref()
        .map(str::is_empty)
        .unwrap_or(true)
    {
        report.error(
            "discord.bot_token",
            "Discord bot token is required (set DISCORD_TOKEN or discord.bot_token)",
        );
    }
}
