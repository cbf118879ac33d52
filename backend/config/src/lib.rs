//! `cadence-config`: runtime configuration.
//!
//! - Typed schema with per-section defaults
//! - File discovery (flag / `CADENCE_CONFIG`, working directory, OS config dir)
//! - `${ENV_VAR}` substitution
//! - Validation into a report of errors and warnings

pub mod defaults;
pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, discover_config, load_config, load_discovered, parse_config};
pub use schema::{
    ApiConfig, CadenceConfig, ColdStartMode, DatabaseConfig, DiscordConfig, LoggingConfig,
    PollerConfig, RetentionConfig, RetryConfig, SuppressionConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::Result;
use std::path::Path;

/// Discover, load, substitute, and default the config.
///
/// Validation is left to the caller, which knows whether the bot is being
/// served or an admin command is running.
pub async fn load_and_prepare(explicit: Option<&Path>) -> Result<CadenceConfig> {
    let config = load_discovered(explicit).await?;
    Ok(apply_all_defaults(config))
}
