//! Environment variable overrides for config values.
//!
//! `PARLOR_*` variables win over values read from the config file.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::debug;

use crate::schema::{CommandsConfig, LoggingConfig, ParlorConfig};

pub const PREFIX_VAR: &str = "PARLOR_PREFIX";
pub const REQUIRE_PREFIX_VAR: &str = "PARLOR_REQUIRE_PREFIX";
pub const CASE_INSENSITIVE_VAR: &str = "PARLOR_CASE_INSENSITIVE";
pub const LOG_LEVEL_VAR: &str = "PARLOR_LOG_LEVEL";

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: ParlorConfig) -> Result<ParlorConfig> {
    apply_env_overrides_with(config, &std::env::vars().collect())
}

/// Apply overrides from a provided map (useful for testing).
pub fn apply_env_overrides_with(
    mut config: ParlorConfig,
    env: &HashMap<String, String>,
) -> Result<ParlorConfig> {
    let lookup = |name: &str| env.get(name).filter(|v| !v.trim().is_empty());

    if let Some(prefix) = lookup(PREFIX_VAR) {
        debug!(var = PREFIX_VAR, "Overriding command prefix from environment");
        commands(&mut config).prefix = Some(prefix.clone());
    }
    if let Some(raw) = lookup(REQUIRE_PREFIX_VAR) {
        let value = raw
            .parse()
            .with_context(|| format!("Invalid value for {REQUIRE_PREFIX_VAR}"))?;
        commands(&mut config).require_prefix = Some(value);
    }
    if let Some(raw) = lookup(CASE_INSENSITIVE_VAR) {
        let value = parse_bool(raw)
            .with_context(|| format!("Invalid value for {CASE_INSENSITIVE_VAR}: {raw}"))?;
        commands(&mut config).case_insensitive = Some(value);
    }
    if let Some(level) = lookup(LOG_LEVEL_VAR) {
        config
            .logging
            .get_or_insert_with(LoggingConfig::default)
            .level = Some(level.clone());
    }
    Ok(config)
}

fn commands(config: &mut ParlorConfig) -> &mut CommandsConfig {
    config.commands.get_or_insert_with(CommandsConfig::default)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
