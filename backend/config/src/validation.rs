//! Config validation: schema checks with user-friendly error messages.

use std::collections::HashSet;

use parlor_core::RequirePrefix;
use thiserror::Error;

use crate::schema::ParlorConfig;

/// One problem found in the config, located by its dotted key path.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// Errors (fatal) and warnings (logged only) from one validation pass.
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

/// Check prefix and tokenizer settings for combinations the engine cannot use.
pub fn validate(config: &ParlorConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_commands(config, &mut report);
    validate_tokenizer(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_commands(config: &ParlorConfig, report: &mut ValidationReport) {
    let Some(commands) = &config.commands else { return };
    let prefix = commands.prefix.as_deref().unwrap_or_default();
    let require = commands.require_prefix.unwrap_or_default();

    if prefix.is_empty() && require != RequirePrefix::NEVER {
        report.error(
            "commands.prefix",
            "Prefix is empty but requirePrefix is not 'never'; no command could ever match",
        );
    }
    if prefix.chars().any(char::is_whitespace) {
        report.warn("commands.prefix", "Prefix contains whitespace");
    }
}

fn validate_tokenizer(config: &ParlorConfig, report: &mut ValidationReport) {
    let Some(tokenizer) = &config.tokenizer else { return };
    let Some(blocks) = &tokenizer.blocks else { return };

    let mut seen = HashSet::new();
    for (i, block) in blocks.iter().enumerate() {
        if !seen.insert(block.start) {
            report.error(
                format!("tokenizer.blocks[{i}]"),
                format!("Duplicate block start marker '{}'", block.start),
            );
        }
        if Some(block.start) == tokenizer.base_separator && block.end != block.start {
            report.error(
                format!("tokenizer.blocks[{i}]"),
                "The base separator must map to itself",
            );
        }
    }
}

fn validate_logging(config: &ParlorConfig, report: &mut ValidationReport) {
    let Some(logging) = &config.logging else { return };
    if let Some(level) = &logging.level {
        if level.trim().is_empty() {
            report.warn("logging.level", "Empty log level; falling back to 'info'");
        }
    }
}
