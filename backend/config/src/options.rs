//! Runtime options derived from a prepared config.

use std::collections::BTreeMap;

use parlor_core::RequirePrefix;

use crate::defaults::{DEFAULT_BASE_SEPARATOR, DEFAULT_BLOCKS, DEFAULT_PREFIX};
use crate::schema::ParlorConfig;

/// Global command matching options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandsOptions {
    pub prefix: String,
    pub case_insensitive: bool,
    pub require_prefix: RequirePrefix,
    pub ignore_own_messages: bool,
    pub enable_help_command: bool,
}

impl Default for CommandsOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            case_insensitive: true,
            require_prefix: RequirePrefix::ALWAYS,
            ignore_own_messages: true,
            enable_help_command: true,
        }
    }
}

impl From<&ParlorConfig> for CommandsOptions {
    fn from(config: &ParlorConfig) -> Self {
        let defaults = Self::default();
        let Some(commands) = &config.commands else { return defaults };
        Self {
            prefix: commands.prefix.clone().unwrap_or(defaults.prefix),
            case_insensitive: commands.case_insensitive.unwrap_or(defaults.case_insensitive),
            require_prefix: commands.require_prefix.unwrap_or(defaults.require_prefix),
            ignore_own_messages: commands
                .ignore_own_messages
                .unwrap_or(defaults.ignore_own_messages),
            enable_help_command: commands
                .enable_help_command
                .unwrap_or(defaults.enable_help_command),
        }
    }
}

/// Argument tokenizer markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizerOptions {
    pub base_separator: char,
    /// Start marker -> end marker. Always contains the base separator.
    pub blocks: BTreeMap<char, char>,
}

impl TokenizerOptions {
    pub fn new(base_separator: char, blocks: impl IntoIterator<Item = (char, char)>) -> Self {
        let mut blocks: BTreeMap<char, char> = blocks.into_iter().collect();
        blocks.insert(base_separator, base_separator);
        Self {
            base_separator,
            blocks,
        }
    }
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self::new(
            DEFAULT_BASE_SEPARATOR,
            DEFAULT_BLOCKS.iter().map(|b| (b.start, b.end)),
        )
    }
}

impl From<&ParlorConfig> for TokenizerOptions {
    fn from(config: &ParlorConfig) -> Self {
        let Some(tokenizer) = &config.tokenizer else { return Self::default() };
        let base = tokenizer.base_separator.unwrap_or(DEFAULT_BASE_SEPARATOR);
        match &tokenizer.blocks {
            Some(blocks) => Self::new(base, blocks.iter().map(|b| (b.start, b.end))),
            None => Self::new(base, DEFAULT_BLOCKS.iter().map(|b| (b.start, b.end))),
        }
    }
}
