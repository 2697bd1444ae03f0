//! Parlor configuration schema.
//!
//! Every field is optional on disk; `defaults::apply_all_defaults` fills the
//! gaps before the config is turned into runtime options.

use parlor_core::RequirePrefix;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParlorConfig {
    /// Command matching settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<CommandsConfig>,

    /// Argument tokenizer markers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<TokenizerConfig>,

    /// Logging configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_insensitive: Option<bool>,

    /// "never" | "group" | "private" | "always"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_prefix: Option<RequirePrefix>,

    /// Drop messages the bot account sent itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_own_messages: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_help_command: Option<bool>,
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenizerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_separator: Option<char>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<BlockMarker>>,
}

/// A start/end character pair that groups argument text into one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMarker {
    pub start: char,
    pub end: char,
}

impl BlockMarker {
    pub const fn new(start: char, end: char) -> Self {
        Self { start, end }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// "trace" | "debug" | "info" | "warn" | "error", or a full filter directive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Directory for rolling NDJSON log files; console only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Emit JSON on the console too
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,
}
