//! Config defaults: applies default values to parsed config.

use parlor_core::RequirePrefix;

use crate::schema::{BlockMarker, CommandsConfig, LoggingConfig, ParlorConfig, TokenizerConfig};

/// Default command prefix.
pub const DEFAULT_PREFIX: &str = "!";

/// Default argument separator.
pub const DEFAULT_BASE_SEPARATOR: char = ' ';

/// Default grouping markers, in addition to the base separator.
pub const DEFAULT_BLOCKS: [BlockMarker; 3] = [
    BlockMarker::new('"', '"'),
    BlockMarker::new('(', ')'),
    BlockMarker::new('[', ']'),
];

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: ParlorConfig) -> ParlorConfig {
    let config = apply_command_defaults(config);
    let config = apply_tokenizer_defaults(config);
    apply_logging_defaults(config)
}

fn apply_command_defaults(mut config: ParlorConfig) -> ParlorConfig {
    let commands = config.commands.get_or_insert_with(CommandsConfig::default);
    if commands.prefix.is_none() {
        commands.prefix = Some(DEFAULT_PREFIX.to_string());
    }
    if commands.case_insensitive.is_none() {
        commands.case_insensitive = Some(true);
    }
    if commands.require_prefix.is_none() {
        commands.require_prefix = Some(RequirePrefix::ALWAYS);
    }
    if commands.ignore_own_messages.is_none() {
        commands.ignore_own_messages = Some(true);
    }
    if commands.enable_help_command.is_none() {
        commands.enable_help_command = Some(true);
    }
    config
}

/// The base separator always maps to itself, whatever the user configured.
fn apply_tokenizer_defaults(mut config: ParlorConfig) -> ParlorConfig {
    let tokenizer = config.tokenizer.get_or_insert_with(TokenizerConfig::default);
    let base = *tokenizer.base_separator.get_or_insert(DEFAULT_BASE_SEPARATOR);
    let blocks = tokenizer.blocks.get_or_insert_with(|| DEFAULT_BLOCKS.to_vec());
    if !blocks.iter().any(|b| b.start == base) {
        blocks.insert(0, BlockMarker::new(base, base));
    }
    config
}

fn apply_logging_defaults(mut config: ParlorConfig) -> ParlorConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    if logging.level.is_none() {
        logging.level = Some(DEFAULT_LOG_LEVEL.to_string());
    }
    if logging.json.is_none() {
        logging.json = Some(false);
    }
    config
}
