//! Compiled command instances: decide whether a message triggers a command
//! and isolate its argument text.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};

use crate::context::{CommandContext, CommandContextOptions};
use crate::descriptor::CommandDescriptor;
use crate::detection::{resolve_prefix, strip_command_word};
use crate::error::CommandError;
use crate::tokenizer::ArgumentTokenizer;
use crate::types::Trigger;

/// A successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMatch {
    /// Text after the trigger.
    pub args_text: String,
    /// Positional argument tokens, in order. `None` holds the place of an
    /// unnamed regex group that did not participate in the match.
    pub tokens: Vec<Option<String>>,
    /// Every named capture group, bound to parameters by name. Named groups
    /// never appear in `tokens`.
    pub groups: HashMap<String, Option<String>>,
    pub options: CommandContextOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Matched(CommandMatch),
    NoMatch,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched(_))
    }
}

#[async_trait]
pub trait CommandInstance: Send + Sync {
    fn descriptor(&self) -> &Arc<CommandDescriptor>;

    /// Must not have side effects when the message does not match.
    async fn check_match(&self, context: &CommandContext) -> anyhow::Result<MatchResult>;

    /// Release resources held by the instance when the table is discarded.
    async fn dispose(&self) {}
}

/// Build the instance for a descriptor's trigger.
pub fn build_instance(
    descriptor: Arc<CommandDescriptor>,
    tokenizer: &Arc<ArgumentTokenizer>,
) -> Result<Arc<dyn CommandInstance>, CommandError> {
    let instance: Arc<dyn CommandInstance> = match descriptor.trigger() {
        Trigger::Text(_) => Arc::new(TextCommandInstance {
            descriptor,
            tokenizer: Arc::clone(tokenizer),
        }),
        Trigger::Regex(_) => Arc::new(RegexCommandInstance::new(descriptor)?),
    };
    Ok(instance)
}

fn effective_options(descriptor: &CommandDescriptor, context: &CommandContext) -> CommandContextOptions {
    CommandContextOptions::resolve(context.options(), descriptor.overrides())
}

// ---------------------------------------------------------------------------
// Text trigger
// ---------------------------------------------------------------------------

/// `<prefix><name> <args...>`, arguments split by the tokenizer.
pub struct TextCommandInstance {
    descriptor: Arc<CommandDescriptor>,
    tokenizer: Arc<ArgumentTokenizer>,
}

#[async_trait]
impl CommandInstance for TextCommandInstance {
    fn descriptor(&self) -> &Arc<CommandDescriptor> {
        &self.descriptor
    }

    async fn check_match(&self, context: &CommandContext) -> anyhow::Result<MatchResult> {
        let options = effective_options(&self.descriptor, context);
        let Some(text) = resolve_prefix(context.message(), &options) else {
            return Ok(MatchResult::NoMatch);
        };
        let name = self.descriptor.trigger().pattern();
        let Some(args_text) = strip_command_word(text, name, options.case_sensitive) else {
            return Ok(MatchResult::NoMatch);
        };
        Ok(MatchResult::Matched(CommandMatch {
            args_text: args_text.to_string(),
            tokens: self.tokenizer.tokenize(args_text, 0).into_iter().map(Some).collect(),
            groups: HashMap::new(),
            options,
        }))
    }
}

// ---------------------------------------------------------------------------
// Regex trigger
// ---------------------------------------------------------------------------

/// `<prefix><pattern>`; capture groups become the arguments.
pub struct RegexCommandInstance {
    descriptor: Arc<CommandDescriptor>,
    sensitive: Regex,
    insensitive: Regex,
}

impl RegexCommandInstance {
    pub fn new(descriptor: Arc<CommandDescriptor>) -> Result<Self, CommandError> {
        let pattern = descriptor.trigger().pattern();
        let compile = |case_insensitive: bool| {
            RegexBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|source| CommandError::InvalidTrigger {
                    command: descriptor.name().to_string(),
                    source,
                })
        };
        let sensitive = compile(false)?;
        let insensitive = compile(true)?;
        Ok(Self {
            descriptor,
            sensitive,
            insensitive,
        })
    }
}

#[async_trait]
impl CommandInstance for RegexCommandInstance {
    fn descriptor(&self) -> &Arc<CommandDescriptor> {
        &self.descriptor
    }

    async fn check_match(&self, context: &CommandContext) -> anyhow::Result<MatchResult> {
        let options = effective_options(&self.descriptor, context);
        let Some(text) = resolve_prefix(context.message(), &options) else {
            return Ok(MatchResult::NoMatch);
        };
        let regex = if options.case_sensitive {
            &self.sensitive
        } else {
            &self.insensitive
        };
        let Some(captures) = regex.captures(text) else {
            return Ok(MatchResult::NoMatch);
        };

        let whole = captures.get(0).map(|m| m.end()).unwrap_or(0);
        let mut tokens = Vec::new();
        let mut groups = HashMap::new();
        for (group, name) in captures.iter().zip(regex.capture_names()).skip(1) {
            let value = group.map(|m| m.as_str().to_string());
            match name {
                Some(name) => {
                    groups.insert(name.to_string(), value);
                }
                None => tokens.push(value),
            }
        }

        Ok(MatchResult::Matched(CommandMatch {
            args_text: text[whole..].trim_start().to_string(),
            tokens,
            groups,
            options,
        }))
    }
}
