/// Command model types: triggers, option overrides and command results.
use std::fmt;

use parlor_core::RequirePrefix;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// The rule that decides whether a message invokes a command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Prefix, then the command word, then whitespace-separated arguments.
    Text(String),
    /// Prefix, then a regular expression; capture groups become arguments.
    Regex(String),
}

impl Trigger {
    pub fn text(name: impl Into<String>) -> Self {
        Trigger::Text(name.into())
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Trigger::Regex(pattern.into())
    }

    /// Command word or regex source.
    pub fn pattern(&self) -> &str {
        match self {
            Trigger::Text(name) | Trigger::Regex(name) => name,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Text(name) => write!(f, "{name}"),
            Trigger::Regex(pattern) => write!(f, "/{pattern}/"),
        }
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Matching options set on a handler type or a single command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct OptionOverrides {
    pub prefix: Option<String>,
    pub require_prefix: Option<RequirePrefix>,
    pub case_sensitive: Option<bool>,
}

impl OptionOverrides {
    /// Fields set on `self` win; unset ones come from `fallback`.
    pub fn or(&self, fallback: &OptionOverrides) -> OptionOverrides {
        OptionOverrides {
            prefix: self.prefix.clone().or_else(|| fallback.prefix.clone()),
            require_prefix: self.require_prefix.or(fallback.require_prefix),
            case_sensitive: self.case_sensitive.or(fallback.case_sensitive),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_none() && self.require_prefix.is_none() && self.case_sensitive.is_none()
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    /// Trigger matched but the command declined; try the next candidate.
    Skip,
    Failure,
}

/// Outcome of one command attempt.
///
/// `messages` are reply texts sent back to the originating chat.
#[derive(Debug)]
pub struct CommandResult {
    status: CommandStatus,
    error: Option<anyhow::Error>,
    messages: Vec<String>,
}

impl CommandResult {
    pub fn new(status: CommandStatus, messages: Vec<String>) -> Self {
        Self {
            status,
            error: None,
            messages,
        }
    }

    pub fn success() -> Self {
        Self::new(CommandStatus::Success, Vec::new())
    }

    /// Success with a single reply.
    pub fn reply(text: impl Into<String>) -> Self {
        Self::new(CommandStatus::Success, vec![text.into()])
    }

    pub fn skip() -> Self {
        Self::new(CommandStatus::Skip, Vec::new())
    }

    pub fn failure(messages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(
            CommandStatus::Failure,
            messages.into_iter().map(Into::into).collect(),
        )
    }

    pub fn from_error(error: anyhow::Error) -> Self {
        Self {
            status: CommandStatus::Failure,
            error: Some(error),
            messages: Vec::new(),
        }
    }

    /// Returned when no command handled a message.
    pub fn not_handled() -> Self {
        Self::new(CommandStatus::Failure, Vec::new())
    }

    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        self.messages.push(text.into());
        self
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }

    pub fn is_skip(&self) -> bool {
        self.status == CommandStatus::Skip
    }

    pub fn is_failure(&self) -> bool {
        self.status == CommandStatus::Failure
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}
