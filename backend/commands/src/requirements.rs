//! Preconditions checked after a command matched and before its handler is
//! resolved.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::context::CommandContext;
use crate::services::Services;

#[async_trait]
pub trait CommandRequirement: Send + Sync {
    async fn check(&self, context: &CommandContext, services: &Services) -> anyhow::Result<bool>;

    /// Reply sent when the requirement is not met.
    fn error_message(&self) -> Option<&str> {
        None
    }
}

/// Only messages posted in a group.
#[derive(Debug, Clone, Default)]
pub struct GroupOnly {
    message: Option<String>,
}

impl GroupOnly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

#[async_trait]
impl CommandRequirement for GroupOnly {
    async fn check(&self, context: &CommandContext, _services: &Services) -> anyhow::Result<bool> {
        Ok(context.message().is_group())
    }

    fn error_message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Only private messages.
#[derive(Debug, Clone, Default)]
pub struct PrivateOnly {
    message: Option<String>,
}

impl PrivateOnly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

#[async_trait]
impl CommandRequirement for PrivateOnly {
    async fn check(&self, context: &CommandContext, _services: &Services) -> anyhow::Result<bool> {
        Ok(!context.message().is_group())
    }

    fn error_message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Only messages from the listed senders.
#[derive(Debug, Clone, Default)]
pub struct SenderIn {
    ids: HashSet<i64>,
    message: Option<String>,
}

impl SenderIn {
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[async_trait]
impl CommandRequirement for SenderIn {
    async fn check(&self, context: &CommandContext, _services: &Services) -> anyhow::Result<bool> {
        Ok(context
            .message()
            .sender_id
            .is_some_and(|id| self.ids.contains(&id)))
    }

    fn error_message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}
