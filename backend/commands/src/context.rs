//! Invocation context handed to matchers, requirements and commands.

use std::fmt;
use std::sync::Arc;

use parlor_config::CommandsOptions;
use parlor_core::{
    ChatClient, ChatMessage, ClientError, GroupProfile, OutgoingMessage, RequirePrefix,
    SendResponse, UserProfile,
};

use crate::types::OptionOverrides;

/// Effective matching options for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContextOptions {
    pub prefix: String,
    pub require_prefix: RequirePrefix,
    pub case_sensitive: bool,
}

impl CommandContextOptions {
    /// Overrides first, global options for everything they leave unset.
    pub fn resolve(global: &CommandsOptions, overrides: &OptionOverrides) -> Self {
        Self {
            prefix: overrides
                .prefix
                .clone()
                .unwrap_or_else(|| global.prefix.clone()),
            require_prefix: overrides.require_prefix.unwrap_or(global.require_prefix),
            case_sensitive: overrides
                .case_sensitive
                .unwrap_or(!global.case_insensitive),
        }
    }
}

impl From<&CommandsOptions> for CommandContextOptions {
    fn from(global: &CommandsOptions) -> Self {
        Self::resolve(global, &OptionOverrides::default())
    }
}

/// A received message together with the client it arrived on.
#[derive(Clone)]
pub struct CommandContext {
    message: Arc<ChatMessage>,
    client: Arc<dyn ChatClient>,
    options: Arc<CommandsOptions>,
}

impl CommandContext {
    pub fn new(
        message: impl Into<Arc<ChatMessage>>,
        client: Arc<dyn ChatClient>,
        options: Arc<CommandsOptions>,
    ) -> Self {
        Self {
            message: message.into(),
            client,
            options,
        }
    }

    pub fn message(&self) -> &Arc<ChatMessage> {
        &self.message
    }

    pub fn text(&self) -> &str {
        &self.message.text
    }

    pub fn client(&self) -> &Arc<dyn ChatClient> {
        &self.client
    }

    pub fn options(&self) -> &Arc<CommandsOptions> {
        &self.options
    }

    /// Send `text` back to the chat the message came from.
    pub async fn reply(&self, text: impl Into<String>) -> Result<SendResponse, ClientError> {
        self.client
            .send_message(OutgoingMessage::reply_to(&self.message, text))
            .await
    }

    /// Cached profile of the sender, when the client keeps a cache.
    pub async fn sender_profile(&self) -> Option<UserProfile> {
        let sender = self.message.sender_id?;
        self.client.entity_cache()?.get_user(sender).await
    }

    /// Cached profile of the group, for group messages.
    pub async fn group_profile(&self) -> Option<GroupProfile> {
        if !self.message.is_group() {
            return None;
        }
        self.client
            .entity_cache()?
            .get_group(self.message.recipient_id)
            .await
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("message", &self.message)
            .field("client", &self.client.name())
            .field("options", &self.options)
            .finish()
    }
}
