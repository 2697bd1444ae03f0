use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::ChatKind;

/// A chat message received from the messaging service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub text: String,
    /// Absent for some system-originated messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<i64>,
    /// Group id for group messages, receiving user id for private ones.
    pub recipient_id: i64,
    pub kind: ChatKind,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn group(group_id: i64, sender_id: i64, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            sender_id: Some(sender_id),
            recipient_id: group_id,
            kind: ChatKind::Group,
            timestamp: Utc::now(),
        }
    }

    pub fn private(recipient_id: i64, sender_id: i64, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            sender_id: Some(sender_id),
            recipient_id,
            kind: ChatKind::Private,
            timestamp: Utc::now(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind.is_group()
    }

    /// Where a reply to this message has to go: the group, or the private sender.
    pub fn reply_target(&self) -> i64 {
        match self.kind {
            ChatKind::Group => self.recipient_id,
            ChatKind::Private => self.sender_id.unwrap_or(self.recipient_id),
        }
    }
}

/// A text message the bot sends out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub recipient_id: i64,
    pub kind: ChatKind,
    pub text: String,
}

impl OutgoingMessage {
    pub fn new(recipient_id: i64, kind: ChatKind, text: impl Into<String>) -> Self {
        Self {
            recipient_id,
            kind,
            text: text.into(),
        }
    }

    /// Reply into the chat `message` came from.
    pub fn reply_to(message: &ChatMessage, text: impl Into<String>) -> Self {
        Self::new(message.reply_target(), message.kind, text)
    }
}
