use thiserror::Error;

use crate::message::OutgoingMessage;

/// HTTP-like status the platform returns when the bot may not post.
pub const FORBIDDEN_STATUS: u16 = 403;

/// Platform error code reported when the bot is silenced or blocked for a recipient.
pub const SILENCED_ERROR_CODE: i64 = 4;

/// A reply could not be delivered by the transport.
#[derive(Debug, Error)]
#[error("sending message to {} failed with status {status}", .message.recipient_id)]
pub struct SendError {
    pub status: u16,
    pub error_code: Option<i64>,
    pub body: serde_json::Value,
    /// The message that failed, for correlation with the triggering message.
    pub message: OutgoingMessage,
}

impl SendError {
    pub fn new(status: u16, message: OutgoingMessage) -> Self {
        Self {
            status,
            error_code: None,
            body: serde_json::Value::Null,
            message,
        }
    }

    pub fn with_error_code(mut self, code: i64) -> Self {
        self.error_code = Some(code);
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    /// True when the platform refused the send because the bot is muted or blocked.
    pub fn is_silenced(&self) -> bool {
        self.status == FORBIDDEN_STATUS && self.error_code == Some(SILENCED_ERROR_CODE)
    }
}

/// Top-level error type for transport implementations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Send(#[from] SendError),

    #[error("client is not connected")]
    NotConnected,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
