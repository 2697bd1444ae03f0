use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ClientError;
use crate::message::{ChatMessage, OutgoingMessage};
use crate::types::{GroupProfile, UserProfile};

/// Acknowledgement returned by the platform for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Read access to cached user and group profiles.
#[async_trait]
pub trait EntityCache: Send + Sync {
    async fn get_user(&self, id: i64) -> Option<UserProfile>;
    async fn get_group(&self, id: i64) -> Option<GroupProfile>;
}

/// The connected messaging service, as seen by the command engine.
///
/// Framing, wire serialization and reconnection all live behind this trait.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Human-readable client name for logging.
    fn name(&self) -> &str;

    /// Register for chat messages. Dropping the receiver unregisters.
    fn subscribe(&self) -> broadcast::Receiver<ChatMessage>;

    /// Send a text message.
    async fn send_message(&self, message: OutgoingMessage) -> Result<SendResponse, ClientError>;

    /// Id of the user the client is logged in as, once known.
    fn current_user_id(&self) -> Option<i64> {
        None
    }

    /// Profile cache, when the client maintains one.
    fn entity_cache(&self) -> Option<&dyn EntityCache> {
        None
    }
}
