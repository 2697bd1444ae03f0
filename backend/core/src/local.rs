use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::client::{ChatClient, EntityCache, SendResponse};
use crate::error::{ClientError, SendError};
use crate::message::{ChatMessage, OutgoingMessage};
use crate::types::{GroupProfile, UserProfile};

/// Default buffer size for inbound messages.
const DEFAULT_BUFFER_SIZE: usize = 256;

/// In-process chat client.
///
/// Inbound messages are injected with [`LocalClient::deliver`], replies are
/// recorded instead of being sent anywhere. Used for local runs and tests.
pub struct LocalClient {
    name: String,
    user_id: Option<i64>,
    inbound: broadcast::Sender<ChatMessage>,
    sent: Mutex<Vec<OutgoingMessage>>,
    failures: Mutex<HashMap<i64, (u16, Option<i64>)>>,
    users: RwLock<HashMap<i64, UserProfile>>,
    groups: RwLock<HashMap<i64, GroupProfile>>,
}

impl LocalClient {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer: usize) -> Self {
        let (inbound, _) = broadcast::channel(buffer);
        info!(buffer_size = buffer, "Local chat client initialized");
        Self {
            name: "local".to_string(),
            user_id: None,
            inbound,
            sent: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Set the id the client reports as its own logged-in user.
    pub fn with_user_id(mut self, id: i64) -> Self {
        self.user_id = Some(id);
        self
    }

    /// Push an inbound message to every subscriber. Returns the subscriber count.
    pub fn deliver(&self, message: ChatMessage) -> usize {
        self.inbound.send(message).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inbound.receiver_count()
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().clone()
    }

    /// Make every send to `recipient_id` fail with the given status and platform code.
    pub fn fail_sends_to(&self, recipient_id: i64, status: u16, error_code: Option<i64>) {
        self.failures.lock().insert(recipient_id, (status, error_code));
    }

    pub fn add_user(&self, profile: UserProfile) {
        self.users.write().insert(profile.id, profile);
    }

    pub fn add_group(&self, profile: GroupProfile) {
        self.groups.write().insert(profile.id, profile);
    }
}

impl Default for LocalClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatClient for LocalClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe(&self) -> broadcast::Receiver<ChatMessage> {
        self.inbound.subscribe()
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<SendResponse, ClientError> {
        let failure = self.failures.lock().get(&message.recipient_id).copied();
        if let Some((status, code)) = failure {
            let mut err = SendError::new(status, message);
            if let Some(code) = code {
                err = err.with_error_code(code);
            }
            return Err(err.into());
        }
        debug!(recipient = message.recipient_id, "Recording outgoing message");
        self.sent.lock().push(message);
        Ok(SendResponse {
            status: 200,
            message_id: None,
        })
    }

    fn current_user_id(&self) -> Option<i64> {
        self.user_id
    }

    fn entity_cache(&self) -> Option<&dyn EntityCache> {
        Some(self)
    }
}

#[async_trait]
impl EntityCache for LocalClient {
    async fn get_user(&self, id: i64) -> Option<UserProfile> {
        self.users.read().get(&id).cloned()
    }

    async fn get_group(&self, id: i64) -> Option<GroupProfile> {
        self.groups.read().get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatKind;

    #[tokio::test]
    async fn delivers_to_subscribers() {
        let client = LocalClient::new();
        let mut rx = client.subscribe();
        assert_eq!(client.deliver(ChatMessage::group(1, 2, "hello")), 1);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.text, "hello");
    }

    #[tokio::test]
    async fn deliver_without_subscribers_is_dropped() {
        let client = LocalClient::new();
        assert_eq!(client.deliver(ChatMessage::group(1, 2, "nobody")), 0);
    }

    #[tokio::test]
    async fn records_sent_and_fails_configured_recipients() {
        let client = LocalClient::new();
        client.fail_sends_to(9, 403, Some(4));

        client
            .send_message(OutgoingMessage::new(1, ChatKind::Group, "ok"))
            .await
            .unwrap();
        let err = client
            .send_message(OutgoingMessage::new(9, ChatKind::Group, "nope"))
            .await
            .unwrap_err();

        match err {
            ClientError::Send(e) => assert!(e.is_silenced()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.sent().len(), 1);
    }

    #[tokio::test]
    async fn serves_cached_profiles() {
        let client = LocalClient::new();
        client.add_user(UserProfile {
            id: 3,
            nickname: "ann".into(),
            status: String::new(),
        });
        let cache = client.entity_cache().unwrap();
        assert_eq!(cache.get_user(3).await.unwrap().nickname, "ann");
        assert!(cache.get_group(3).await.is_none());
    }
}
