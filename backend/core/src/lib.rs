pub mod client;
pub mod error;
pub mod local;
pub mod message;
pub mod types;

pub use client::{ChatClient, EntityCache, SendResponse};
pub use error::{ClientError, SendError, FORBIDDEN_STATUS, SILENCED_ERROR_CODE};
pub use local::LocalClient;
pub use message::{ChatMessage, OutgoingMessage};
pub use types::{ChatKind, GroupProfile, RequirePrefix, Timestamp, UserProfile};
