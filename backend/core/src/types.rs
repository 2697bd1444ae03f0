use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Whether a chat message was posted in a group or sent privately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Group,
    Private,
}

impl ChatKind {
    pub fn is_group(self) -> bool {
        matches!(self, ChatKind::Group)
    }
}

impl fmt::Display for ChatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatKind::Group => f.write_str("group"),
            ChatKind::Private => f.write_str("private"),
        }
    }
}

bitflags! {
    /// Chat kinds in which a command prefix is mandatory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequirePrefix: u8 {
        const GROUP = 0b01;
        const PRIVATE = 0b10;
        const ALWAYS = Self::GROUP.bits() | Self::PRIVATE.bits();
    }
}

impl RequirePrefix {
    pub const NEVER: RequirePrefix = RequirePrefix::empty();

    /// True when a message of `kind` must start with the prefix.
    pub fn required_for(self, kind: ChatKind) -> bool {
        match kind {
            ChatKind::Group => self.contains(RequirePrefix::GROUP),
            ChatKind::Private => self.contains(RequirePrefix::PRIVATE),
        }
    }
}

impl Default for RequirePrefix {
    fn default() -> Self {
        RequirePrefix::ALWAYS
    }
}

/// Error returned when a `RequirePrefix` name is not recognised.
#[derive(Debug, thiserror::Error)]
#[error("unknown prefix requirement \"{0}\" (expected never, group, private or always)")]
pub struct ParseRequirePrefixError(pub String);

impl FromStr for RequirePrefix {
    type Err = ParseRequirePrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" | "none" => Ok(RequirePrefix::NEVER),
            "group" => Ok(RequirePrefix::GROUP),
            "private" => Ok(RequirePrefix::PRIVATE),
            "always" | "all" => Ok(RequirePrefix::ALWAYS),
            other => Err(ParseRequirePrefixError(other.to_string())),
        }
    }
}

impl fmt::Display for RequirePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if *self == RequirePrefix::ALWAYS {
            "always"
        } else if *self == RequirePrefix::GROUP {
            "group"
        } else if *self == RequirePrefix::PRIVATE {
            "private"
        } else {
            "never"
        };
        f.write_str(name)
    }
}

impl Serialize for RequirePrefix {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RequirePrefix {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Platform timestamp: microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_micros(self.0).single()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Timestamp(value.timestamp_micros())
    }
}

/// Cached profile of a chat user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub nickname: String,
    #[serde(default)]
    pub status: String,
}

/// Cached profile of a chat group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupProfile {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub owner_id: Option<i64>,
}
