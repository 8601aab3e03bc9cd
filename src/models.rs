//! Domain types shared by the controller, the stream session and the
//! persistence client.
//!
//! Identifiers come in two flavours: [`SessionId`] is always assigned by the
//! remote store, while [`MessageId`] is either server-assigned or a local
//! placeholder for messages that exist only on this side of the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::StreamChatError;

/// Title given to sessions the client has to describe before the store does
pub const PROVISIONAL_SESSION_TITLE: &str = "New chat";

/// Server-assigned session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = StreamChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(SessionId)
            .map_err(|_| StreamChatError::Validation(format!("invalid session id: {}", s)))
    }
}

/// Message identifier
///
/// `Local` ids are placeholders minted on the client for optimistic and
/// in-flight messages. They are never sent to the server and never shown as
/// final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    /// Authoritative id assigned by the persistence service
    Server(i64),
    /// Locally generated placeholder
    Local(Ulid),
}

impl MessageId {
    /// Mint a fresh placeholder id
    pub fn placeholder() -> Self {
        MessageId::Local(Ulid::new())
    }

    /// Returns true for locally generated ids
    pub fn is_placeholder(&self) -> bool {
        matches!(self, MessageId::Local(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Server(id) => write!(f, "{}", id),
            MessageId::Local(ulid) => write!(f, "local-{}", ulid),
        }
    }
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human side of the conversation
    User,
    /// Model reply
    Assistant,
    /// System prompt stored with the session
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        f.write_str(s)
    }
}

/// A single message in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server id, or a placeholder until the server supplies one
    pub id: MessageId,
    /// Owning session; `None` only for the optimistic first message of a
    /// conversation whose session has not been minted yet
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// Author
    pub role: Role,
    /// Full text (never a delta)
    pub content: String,
    /// Creation time
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Free-form metadata attached by the server (e.g. token usage)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    /// Token count reported by the server
    #[serde(default)]
    pub token_count: u32,
}

impl ChatMessage {
    /// Build an optimistic user message with a placeholder id
    pub fn user(session_id: Option<SessionId>, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::placeholder(),
            session_id,
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            metadata: None,
            token_count: 0,
        }
    }

    /// Build an empty assistant message with a placeholder id
    pub fn assistant_placeholder(session_id: Option<SessionId>) -> Self {
        Self {
            id: MessageId::placeholder(),
            session_id,
            role: Role::Assistant,
            content: String::new(),
            created_at: Utc::now(),
            metadata: None,
            token_count: 0,
        }
    }
}

/// Summary of a persisted session as returned by the persistence service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Server-assigned id
    pub id: SessionId,
    /// Display title
    pub title: String,
    /// Creation time
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last activity
    #[serde(default, with = "timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Time of the first user message
    #[serde(default, with = "timestamp::option")]
    pub first_question_time: Option<DateTime<Utc>>,
    /// Soft-delete flag
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Model backing the session
    #[serde(default)]
    pub model_name: String,
    /// System prompt
    #[serde(default)]
    pub system_message: String,
    /// Sampling temperature (the server keeps it as a string)
    #[serde(default)]
    pub temperature: String,
    /// Completion token cap
    #[serde(default)]
    pub max_tokens: u32,
    /// Number of user messages
    #[serde(default)]
    pub message_count: u32,
}

fn default_true() -> bool {
    true
}

impl ChatSession {
    /// Minimal summary used when the store cannot be asked for the real one
    pub fn provisional(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: PROVISIONAL_SESSION_TITLE.to_string(),
            created_at: Some(now),
            updated_at: Some(now),
            first_question_time: None,
            is_active: true,
            model_name: String::new(),
            system_message: String::new(),
            temperature: String::new(),
            max_tokens: 0,
            message_count: 0,
        }
    }
}

/// Controller status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    /// No exchange in progress
    #[default]
    Idle,
    /// Stream open, no assistant content yet
    Waiting,
    /// Assistant content is arriving
    Typing,
    /// Last exchange failed
    Error,
}

impl ChatStatus {
    /// Returns true while an exchange is outstanding
    pub fn is_busy(&self) -> bool {
        matches!(self, ChatStatus::Waiting | ChatStatus::Typing)
    }
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChatStatus::Idle => "idle",
            ChatStatus::Waiting => "waiting",
            ChatStatus::Typing => "typing",
            ChatStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Failure recorded for the last exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeError {
    /// Machine-readable code (`transport_error`, `decode_error`, server codes)
    pub code: String,
    /// Human-readable message
    pub message: String,
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page, in server order
    pub items: Vec<T>,
    /// Total number of items across pages
    #[serde(default)]
    pub total: u64,
    /// 1-based page number
    #[serde(default = "default_page")]
    pub page: u32,
    /// Page size
    #[serde(default)]
    pub size: u32,
    /// Number of pages
    #[serde(default)]
    pub pages: u32,
}

fn default_page() -> u32 {
    1
}

/// Timestamp (de)serialization tolerant of the naive ISO-8601 strings the
/// persistence service emits. Naive values are taken as UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub mod option {
        use super::parse;
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            match raw {
                None => Ok(None),
                Some(s) => parse(&s)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s))),
            }
        }
    }
}
