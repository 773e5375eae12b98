use serde::{Deserialize, Serialize};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric, unique per chat only).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Where an outbound message goes: a numeric chat or a public `@channel`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatTarget {
    Id(ChatId),
    Username(String),
}

impl ChatTarget {
    /// Parse `CHANNEL_ID`-style values: `@name` or a signed integer.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(name) = raw.strip_prefix('@') {
            if name.is_empty() || name.contains(char::is_whitespace) {
                return None;
            }
            return Some(Self::Username(raw.to_string()));
        }
        raw.parse::<i64>().ok().map(|id| Self::Id(ChatId(id)))
    }

    /// Whether an inbound chat (id plus optional public username) is this target.
    pub fn matches(&self, chat_id: ChatId, username: Option<&str>) -> bool {
        match self {
            Self::Id(id) => *id == chat_id,
            Self::Username(name) => username
                .map(|u| u.trim_start_matches('@'))
                .is_some_and(|u| u.eq_ignore_ascii_case(name.trim_start_matches('@'))),
        }
    }
}

impl From<UserId> for ChatTarget {
    /// Private chats share their id with the user.
    fn from(user: UserId) -> Self {
        Self::Id(ChatId(user.0))
    }
}

impl std::fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id.0),
            Self::Username(name) => f.write_str(name),
        }
    }
}
