use crate::domain::{ChatId, MessageId, UserId};

/// Which side of the relay a message came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Channel,
    Group,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub user_id: UserId,
    pub first_name: String,
}

/// Message payload, by content type. Media is referenced by platform file id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Photo {
        file_id: String,
        caption: Option<String>,
    },
    Video {
        file_id: String,
        caption: Option<String>,
    },
    Document {
        file_id: String,
        caption: Option<String>,
    },
    Voice {
        file_id: String,
        caption: Option<String>,
    },
    Audio {
        file_id: String,
        caption: Option<String>,
    },
    /// Stickers, polls, locations, ... anything the relay does not copy.
    Unsupported,
}

impl Content {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Photo { .. } => "photo",
            Self::Video { .. } => "video",
            Self::Document { .. } => "document",
            Self::Voice { .. } => "voice",
            Self::Audio { .. } => "audio",
            Self::Unsupported => "unsupported",
        }
    }

    pub fn caption(&self) -> Option<&str> {
        match self {
            Self::Photo { caption, .. }
            | Self::Video { caption, .. }
            | Self::Document { caption, .. }
            | Self::Voice { caption, .. }
            | Self::Audio { caption, .. } => caption.as_deref(),
            Self::Text(_) | Self::Unsupported => None,
        }
    }

    /// Same media with a different caption. Text and unsupported content are returned as-is.
    pub fn with_caption(&self, caption: String) -> Self {
        let caption = Some(caption);
        match self {
            Self::Photo { file_id, .. } => Self::Photo {
                file_id: file_id.clone(),
                caption,
            },
            Self::Video { file_id, .. } => Self::Video {
                file_id: file_id.clone(),
                caption,
            },
            Self::Document { file_id, .. } => Self::Document {
                file_id: file_id.clone(),
                caption,
            },
            Self::Voice { file_id, .. } => Self::Voice {
                file_id: file_id.clone(),
                caption,
            },
            Self::Audio { file_id, .. } => Self::Audio {
                file_id: file_id.clone(),
                caption,
            },
            other => other.clone(),
        }
    }
}

/// Incoming update as the forwarder sees it.
///
/// Telegram-specific fields stay in the Telegram adapter.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
    pub chat_username: Option<String>,
    pub message_id: MessageId,
    pub sender: Option<Sender>,
    pub content: Content,
    /// Id of the message this one replies to, in the same chat.
    pub reply_to: Option<MessageId>,
}

impl InboundMessage {
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Content::Text(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_caption_keeps_file_and_kind() {
        let voice = Content::Voice {
            file_id: "f1".to_string(),
            caption: None,
        };
        let captioned = voice.with_caption("hi".to_string());
        assert_eq!(captioned.kind(), "voice");
        assert_eq!(captioned.caption(), Some("hi"));

        let text = Content::Text("x".to_string());
        assert_eq!(text.with_caption("ignored".to_string()), text);
    }
}
