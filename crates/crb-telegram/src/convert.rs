use teloxide::types::{Chat, Message};

use crb_core::{
    domain::{ChatId, MessageId, UserId},
    messaging::types::{ChatKind, Content, InboundMessage, Sender},
};

/// Flatten a Telegram message into the forwarder's model.
pub fn inbound_from_message(msg: &Message) -> InboundMessage {
    let sender = msg.from().map(|u| Sender {
        user_id: UserId(u.id.0 as i64),
        first_name: u.first_name.clone(),
    });

    InboundMessage {
        chat_id: ChatId(msg.chat.id.0),
        chat_kind: chat_kind(&msg.chat),
        chat_username: msg.chat.username().map(str::to_string),
        message_id: MessageId(msg.id.0),
        sender,
        content: content_of(msg),
        reply_to: msg.reply_to_message().map(|m| MessageId(m.id.0)),
    }
}

fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else if chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Group
    }
}

fn content_of(msg: &Message) -> Content {
    let caption = msg.caption().map(str::to_string);

    if let Some(text) = msg.text() {
        return Content::Text(text.to_string());
    }
    // Telegram lists sizes smallest first; relay the largest.
    if let Some(best) = msg.photo().and_then(|sizes| sizes.last()) {
        return Content::Photo {
            file_id: best.file.id.clone(),
            caption,
        };
    }
    if let Some(video) = msg.video() {
        return Content::Video {
            file_id: video.file.id.clone(),
            caption,
        };
    }
    if let Some(doc) = msg.document() {
        return Content::Document {
            file_id: doc.file.id.clone(),
            caption,
        };
    }
    if let Some(voice) = msg.voice() {
        return Content::Voice {
            file_id: voice.file.id.clone(),
            caption,
        };
    }
    if let Some(audio) = msg.audio() {
        return Content::Audio {
            file_id: audio.file.id.clone(),
            caption,
        };
    }
    Content::Unsupported
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn alice() -> Value {
        json!({ "id": 42, "is_bot": false, "first_name": "Alice", "username": "alice" })
    }

    fn private_chat() -> Value {
        json!({ "id": 42, "type": "private", "first_name": "Alice", "username": "alice" })
    }

    fn news_channel() -> Value {
        json!({ "id": -100500, "type": "channel", "title": "News", "username": "news" })
    }

    fn message(value: Value) -> Message {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn private_text_message() {
        let msg = message(json!({
            "message_id": 7,
            "date": 1_700_000_000,
            "chat": private_chat(),
            "from": alice(),
            "text": "hello there",
        }));

        let inbound = inbound_from_message(&msg);
        assert_eq!(inbound.chat_id, ChatId(42));
        assert_eq!(inbound.chat_kind, ChatKind::Private);
        assert_eq!(inbound.message_id, MessageId(7));
        assert_eq!(
            inbound.sender,
            Some(Sender {
                user_id: UserId(42),
                first_name: "Alice".to_string(),
            })
        );
        assert_eq!(inbound.content, Content::Text("hello there".to_string()));
        assert_eq!(inbound.reply_to, None);
    }

    #[test]
    fn photo_uses_largest_size_and_keeps_caption() {
        let msg = message(json!({
            "message_id": 8,
            "date": 1_700_000_000,
            "chat": private_chat(),
            "from": alice(),
            "photo": [
                { "file_id": "small", "file_unique_id": "s", "file_size": 100, "width": 90, "height": 90 },
                { "file_id": "large", "file_unique_id": "l", "file_size": 9000, "width": 1280, "height": 1280 },
            ],
            "caption": "sunset",
        }));

        assert_eq!(
            inbound_from_message(&msg).content,
            Content::Photo {
                file_id: "large".to_string(),
                caption: Some("sunset".to_string()),
            }
        );
    }

    #[test]
    fn channel_reply_has_no_sender_and_keeps_reply_target() {
        let msg = message(json!({
            "message_id": 901,
            "date": 1_700_000_100,
            "chat": news_channel(),
            "text": "answer",
            "reply_to_message": {
                "message_id": 900,
                "date": 1_700_000_000,
                "chat": news_channel(),
                "text": "Message from user Alice:\n\nquestion",
            },
        }));

        let inbound = inbound_from_message(&msg);
        assert_eq!(inbound.chat_kind, ChatKind::Channel);
        assert_eq!(inbound.chat_id, ChatId(-100500));
        assert_eq!(inbound.chat_username.as_deref(), Some("news"));
        assert_eq!(inbound.sender, None);
        assert_eq!(inbound.reply_to, Some(MessageId(900)));
    }

    #[test]
    fn group_chat_is_classified_as_group() {
        let msg = message(json!({
            "message_id": 3,
            "date": 1_700_000_000,
            "chat": { "id": -77, "type": "group", "title": "Team" },
            "from": alice(),
            "text": "hi all",
        }));

        assert_eq!(inbound_from_message(&msg).chat_kind, ChatKind::Group);
    }

    #[test]
    fn location_is_unsupported() {
        let msg = message(json!({
            "message_id": 4,
            "date": 1_700_000_000,
            "chat": private_chat(),
            "from": alice(),
            "location": { "latitude": 52.37, "longitude": 4.89 },
        }));

        assert_eq!(inbound_from_message(&msg).content, Content::Unsupported);
    }
}
