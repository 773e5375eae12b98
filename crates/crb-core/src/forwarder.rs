//! Relay logic between private chats and the channel.
//!
//! User messages are copied into the channel with an attribution line and the
//! resulting channel post is recorded in the mapping store. Replies to those
//! posts inside the channel are copied back to the original sender.

use std::{sync::Arc, time::Duration};

use tracing::{debug, error, info, warn};

use crate::{
    domain::{ChatTarget, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::RelayPort,
        types::{ChatKind, Content, InboundMessage},
    },
    store::{MappingStore, MessageMapping},
    Result,
};

pub const START_GREETING: &str =
    "Hi! I'm a message relay bot. Send me anything and I'll post it to the channel.";
pub const ACK_FORWARDED: &str = "Your message has been sent to the channel!";
pub const ACK_UNTRACKED: &str = "Your message has been sent to the channel, but replies to it cannot be delivered back to you.";
pub const NOTICE_FORWARD_FAILED: &str = "Could not send your message to the channel.";
pub const NOTICE_GENERIC_ERROR: &str = "An error occurred while processing your message.";

const REPLY_LABEL: &str = "Reply from the channel";
const REPLY_UNSUPPORTED: &str = "Received a reply from the channel (unsupported content type)";

/// What the forwarder did with one inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    Greeted,
    Forwarded {
        channel_message: MessageId,
        mapping_saved: bool,
    },
    Replied {
        user_id: UserId,
    },
    Ignored(&'static str),
    /// Channel reply to a post the store does not know about.
    Dropped {
        replied_to: MessageId,
    },
    Failed(String),
}

pub struct Forwarder {
    store: Arc<MappingStore>,
    port: Arc<dyn RelayPort>,
    channel: ChatTarget,
    send_timeout: Duration,
    bot_username: Option<String>,
}

impl Forwarder {
    pub fn new(
        store: Arc<MappingStore>,
        port: Arc<dyn RelayPort>,
        channel: ChatTarget,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            port,
            channel,
            send_timeout,
            bot_username: None,
        }
    }

    /// The bot's own username, so `/start@<name>` is recognised.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    /// Route one inbound message by the kind of chat it arrived in.
    pub async fn handle(&self, msg: InboundMessage) -> Disposition {
        match msg.chat_kind {
            ChatKind::Private => self.handle_private(&msg).await,
            ChatKind::Channel => self.on_channel_reply(&msg).await,
            ChatKind::Group => {
                info!(chat_id = msg.chat_id.0, "ignoring message from group chat");
                Disposition::Ignored("group chat")
            }
        }
    }

    async fn handle_private(&self, msg: &InboundMessage) -> Disposition {
        let user_chat = ChatTarget::Id(msg.chat_id);

        if msg
            .text()
            .is_some_and(|t| is_start_command(t, self.bot_username.as_deref()))
        {
            return match self.send_text(&user_chat, START_GREETING).await {
                Ok(_) => Disposition::Greeted,
                Err(e) => {
                    error!(chat_id = msg.chat_id.0, error = %e, "failed to send greeting");
                    Disposition::Failed(e.to_string())
                }
            };
        }

        match self.on_user_message(msg).await {
            Ok(d) => d,
            Err(e) => {
                error!(chat_id = msg.chat_id.0, error = %e, "failed to handle user message");
                if let Err(e) = self.send_text(&user_chat, NOTICE_GENERIC_ERROR).await {
                    warn!(chat_id = msg.chat_id.0, error = %e, "failed to send error notice");
                }
                Disposition::Failed(e.to_string())
            }
        }
    }

    /// Post a user's message to the channel and remember where it landed.
    pub async fn on_user_message(&self, msg: &InboundMessage) -> Result<Disposition> {
        let Some(sender) = &msg.sender else {
            return Ok(Disposition::Ignored("no sender"));
        };
        let user_chat = ChatTarget::Id(msg.chat_id);

        let post = channel_post_for(&sender.first_name, &msg.content);
        let posted = match self.send(&self.channel, &post).await {
            Ok(r) => r,
            Err(e) => {
                error!(
                    user_id = sender.user_id.0,
                    kind = msg.content.kind(),
                    error = %e,
                    "failed to post to channel"
                );
                self.send_text(&user_chat, NOTICE_FORWARD_FAILED).await?;
                return Ok(Disposition::Failed(e.to_string()));
            }
        };

        let mapping_saved = self
            .store
            .append(MessageMapping::new(
                sender.user_id,
                msg.message_id,
                posted.message_id,
                Some(sender.first_name.clone()),
            ))
            .await;

        let ack = if mapping_saved {
            ACK_FORWARDED
        } else {
            ACK_UNTRACKED
        };
        self.send_text(&user_chat, ack).await?;

        info!(
            user_id = sender.user_id.0,
            channel_message_id = posted.message_id.0,
            kind = msg.content.kind(),
            "forwarded user message to channel"
        );
        Ok(Disposition::Forwarded {
            channel_message: posted.message_id,
            mapping_saved,
        })
    }

    /// Copy a channel reply back to the user whose post it answers.
    ///
    /// Nothing is ever posted into the channel from here.
    pub async fn on_channel_reply(&self, msg: &InboundMessage) -> Disposition {
        if !self
            .channel
            .matches(msg.chat_id, msg.chat_username.as_deref())
        {
            debug!(chat_id = msg.chat_id.0, "ignoring post from another channel");
            return Disposition::Ignored("foreign channel");
        }
        let Some(replied_to) = msg.reply_to else {
            return Disposition::Ignored("not a reply");
        };

        let Some(user_id) = self.store.find_user_by_channel_message(replied_to).await else {
            warn!(replied_to = replied_to.0, "no user found for channel reply");
            return Disposition::Dropped { replied_to };
        };

        let reply = user_reply_for(&msg.content);
        match self.send(&ChatTarget::from(user_id), &reply).await {
            Ok(_) => {
                info!(user_id = user_id.0, kind = reply.kind(), "forwarded channel reply to user");
                Disposition::Replied { user_id }
            }
            Err(e) => {
                error!(user_id = user_id.0, error = %e, "failed to forward channel reply");
                Disposition::Failed(e.to_string())
            }
        }
    }

    async fn send(&self, to: &ChatTarget, content: &Content) -> Result<MessageRef> {
        tokio::time::timeout(self.send_timeout, self.port.send(to, content))
            .await
            .map_err(|_| {
                Error::External(format!(
                    "sending {} to {to} timed out after {:?}",
                    content.kind(),
                    self.send_timeout
                ))
            })?
    }

    async fn send_text(&self, to: &ChatTarget, text: &str) -> Result<MessageRef> {
        self.send(to, &Content::Text(text.to_string())).await
    }
}

/// `/start` and `/start payload` always count. `/start@name` only when `name`
/// is this bot.
fn is_start_command(text: &str, bot_username: Option<&str>) -> bool {
    let Some(first) = text.split_whitespace().next() else {
        return false;
    };
    match first.split_once('@') {
        None => first == "/start",
        Some((cmd, mention)) => {
            cmd == "/start"
                && bot_username.is_some_and(|me| me.eq_ignore_ascii_case(mention))
        }
    }
}

/// The channel copy of a user's message, labelled with the sender's name.
pub fn channel_post_for(name: &str, content: &Content) -> Content {
    match content {
        Content::Text(text) => Content::Text(format!("Message from user {name}:\n\n{text}")),
        Content::Voice { .. } => content.with_caption(format!("Voice message from user {name}")),
        Content::Unsupported => {
            Content::Text(format!("Unsupported content type from user {name}"))
        }
        media => {
            let label = match media {
                Content::Photo { .. } => "Photo",
                Content::Video { .. } => "Video",
                Content::Document { .. } => "Document",
                _ => "Audio",
            };
            media.with_caption(append_caption(
                format!("{label} from user {name}"),
                media.caption(),
            ))
        }
    }
}

/// The private-chat copy of a channel reply.
pub fn user_reply_for(content: &Content) -> Content {
    match content {
        Content::Text(text) => Content::Text(format!("{REPLY_LABEL}:\n\n{text}")),
        Content::Unsupported => Content::Text(REPLY_UNSUPPORTED.to_string()),
        media => media.with_caption(append_caption(REPLY_LABEL.to_string(), media.caption())),
    }
}

fn append_caption(mut label: String, original: Option<&str>) -> String {
    if let Some(c) = original.filter(|c| !c.trim().is_empty()) {
        label.push_str("\n\n");
        label.push_str(c);
    }
    label
}
