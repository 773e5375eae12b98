//! Telegram adapter (teloxide).
//!
//! Implements the `crb-core` RelayPort over the Bot API and hosts the update
//! routing for both webhook and long-polling modes.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InputFile, Recipient},
};

pub mod convert;
pub mod router;
pub mod webhook;

use crb_core::{
    domain::{ChatId, ChatTarget, MessageId, MessageRef},
    errors::Error,
    messaging::{port::RelayPort, types::Content},
    Result,
};

#[derive(Clone)]
pub struct TelegramRelay {
    bot: Bot,
}

impl TelegramRelay {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_recipient(to: &ChatTarget) -> Recipient {
        match to {
            ChatTarget::Id(id) => Recipient::Id(teloxide::types::ChatId(id.0)),
            ChatTarget::Username(name) => Recipient::ChannelUsername(name.clone()),
        }
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }
}

#[async_trait]
impl RelayPort for TelegramRelay {
    async fn send(&self, to: &ChatTarget, content: &Content) -> Result<MessageRef> {
        let chat = Self::tg_recipient(to);
        let sent = match content {
            Content::Text(text) => self.bot.send_message(chat, text.clone()).await,
            Content::Photo { file_id, caption } => {
                let mut req = self.bot.send_photo(chat, InputFile::file_id(file_id.clone()));
                if let Some(c) = caption {
                    req = req.caption(c.clone());
                }
                req.await
            }
            Content::Video { file_id, caption } => {
                let mut req = self.bot.send_video(chat, InputFile::file_id(file_id.clone()));
                if let Some(c) = caption {
                    req = req.caption(c.clone());
                }
                req.await
            }
            Content::Document { file_id, caption } => {
                let mut req = self
                    .bot
                    .send_document(chat, InputFile::file_id(file_id.clone()));
                if let Some(c) = caption {
                    req = req.caption(c.clone());
                }
                req.await
            }
            Content::Voice { file_id, caption } => {
                let mut req = self.bot.send_voice(chat, InputFile::file_id(file_id.clone()));
                if let Some(c) = caption {
                    req = req.caption(c.clone());
                }
                req.await
            }
            Content::Audio { file_id, caption } => {
                let mut req = self.bot.send_audio(chat, InputFile::file_id(file_id.clone()));
                if let Some(c) = caption {
                    req = req.caption(c.clone());
                }
                req.await
            }
            Content::Unsupported => {
                return Err(Error::External(format!(
                    "cannot send unsupported content to {to}"
                )));
            }
        }
        .map_err(Self::map_err)?;

        Ok(MessageRef {
            chat_id: ChatId(sent.chat.id.0),
            message_id: MessageId(sent.id.0),
        })
    }
}
