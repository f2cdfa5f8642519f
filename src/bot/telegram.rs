//! Telegram client using teloxide.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InputFile, InputMedia, InputMediaPhoto, MessageId, ReplyParameters};
use tracing::{info, warn};

use crate::bot::outbound::{MediaKind, MediaSource, MediaStream, Outbound, OutboundError};

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn input_file(source: &MediaSource) -> Result<InputFile, OutboundError> {
    match source {
        MediaSource::Url(url) => reqwest::Url::parse(url)
            .map(InputFile::url)
            .map_err(|_| OutboundError::InvalidSource(url.clone())),
        MediaSource::File(path) => Ok(InputFile::file(path.clone())),
    }
}

fn reply_params(reply_to: Option<i64>) -> Option<ReplyParameters> {
    reply_to.map(|id| ReplyParameters::new(MessageId(id as i32)))
}

fn failed(action: &'static str, e: teloxide::RequestError) -> OutboundError {
    warn!("Failed to {action}: {e}");
    OutboundError::Request { action, message: e.to_string() }
}

#[async_trait]
impl Outbound for TelegramClient {
    async fn reply(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<i64, OutboundError> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(params) = reply_params(reply_to) {
            request = request.reply_parameters(params);
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| failed("send message", e))
    }

    async fn send_media_stream(&self, media: MediaStream) -> Result<i64, OutboundError> {
        let file = input_file(&media.source)?;
        let chat_id = ChatId(media.chat_id);
        info!("🎞️ Sending {:?} to chat {}", media.kind, media.chat_id);

        let sent = match media.kind {
            MediaKind::Video => {
                let mut request = self.bot.send_video(chat_id, file);
                if let Some(cap) = media.caption {
                    request = request.caption(cap);
                }
                if let Some(params) = reply_params(media.reply_to) {
                    request = request.reply_parameters(params);
                }
                request.await.map_err(|e| failed("send video", e))?
            }
            MediaKind::Audio => {
                let mut request = self.bot.send_audio(chat_id, file);
                if let Some(cap) = media.caption {
                    request = request.caption(cap);
                }
                if let Some(params) = reply_params(media.reply_to) {
                    request = request.reply_parameters(params);
                }
                request.await.map_err(|e| failed("send audio", e))?
            }
        };

        Ok(sent.id.0 as i64)
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        items: Vec<MediaSource>,
        caption: Option<&str>,
        reply_to: Option<i64>,
    ) -> Result<Vec<i64>, OutboundError> {
        info!("🖼️ Sending media group of {} to chat {}", items.len(), chat_id);

        let mut media = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let mut photo = InputMediaPhoto::new(input_file(item)?);
            if i == 0
                && let Some(cap) = caption
            {
                photo = photo.caption(cap);
            }
            media.push(InputMedia::Photo(photo));
        }

        let mut request = self.bot.send_media_group(ChatId(chat_id), media);
        if let Some(params) = reply_params(reply_to) {
            request = request.reply_parameters(params);
        }

        request
            .await
            .map(|msgs| msgs.iter().map(|m| m.id.0 as i64).collect())
            .map_err(|e| failed("send media group", e))
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: MediaSource,
        caption: Option<&str>,
        reply_to: Option<i64>,
    ) -> Result<i64, OutboundError> {
        info!("📷 Sending photo to chat {}", chat_id);

        let mut request = self.bot.send_photo(ChatId(chat_id), input_file(&photo)?);
        if let Some(cap) = caption {
            request = request.caption(cap);
        }
        if let Some(params) = reply_params(reply_to) {
            request = request.reply_parameters(params);
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| failed("send photo", e))
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), OutboundError> {
        info!("🗑️ Deleting message {} in chat {}", message_id, chat_id);

        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id as i32))
            .await
            .map_err(|e| failed("delete message", e))?;

        Ok(())
    }

    async fn chat_admins(&self, chat_id: i64) -> Result<Vec<i64>, OutboundError> {
        let admins = self
            .bot
            .get_chat_administrators(ChatId(chat_id))
            .await
            .map_err(|e| failed("get chat admins", e))?;

        Ok(admins.iter().map(|m| m.user.id.0 as i64).collect())
    }
}
