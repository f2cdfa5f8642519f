//! The messaging facade: the only way the pipeline and commands talk back
//! to the platform.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("failed to {action}: {message}")]
    Request { action: &'static str, message: String },
    #[error("invalid media source '{0}'")]
    InvalidSource(String),
}

/// Where a piece of media comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    Url(String),
    File(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaKind {
    #[default]
    Audio,
    Video,
}

/// A single audio or video message.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaStream {
    pub source: MediaSource,
    pub caption: Option<String>,
    pub chat_id: i64,
    pub reply_to: Option<i64>,
    pub kind: MediaKind,
}

/// Outbound side of the platform. Sends return the new message's id.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn reply(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<i64, OutboundError>;

    async fn send_media_stream(&self, media: MediaStream) -> Result<i64, OutboundError>;

    /// Send several photos as one album. The caption goes on the first item.
    async fn send_media_group(
        &self,
        chat_id: i64,
        items: Vec<MediaSource>,
        caption: Option<&str>,
        reply_to: Option<i64>,
    ) -> Result<Vec<i64>, OutboundError>;

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: MediaSource,
        caption: Option<&str>,
        reply_to: Option<i64>,
    ) -> Result<i64, OutboundError>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), OutboundError>;

    /// User ids of the chat's current administrators. Not cached.
    async fn chat_admins(&self, chat_id: i64) -> Result<Vec<i64>, OutboundError>;
}
