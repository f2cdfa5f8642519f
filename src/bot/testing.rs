//! Test doubles shared by the unit test modules.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use crate::bot::access::{BanList, BanListError, BanTime, GlobalBan};
use crate::bot::outbound::{MediaSource, MediaStream, Outbound, OutboundError};

/// One call made against [`RecordingOutbound`].
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text { chat_id: i64, text: String, reply_to: Option<i64>, id: i64 },
    Photo { chat_id: i64, photo: MediaSource, caption: Option<String> },
    Media(MediaStream),
    Group { chat_id: i64, items: Vec<MediaSource>, caption: Option<String> },
    Deleted { chat_id: i64, message_id: i64 },
}

/// Outbound facade that records every call and hands out increasing ids.
pub struct RecordingOutbound {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicI64,
    admins: Mutex<HashMap<i64, Vec<i64>>>,
}

impl Default for RecordingOutbound {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1000),
            admins: Mutex::new(HashMap::new()),
        }
    }
}

impl RecordingOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_admins(&self, chat_id: i64, admins: &[i64]) {
        self.admins.lock().unwrap().insert(chat_id, admins.to_vec());
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Text of every plain message, in send order.
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Id assigned to the most recent text message.
    pub fn last_text_id(&self) -> Option<i64> {
        self.sent().into_iter().rev().find_map(|s| match s {
            Sent::Text { id, .. } => Some(id),
            _ => None,
        })
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn reply(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<i64, OutboundError> {
        let id = self.next_id();
        self.sent.lock().unwrap().push(Sent::Text { chat_id, text: text.to_string(), reply_to, id });
        Ok(id)
    }

    async fn send_media_stream(&self, media: MediaStream) -> Result<i64, OutboundError> {
        self.sent.lock().unwrap().push(Sent::Media(media));
        Ok(self.next_id())
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        items: Vec<MediaSource>,
        caption: Option<&str>,
        _reply_to: Option<i64>,
    ) -> Result<Vec<i64>, OutboundError> {
        let ids = items.iter().map(|_| self.next_id()).collect();
        self.sent.lock().unwrap().push(Sent::Group { chat_id, items, caption: caption.map(String::from) });
        Ok(ids)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: MediaSource,
        caption: Option<&str>,
        _reply_to: Option<i64>,
    ) -> Result<i64, OutboundError> {
        self.sent.lock().unwrap().push(Sent::Photo { chat_id, photo, caption: caption.map(String::from) });
        Ok(self.next_id())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), OutboundError> {
        self.sent.lock().unwrap().push(Sent::Deleted { chat_id, message_id });
        Ok(())
    }

    async fn chat_admins(&self, chat_id: i64) -> Result<Vec<i64>, OutboundError> {
        Ok(self.admins.lock().unwrap().get(&chat_id).cloned().unwrap_or_default())
    }
}

/// Ban list with a fixed set of banned ids.
#[derive(Default)]
pub struct StaticBanList {
    banned: Vec<i64>,
}

impl StaticBanList {
    pub fn banning(ids: &[i64]) -> Self {
        Self { banned: ids.to_vec() }
    }
}

#[async_trait]
impl BanList for StaticBanList {
    async fn lookup(&self, user_id: i64) -> Result<Option<GlobalBan>, BanListError> {
        Ok(self.banned.contains(&user_id).then(|| GlobalBan {
            user_id,
            reason: "spam".to_string(),
            proof: "https://example.com/proof.jpg".to_string(),
            ban_time: Some(BanTime::Text("2024-03-01T10:15:30Z".to_string())),
        }))
    }
}

/// Ban list whose every lookup fails.
pub struct FailingBanList;

#[async_trait]
impl BanList for FailingBanList {
    async fn lookup(&self, _user_id: i64) -> Result<Option<GlobalBan>, BanListError> {
        Err(BanListError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE))
    }
}
