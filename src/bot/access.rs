//! Access control: bot admins, group admins, and the three ban levels.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::bot::database::{ThreadRecord, UserRecord};

/// Upper bound on one ban-list fetch, connect to last byte.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Error)]
pub enum BanListError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {0}")]
    Status(reqwest::StatusCode),
}

/// An id that the remote list may encode as either a string or a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    fn matches(&self, user_id: i64) -> bool {
        match self {
            RawId::Number(id) => *id == user_id,
            RawId::Text(id) => id.trim().parse::<i64>().is_ok_and(|id| id == user_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BanTime {
    /// Milliseconds since the Unix epoch.
    Millis(i64),
    Text(String),
}

impl BanTime {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            BanTime::Millis(ms) => DateTime::from_timestamp_millis(*ms),
            BanTime::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }

    /// "October 17th 2026, 5:04:09 AM". Unparseable text is shown as-is.
    pub fn display(&self) -> String {
        match (self.to_datetime(), self) {
            (Some(dt), _) => format!(
                "{} {}{} {}",
                dt.format("%B"),
                dt.day(),
                ordinal_suffix(dt.day()),
                dt.format("%Y, %-I:%M:%S %p"),
            ),
            (None, BanTime::Text(s)) => s.clone(),
            (None, BanTime::Millis(ms)) => ms.to_string(),
        }
    }
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// One list entry. Only `userId` must be well-formed; the other fields
/// degrade to empty or unknown.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBan {
    user_id: RawId,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    proof: Option<String>,
    #[serde(default)]
    ban_time: Option<Value>,
}

/// A hit on the global ban list.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalBan {
    pub user_id: i64,
    pub reason: String,
    /// Photo URL shown with the public notice.
    pub proof: String,
    pub ban_time: Option<BanTime>,
}

impl GlobalBan {
    /// Caption of the public ban notice.
    pub fn notice(&self, mention: &str) -> String {
        let time = self
            .ban_time
            .as_ref()
            .map(BanTime::display)
            .unwrap_or_else(|| "unknown".to_string());
        format!("🚫 @{} is Globally Banned\nReason: {}\nTime: {}", mention, self.reason, time)
    }
}

/// Source of global bans.
#[async_trait]
pub trait BanList: Send + Sync {
    async fn lookup(&self, user_id: i64) -> Result<Option<GlobalBan>, BanListError>;
}

/// Ban list published as a JSON array at a URL. Fetched on every lookup.
pub struct RemoteBanList {
    url: String,
    http: reqwest::Client,
}

impl RemoteBanList {
    pub fn new(url: String) -> Result<Self, BanListError> {
        Self::with_timeout(url, LOOKUP_TIMEOUT)
    }

    pub fn with_timeout(url: String, timeout: Duration) -> Result<Self, BanListError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, http })
    }
}

/// Search the raw list entries. Entries that do not decode are skipped so
/// one bad record cannot hide the rest of the list.
fn find_ban(entries: Vec<Value>, user_id: i64) -> Option<GlobalBan> {
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<RawBan>(entry) {
            Ok(ban) => Some(ban),
            Err(e) => {
                debug!("Skipping malformed ban entry: {e}");
                None
            }
        })
        .find(|e| e.user_id.matches(user_id))
        .map(|e| GlobalBan {
            user_id,
            reason: e.reason.unwrap_or_default(),
            proof: e.proof.unwrap_or_default(),
            ban_time: e.ban_time.and_then(|t| serde_json::from_value(t).ok()),
        })
}

#[async_trait]
impl BanList for RemoteBanList {
    async fn lookup(&self, user_id: i64) -> Result<Option<GlobalBan>, BanListError> {
        let response = self.http.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(BanListError::Status(response.status()));
        }
        let entries: Vec<Value> = response.json().await?;
        Ok(find_ban(entries, user_id))
    }
}

/// Admin and ban checks used by the dispatch pipeline.
pub struct AccessControl {
    admin_ids: HashSet<i64>,
    ban_list: Arc<dyn BanList>,
}

impl AccessControl {
    pub fn new(admin_ids: HashSet<i64>, ban_list: Arc<dyn BanList>) -> Self {
        Self { admin_ids, ban_list }
    }

    pub fn is_bot_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    /// `chat_admins` is the live admin list fetched for this chat.
    pub fn is_group_admin(&self, user_id: i64, chat_admins: &[i64]) -> bool {
        chat_admins.contains(&user_id)
    }

    /// Query the global ban list. Fails open: a fetch or decode error is
    /// logged and reported as "not banned".
    pub async fn check_global_ban(&self, user_id: i64) -> Option<GlobalBan> {
        match self.ban_list.lookup(user_id).await {
            Ok(ban) => ban,
            Err(e) => {
                warn!("Global ban list unavailable, allowing user {}: {e}", user_id);
                None
            }
        }
    }

    pub fn check_local_ban(&self, user: &UserRecord) -> bool {
        user.banned
    }

    pub fn check_group_ban(&self, thread: &ThreadRecord, user_id: i64) -> bool {
        thread.is_group_banned(user_id)
    }
}
