//! Inbound message model, decoupled from teloxide types.

use serde::{Deserialize, Serialize};
use teloxide::types::Message;

/// The user who sent a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl Sender {
    /// "First Last", or just the first name.
    pub fn display_name(&self) -> String {
        match self.last_name.as_deref() {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }

    /// Handle used in public notices: the username, falling back to the first name.
    pub fn mention(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.first_name)
    }
}

/// A text message delivered by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message_id: i64,
    pub chat_id: i64,
    pub sender: Sender,
    pub text: String,
    /// Id of the message this one replies to, if any.
    pub reply_to_message_id: Option<i64>,
}

impl InboundMessage {
    /// Convert a teloxide message. Returns `None` for messages without a
    /// sender or without text.
    pub fn from_telegram(msg: &Message) -> Option<Self> {
        let user = msg.from.as_ref()?;
        let text = msg.text()?;

        Some(Self {
            message_id: msg.id.0 as i64,
            chat_id: msg.chat.id.0,
            sender: Sender {
                id: user.id.0 as i64,
                username: user.username.clone(),
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
            },
            text: text.to_string(),
            reply_to_message_id: msg.reply_to_message().map(|reply| reply.id.0 as i64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(last_name: Option<&str>, username: Option<&str>) -> Sender {
        Sender {
            id: 1,
            username: username.map(String::from),
            first_name: "Ada".to_string(),
            last_name: last_name.map(String::from),
        }
    }

    #[test]
    fn test_display_name_with_last_name() {
        assert_eq!(sender(Some("Lovelace"), None).display_name(), "Ada Lovelace");
    }

    #[test]
    fn test_display_name_without_last_name() {
        assert_eq!(sender(None, None).display_name(), "Ada");
        assert_eq!(sender(Some(""), None).display_name(), "Ada");
    }

    #[test]
    fn test_mention_prefers_username() {
        assert_eq!(sender(None, Some("ada")).mention(), "ada");
        assert_eq!(sender(None, None).mention(), "Ada");
    }
}
