//! Event plugins that only log: edited messages and membership changes.

use async_trait::async_trait;
use tracing::info;

use crate::bot::events::{CHAT_MEMBER, EventContext, EventHandler, MESSAGE_EDITED, PlatformEvent};

pub struct EditLog;

#[async_trait]
impl EventHandler for EditLog {
    fn event(&self) -> &'static str {
        MESSAGE_EDITED
    }

    async fn on_event(&self, event: PlatformEvent, _ctx: EventContext) -> anyhow::Result<()> {
        if let PlatformEvent::MessageEdited(msg) = event {
            let preview: String = msg.text.chars().take(100).collect();
            info!("✏️ {} edited msg {} in {}: \"{}\"", msg.sender.mention(), msg.message_id, msg.chat_id, preview);
        }
        Ok(())
    }
}

pub struct MemberLog;

#[async_trait]
impl EventHandler for MemberLog {
    fn event(&self) -> &'static str {
        CHAT_MEMBER
    }

    async fn on_event(&self, event: PlatformEvent, _ctx: EventContext) -> anyhow::Result<()> {
        if let PlatformEvent::ChatMember(update) = event {
            let who = update.username.as_deref().unwrap_or(&update.first_name);
            match update.new_status.as_str() {
                "member" | "administrator" | "owner" if matches!(update.old_status.as_str(), "left" | "banned") => {
                    info!("👋 Member joined {}: {} ({})", update.chat_id, who, update.user_id);
                }
                "left" => info!("👋 Member left {}: {} ({})", update.chat_id, who, update.user_id),
                "banned" => info!("🚫 Member banned in {}: {} ({})", update.chat_id, who, update.user_id),
                _ => {}
            }
        }
        Ok(())
    }
}
