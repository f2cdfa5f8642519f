//! Command plugin contract: descriptor, declared entry points, and the
//! context bundles handed to each entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use serde_json::Value;

use crate::bot::continuation::{Continuation, ReplyStore};
use crate::bot::database::{RecordStore, ThreadRecord, UserRecord};
use crate::bot::message::InboundMessage;
use crate::bot::outbound::{Outbound, OutboundError};
use crate::config::Config;

/// Who may invoke a command, on top of the bot-admin flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Anyone,
    GroupAdminOnly,
}

/// Static metadata for a command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    pub name: String,
    pub aliases: Vec<String>,
    pub only_admin: bool,
    pub role: Role,
    /// `None` falls back to the configured default.
    pub cooldown: Option<Duration>,
    pub description: String,
    pub usage: String,
}

impl CommandDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            only_admin: false,
            role: Role::Anyone,
            cooldown: None,
            description: String::new(),
            usage: String::new(),
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn only_admin(mut self) -> Self {
        self.only_admin = true;
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown = Some(Duration::from_secs(secs));
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn usage(mut self, usage: &str) -> Self {
        self.usage = usage.to_string();
        self
    }
}

/// Entry points a command implements. Dispatch only calls what is declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub start: bool,
    /// Legacy entry point, used when `start` is absent.
    pub run: bool,
    pub on_chat: bool,
    pub on_reply: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    Start,
    Run,
}

impl Capabilities {
    pub fn entry_point(&self) -> Option<EntryPoint> {
        if self.start {
            Some(EntryPoint::Start)
        } else if self.run {
            Some(EntryPoint::Run)
        } else {
            None
        }
    }
}

/// Everything a command's `start`/`run` needs.
///
/// `thread` and `user` are the records loaded for this message. A handler
/// that mutates them must save them itself through `store`.
#[derive(Clone)]
pub struct CommandContext {
    pub command: String,
    pub message: InboundMessage,
    pub args: Vec<String>,
    pub chat_id: i64,
    pub user_id: i64,
    pub sender_name: String,
    pub username: Option<String>,
    pub outbound: Arc<dyn Outbound>,
    pub config: Arc<Config>,
    pub store: Arc<dyn RecordStore>,
    pub replies: ReplyStore,
    pub thread: ThreadRecord,
    pub user: UserRecord,
}

impl CommandContext {
    /// Send text to the chat the command was invoked in.
    pub async fn reply(&self, text: &str) -> Result<i64, OutboundError> {
        self.outbound.reply(self.chat_id, text, None).await
    }

    /// Route future replies to `sent_message_id` back to this command's `on_reply`.
    pub fn expect_reply(&self, sent_message_id: i64, context: Value) {
        self.replies.put(sent_message_id, Continuation::new(&self.command, context));
    }
}

/// Context for passive per-message hooks.
#[derive(Clone)]
pub struct ChatContext {
    pub message: InboundMessage,
    /// Message text split on single spaces.
    pub args: Vec<String>,
    pub outbound: Arc<dyn Outbound>,
    pub config: Arc<Config>,
}

/// Context for a resolved reply continuation.
#[derive(Clone)]
pub struct ReplyContext {
    pub message: InboundMessage,
    /// Id of the bot message that was replied to.
    pub replied_to: i64,
    pub continuation: Continuation,
    pub outbound: Arc<dyn Outbound>,
    pub config: Arc<Config>,
    pub replies: ReplyStore,
}

impl ReplyContext {
    pub async fn reply(&self, text: &str) -> Result<i64, OutboundError> {
        self.outbound.reply(self.message.chat_id, text, None).await
    }

    /// Stop routing replies to the message that started this continuation.
    pub fn finish(&self) {
        self.replies.clear(self.replied_to);
    }
}

/// A command plugin.
///
/// Implementors override the entry points they declare in
/// [`Command::capabilities`]; the defaults for undeclared ones are never
/// called by the pipeline.
#[async_trait]
pub trait Command: Send + Sync {
    fn descriptor(&self) -> CommandDescriptor;

    fn capabilities(&self) -> Capabilities;

    async fn start(&self, _ctx: CommandContext) -> anyhow::Result<()> {
        bail!("{} does not implement start", self.descriptor().name)
    }

    async fn run(&self, _ctx: CommandContext) -> anyhow::Result<()> {
        bail!("{} does not implement run", self.descriptor().name)
    }

    async fn on_chat(&self, _ctx: ChatContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_reply(&self, _ctx: ReplyContext) -> anyhow::Result<()> {
        bail!("{} does not implement on_reply", self.descriptor().name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_preferred_over_run() {
        let caps = Capabilities { start: true, run: true, ..Default::default() };
        assert_eq!(caps.entry_point(), Some(EntryPoint::Start));
    }

    #[test]
    fn test_run_is_fallback() {
        let caps = Capabilities { run: true, ..Default::default() };
        assert_eq!(caps.entry_point(), Some(EntryPoint::Run));
    }

    #[test]
    fn test_no_entry_point() {
        let caps = Capabilities { on_chat: true, on_reply: true, ..Default::default() };
        assert_eq!(caps.entry_point(), None);
    }

    #[test]
    fn test_descriptor_builder() {
        let d = CommandDescriptor::new("pic")
            .alias("pin")
            .role(Role::GroupAdminOnly)
            .cooldown_secs(20);
        assert_eq!(d.aliases, vec!["pin".to_string()]);
        assert_eq!(d.role, Role::GroupAdminOnly);
        assert_eq!(d.cooldown, Some(Duration::from_secs(20)));
        assert!(!d.only_admin);
    }
}
