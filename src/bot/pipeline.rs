//! Dispatch pipeline: the ordered checks and routing applied to every
//! inbound message before a command handler runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::bot::access::{AccessControl, GlobalBan};
use crate::bot::command::{ChatContext, CommandContext, EntryPoint, ReplyContext, Role};
use crate::bot::continuation::ReplyStore;
use crate::bot::cooldown::{CooldownOutcome, CooldownTracker, format_retry_after};
use crate::bot::database::RecordStore;
use crate::bot::message::InboundMessage;
use crate::bot::outbound::{MediaSource, Outbound};
use crate::bot::registry::{CommandRegistry, RegisteredCommand};
use crate::config::Config;

pub const LOCAL_BAN_NOTICE: &str = "🚫 You are banned from this bot.";
pub const GROUP_BAN_NOTICE: &str = "🚫 You are banned in this group.";
pub const INVALID_COMMAND: &str = "❌ Invalid command";
pub const BOT_ADMIN_ONLY: &str = "❌ Only bot admins can use this.";
pub const GROUP_ADMIN_ONLY: &str = "❌ Only group admins can use this.";
pub const NO_ENTRY_POINT: &str = "❌ No start() or run() entry point found.";
pub const COMMAND_FAILED: &str = "❌ Error while executing command.";

/// Where the pipeline stopped for a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Thread or user records could not be loaded.
    StorageFailed,
    GloballyBanned,
    LocallyBanned,
    GroupBanned,
    /// A reply continuation handled the message.
    Continued { command: String },
    NotACommand,
    UnknownCommand,
    BotAdminOnly { command: String },
    GroupAdminOnly { command: String },
    CoolingDown { command: String, retry_after: Duration },
    NoEntryPoint { command: String },
    Completed { command: String },
    Failed { command: String },
}

/// Owns all dispatch state: registries, stores, and collaborators.
pub struct Pipeline {
    config: Arc<Config>,
    commands: CommandRegistry,
    replies: ReplyStore,
    cooldowns: CooldownTracker,
    access: AccessControl,
    store: Arc<dyn RecordStore>,
    outbound: Arc<dyn Outbound>,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        commands: CommandRegistry,
        access: AccessControl,
        store: Arc<dyn RecordStore>,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        Self {
            config,
            commands,
            replies: ReplyStore::new(),
            cooldowns: CooldownTracker::new(),
            access,
            store,
            outbound,
        }
    }

    pub fn replies(&self) -> &ReplyStore {
        &self.replies
    }

    /// Handle a message on its own task so delivery of the next one is not
    /// held up.
    pub fn spawn(self: &Arc<Self>, msg: InboundMessage) -> JoinHandle<Outcome> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.handle(msg).await })
    }

    pub async fn handle(&self, msg: InboundMessage) -> Outcome {
        let chat_id = msg.chat_id;
        let user_id = msg.sender.id;
        let text_preview: String = msg.text.chars().take(100).collect();
        info!("📨 {} ({}) in {}: \"{}\"", msg.sender.mention(), user_id, chat_id, text_preview);

        // Records are upserted on every message.
        let records = self
            .store
            .load_or_create_thread(chat_id)
            .and_then(|thread| Ok((thread, self.store.load_or_create_user(&msg.sender)?)));
        let (thread, user) = match records {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to load records for {} in {}: {e}", user_id, chat_id);
                return Outcome::StorageFailed;
            }
        };

        if let Some(ban) = self.access.check_global_ban(user_id).await {
            info!("🚫 {} is globally banned", user_id);
            self.send_global_ban_notice(&msg, &ban).await;
            return Outcome::GloballyBanned;
        }

        if self.access.check_local_ban(&user) {
            info!("🚫 {} is banned from the bot", user_id);
            self.notify(chat_id, LOCAL_BAN_NOTICE).await;
            return Outcome::LocallyBanned;
        }

        if self.access.check_group_ban(&thread, user_id) {
            info!("🚫 {} is banned in {}", user_id, chat_id);
            self.notify(chat_id, GROUP_BAN_NOTICE).await;
            return Outcome::GroupBanned;
        }

        if let Some(outcome) = self.try_continuation(&msg).await {
            return outcome;
        }

        self.run_chat_hooks(&msg);

        let Some(rest) = msg.text.strip_prefix(self.config.prefix.as_str()) else {
            return Outcome::NotACommand;
        };
        let mut tokens = rest.split_whitespace();
        let token = tokens.next().unwrap_or_default().to_lowercase();
        let args: Vec<String> = tokens.map(String::from).collect();

        let Some(command) = self.commands.resolve(&token) else {
            info!("Unknown command '{}' from {}", token, user_id);
            self.notify(chat_id, INVALID_COMMAND).await;
            return Outcome::UnknownCommand;
        };
        let name = command.name().to_string();

        if command.descriptor.only_admin && !self.access.is_bot_admin(user_id) {
            info!("Denied {} to {}: bot admins only", name, user_id);
            self.notify(chat_id, BOT_ADMIN_ONLY).await;
            return Outcome::BotAdminOnly { command: name };
        }

        if command.descriptor.role == Role::GroupAdminOnly {
            let admins = match self.outbound.chat_admins(chat_id).await {
                Ok(admins) => admins,
                Err(e) => {
                    warn!("Could not fetch admins of {}: {e}", chat_id);
                    Vec::new()
                }
            };
            if !self.access.is_group_admin(user_id, &admins) {
                info!("Denied {} to {}: group admins only", name, user_id);
                self.notify(chat_id, GROUP_ADMIN_ONLY).await;
                return Outcome::GroupAdminOnly { command: name };
            }
        }

        if let CooldownOutcome::Denied { retry_after } =
            self.cooldowns.try_acquire(&name, user_id, command.cooldown)
        {
            let notice = format!("⏳ Wait {}s before using {} again.", format_retry_after(retry_after), name);
            self.notify(chat_id, &notice).await;
            return Outcome::CoolingDown { command: name, retry_after };
        }

        let ctx = CommandContext {
            command: name.clone(),
            args,
            chat_id,
            user_id,
            sender_name: msg.sender.display_name(),
            username: msg.sender.username.clone(),
            message: msg,
            outbound: self.outbound.clone(),
            config: self.config.clone(),
            store: self.store.clone(),
            replies: self.replies.clone(),
            thread,
            user,
        };
        self.invoke(&command, ctx).await
    }

    /// Route a reply to a tracked bot message to the owning command.
    /// Returns `None` to continue with normal processing.
    async fn try_continuation(&self, msg: &InboundMessage) -> Option<Outcome> {
        let replied_to = msg.reply_to_message_id?;
        let continuation = self.replies.take(replied_to)?;

        let Some(command) = self.commands.resolve(&continuation.command_name) else {
            warn!("Continuation for msg {} names unknown command {}", replied_to, continuation.command_name);
            return None;
        };
        if !command.capabilities.on_reply {
            debug!("{} has no on_reply, ignoring continuation", command.name());
            return None;
        }

        let name = command.name().to_string();
        info!("↩️ Reply to msg {} continues {}", replied_to, name);

        let ctx = ReplyContext {
            message: msg.clone(),
            replied_to,
            continuation,
            outbound: self.outbound.clone(),
            config: self.config.clone(),
            replies: self.replies.clone(),
        };
        let handler = command.handler.clone();
        let task = tokio::spawn(async move { handler.on_reply(ctx).await });
        if !self.contain(&name, msg.chat_id, task.await).await {
            return Some(Outcome::Failed { command: name });
        }
        Some(Outcome::Continued { command: name })
    }

    /// Fan out `on_chat` hooks. Each hook runs on its own task; a supervisor
    /// task logs failures so one bad hook never affects the others.
    fn run_chat_hooks(&self, msg: &InboundMessage) {
        let args: Vec<String> = msg.text.split(' ').map(String::from).collect();
        let mut hooks = JoinSet::new();

        for command in self.commands.all_commands().filter(|c| c.capabilities.on_chat) {
            let ctx = ChatContext {
                message: msg.clone(),
                args: args.clone(),
                outbound: self.outbound.clone(),
                config: self.config.clone(),
            };
            let handler = command.handler.clone();
            let name = command.name().to_string();
            hooks.spawn(async move { (name, handler.on_chat(ctx).await) });
        }

        if hooks.is_empty() {
            return;
        }
        tokio::spawn(async move {
            while let Some(joined) = hooks.join_next().await {
                match joined {
                    Ok((_, Ok(()))) => {}
                    Ok((name, Err(e))) => warn!("on_chat hook of {} failed: {e:#}", name),
                    Err(e) => error!("on_chat hook panicked: {e}"),
                }
            }
        });
    }

    async fn invoke(&self, command: &RegisteredCommand, ctx: CommandContext) -> Outcome {
        let name = command.name().to_string();
        let chat_id = ctx.chat_id;

        let Some(entry) = command.capabilities.entry_point() else {
            error!("Command {} declares no start or run entry point", name);
            self.notify(chat_id, NO_ENTRY_POINT).await;
            return Outcome::NoEntryPoint { command: name };
        };

        info!("▶️ Running {} for {} ({:?})", name, ctx.user_id, entry);
        let handler = command.handler.clone();
        let task = tokio::spawn(async move {
            match entry {
                EntryPoint::Start => handler.start(ctx).await,
                EntryPoint::Run => handler.run(ctx).await,
            }
        });

        if self.contain(&name, chat_id, task.await).await {
            Outcome::Completed { command: name }
        } else {
            Outcome::Failed { command: name }
        }
    }

    /// Turn a handler's error or panic into one user-visible message.
    /// Returns whether the handler succeeded.
    async fn contain(
        &self,
        name: &str,
        chat_id: i64,
        joined: Result<anyhow::Result<()>, tokio::task::JoinError>,
    ) -> bool {
        match joined {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => error!("Command {} failed: {e:#}", name),
            Err(e) => error!("Command {} panicked: {e}", name),
        }
        self.notify(chat_id, COMMAND_FAILED).await;
        false
    }

    async fn send_global_ban_notice(&self, msg: &InboundMessage, ban: &GlobalBan) {
        let caption = ban.notice(msg.sender.mention());
        let sent = if ban.proof.is_empty() {
            self.outbound.reply(msg.chat_id, &caption, None).await
        } else {
            self.outbound
                .send_photo(msg.chat_id, MediaSource::Url(ban.proof.clone()), Some(&caption), None)
                .await
        };
        if let Err(e) = sent {
            warn!("Failed to send ban notice: {e}");
        }
    }

    async fn notify(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.outbound.reply(chat_id, text, None).await {
            warn!("Failed to send notice to {}: {e}", chat_id);
        }
    }
}
