mod bot;
mod config;
mod liveness;
mod plugins;

use std::sync::Arc;

use anyhow::Context;
use teloxide::prelude::*;
use teloxide::types::{ChatMemberStatus, ChatMemberUpdated};
use tracing::info;
use tracing_subscriber::prelude::*;

use bot::outbound::Outbound;
use bot::{
    AccessControl, CommandRegistry, Database, EventContext, EventRegistry, InboundMessage, MemberUpdate, Pipeline,
    PlatformEvent, RemoteBanList, TelegramClient,
};
use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "cmdgate.json".to_string());
    let config = Config::load(&config_path)?;

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("cmdgate.log"))
        .with_context(|| format!("failed to open log file in {}", log_dir.display()))?;
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting {}...", config.bot_name);
    info!("Loaded config from {config_path}");
    info!("Prefix: {:?}, bot admins: {:?}", config.prefix, config.admin_ids);

    // No database, no bot.
    let database = Database::open(&config.database_path)
        .with_context(|| format!("failed to open database {}", config.database_path.display()))?;

    let bot = Bot::new(&config.telegram_bot_token);
    let outbound: Arc<dyn Outbound> = Arc::new(TelegramClient::new(bot.clone()));
    let config = Arc::new(config);

    let commands = CommandRegistry::load(
        plugins::commands()?,
        config.default_cooldown,
        config.cooldown_overrides.clone(),
    );
    let events = Arc::new(EventRegistry::load(plugins::events()));
    let access = AccessControl::new(
        config.admin_ids.clone(),
        Arc::new(RemoteBanList::new(config.gban_url.clone()).context("failed to build ban list client")?),
    );
    let pipeline = Arc::new(Pipeline::new(
        config.clone(),
        commands,
        access,
        Arc::new(database),
        outbound.clone(),
    ));
    let event_ctx = EventContext { outbound, config: config.clone() };

    tokio::spawn(liveness::run_liveness_server(config.port));

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_new_message))
        .branch(Update::filter_edited_message().endpoint(handle_edited_message))
        .branch(Update::filter_chat_member().endpoint(handle_chat_member));

    info!("🤖 Bot started");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![pipeline, events, event_ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_new_message(msg: Message, pipeline: Arc<Pipeline>) -> ResponseResult<()> {
    if let Some(inbound) = InboundMessage::from_telegram(&msg) {
        // Detached: dispatch runs to completion on its own.
        pipeline.spawn(inbound);
    }
    Ok(())
}

async fn handle_edited_message(
    msg: Message,
    events: Arc<EventRegistry>,
    ctx: EventContext,
) -> ResponseResult<()> {
    if let Some(edited) = InboundMessage::from_telegram(&msg) {
        events.dispatch(PlatformEvent::MessageEdited(edited), ctx);
    }
    Ok(())
}

fn status_name(status: ChatMemberStatus) -> &'static str {
    match status {
        ChatMemberStatus::Owner => "owner",
        ChatMemberStatus::Administrator => "administrator",
        ChatMemberStatus::Member => "member",
        ChatMemberStatus::Restricted => "restricted",
        ChatMemberStatus::Left => "left",
        ChatMemberStatus::Banned => "banned",
    }
}

async fn handle_chat_member(
    update: ChatMemberUpdated,
    events: Arc<EventRegistry>,
    ctx: EventContext,
) -> ResponseResult<()> {
    let user = &update.new_chat_member.user;
    let member = MemberUpdate {
        chat_id: update.chat.id.0,
        user_id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        old_status: status_name(update.old_chat_member.status()).to_string(),
        new_status: status_name(update.new_chat_member.status()).to_string(),
    };
    events.dispatch(PlatformEvent::ChatMember(member), ctx);
    Ok(())
}
