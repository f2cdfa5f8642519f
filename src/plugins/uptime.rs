//! `uptime`: group-admin command reporting how long the bot has run.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::bot::command::{Capabilities, Command, CommandContext, CommandDescriptor, Role};

pub struct Uptime {
    started: Instant,
}

impl Uptime {
    pub fn new() -> Self {
        Self { started: Instant::now() }
    }
}

impl Default for Uptime {
    fn default() -> Self {
        Self::new()
    }
}

fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (days, hours, mins, secs) = (secs / 86_400, secs / 3_600 % 24, secs / 60 % 60, secs % 60);
    if days > 0 {
        format!("{days}d {hours}h {mins}m {secs}s")
    } else {
        format!("{hours}h {mins}m {secs}s")
    }
}

#[async_trait]
impl Command for Uptime {
    fn descriptor(&self) -> CommandDescriptor {
        CommandDescriptor::new("uptime")
            .alias("up")
            .role(Role::GroupAdminOnly)
            .cooldown_secs(5)
            .description("Show how long the bot has been running.")
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { start: true, ..Default::default() }
    }

    async fn start(&self, ctx: CommandContext) -> anyhow::Result<()> {
        let text = format!("⏱️ {} has been up for {}", ctx.config.bot_name, format_uptime(self.started.elapsed()));
        ctx.reply(&text).await?;
        Ok(())
    }
}
