//! Built-in command and event plugins.

pub mod member_log;
pub mod pic;
pub mod uptime;

use std::sync::Arc;

use crate::bot::command::Command;
use crate::bot::events::EventHandler;

/// Command candidates offered to the registry at startup, in load order.
pub fn commands() -> anyhow::Result<Vec<Arc<dyn Command>>> {
    let commands: Vec<Arc<dyn Command>> = vec![Arc::new(pic::Pic::new()?), Arc::new(uptime::Uptime::new())];
    Ok(commands)
}

/// Event candidates offered to the event registry at startup.
pub fn events() -> Vec<Arc<dyn EventHandler>> {
    vec![Arc::new(member_log::EditLog), Arc::new(member_log::MemberLog)]
}
