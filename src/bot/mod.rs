//! Bot core - registries, access control, and the message dispatch pipeline.

pub mod access;
pub mod command;
pub mod continuation;
pub mod cooldown;
pub mod database;
pub mod events;
pub mod message;
pub mod outbound;
pub mod pipeline;
pub mod registry;
pub mod telegram;

#[cfg(test)]
pub mod testing;

pub use access::{AccessControl, RemoteBanList};
pub use database::Database;
pub use events::{EventContext, EventRegistry, MemberUpdate, PlatformEvent};
pub use message::InboundMessage;
pub use pipeline::Pipeline;
pub use registry::CommandRegistry;
pub use telegram::TelegramClient;
