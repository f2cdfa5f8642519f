//! Platform event plugins: non-command handlers bound to event names.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bot::message::InboundMessage;
use crate::bot::outbound::Outbound;
use crate::config::Config;

pub const MESSAGE_EDITED: &str = "message_edited";
pub const CHAT_MEMBER: &str = "chat_member";

const KNOWN_EVENTS: &[&str] = &[MESSAGE_EDITED, CHAT_MEMBER];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("a handler for '{0}' is already registered")]
    DuplicateEvent(String),
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
}

/// A membership change in a chat.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberUpdate {
    pub chat_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub old_status: String,
    pub new_status: String,
}

#[derive(Debug, Clone)]
pub enum PlatformEvent {
    MessageEdited(InboundMessage),
    ChatMember(MemberUpdate),
}

impl PlatformEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PlatformEvent::MessageEdited(_) => MESSAGE_EDITED,
            PlatformEvent::ChatMember(_) => CHAT_MEMBER,
        }
    }
}

#[derive(Clone)]
pub struct EventContext {
    pub outbound: Arc<dyn Outbound>,
    pub config: Arc<Config>,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Event name this handler binds to.
    fn event(&self) -> &'static str;

    async fn on_event(&self, event: PlatformEvent, ctx: EventContext) -> anyhow::Result<()>;
}

/// Event name → handler. A name has at most one handler; a second
/// registration is rejected and the first one stays.
#[derive(Default)]
pub struct EventRegistry {
    handlers: HashMap<&'static str, Arc<dyn EventHandler>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(candidates: Vec<Arc<dyn EventHandler>>) -> Self {
        let mut registry = Self::new();
        for candidate in candidates {
            if let Err(e) = registry.register(candidate) {
                warn!("Skipping event plugin: {e}");
            }
        }
        info!("Loaded {} event handlers", registry.handlers.len());
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn EventHandler>) -> Result<(), EventError> {
        let name = handler.event();
        if !KNOWN_EVENTS.contains(&name) {
            return Err(EventError::UnknownEvent(name.to_string()));
        }
        if self.handlers.contains_key(name) {
            return Err(EventError::DuplicateEvent(name.to_string()));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Run the handler bound to this event on its own task. Errors and
    /// panics are logged; nothing propagates to the caller.
    pub fn dispatch(&self, event: PlatformEvent, ctx: EventContext) -> Option<JoinHandle<()>> {
        let name = event.name();
        let Some(handler) = self.handlers.get(name).cloned() else {
            debug!("No handler for event {}", name);
            return None;
        };

        let task = tokio::spawn(async move { handler.on_event(event, ctx).await });
        Some(tokio::spawn(async move {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Event handler for {} failed: {e:#}", name),
                Err(e) => error!("Event handler for {} panicked: {e}", name),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::message::Sender;
    use crate::bot::testing::RecordingOutbound;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        event: &'static str,
        hits: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for Counting {
        fn event(&self) -> &'static str {
            self.event
        }

        async fn on_event(&self, _event: PlatformEvent, _ctx: EventContext) -> anyhow::Result<()> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    fn counting(event: &'static str, hits: &Arc<AtomicUsize>, fail: bool) -> Arc<dyn EventHandler> {
        Arc::new(Counting { event, hits: hits.clone(), fail })
    }

    fn ctx() -> EventContext {
        EventContext {
            outbound: Arc::new(RecordingOutbound::new()),
            config: Arc::new(Config::for_tests()),
        }
    }

    fn edited() -> PlatformEvent {
        PlatformEvent::MessageEdited(InboundMessage {
            message_id: 1,
            chat_id: -1,
            sender: Sender { id: 1, username: None, first_name: "A".to_string(), last_name: None },
            text: "edited".to_string(),
            reply_to_message_id: None,
        })
    }

    #[test]
    fn test_duplicate_event_rejected_first_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut reg = EventRegistry::new();
        reg.register(counting(MESSAGE_EDITED, &first, false)).unwrap();
        assert_eq!(
            reg.register(counting(MESSAGE_EDITED, &second, false)).unwrap_err(),
            EventError::DuplicateEvent(MESSAGE_EDITED.to_string())
        );
    }

    #[test]
    fn test_unknown_event_rejected() {
        let hits = Arc::new(AtomicUsize::new(0));
        let reg = EventRegistry::load(vec![counting("nonsense", &hits, false)]);
        assert!(reg.handlers.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_invokes_bound_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let reg = EventRegistry::load(vec![counting(MESSAGE_EDITED, &hits, false)]);
        reg.dispatch(edited(), ctx()).unwrap().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_handler_is_contained() {
        let hits = Arc::new(AtomicUsize::new(0));
        let reg = EventRegistry::load(vec![counting(MESSAGE_EDITED, &hits, true)]);
        assert!(reg.dispatch(edited(), ctx()).unwrap().await.is_ok());
        // Still delivers the next event.
        assert!(reg.dispatch(edited(), ctx()).unwrap().await.is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unbound_event_ignored() {
        let reg = EventRegistry::new();
        assert!(reg.dispatch(edited(), ctx()).is_none());
    }
}
