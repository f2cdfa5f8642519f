//! Reply continuations: a command's claim on future replies to a message
//! the bot sent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

/// Pending continuation for one sent message.
#[derive(Debug, Clone, PartialEq)]
pub struct Continuation {
    pub command_name: String,
    /// Command-defined payload.
    pub context: Value,
}

impl Continuation {
    pub fn new(command_name: &str, context: Value) -> Self {
        Self { command_name: command_name.to_lowercase(), context }
    }
}

/// Sent message id → continuation. Process-local; entries live until a
/// handler clears them or the process exits.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct ReplyStore {
    entries: Arc<Mutex<HashMap<i64, Continuation>>>,
}

impl ReplyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, sent_message_id: i64, continuation: Continuation) {
        debug!("Tracking replies to msg {} for {}", sent_message_id, continuation.command_name);
        self.lock().insert(sent_message_id, continuation);
    }

    /// Look up the continuation for a replied-to message.
    ///
    /// The entry stays in place so a flow can span several replies; the
    /// handler calls [`ReplyStore::clear`] when it is done.
    pub fn take(&self, replied_to_message_id: i64) -> Option<Continuation> {
        self.lock().get(&replied_to_message_id).cloned()
    }

    pub fn clear(&self, sent_message_id: i64) -> Option<Continuation> {
        self.lock().remove(&sent_message_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Continuation>> {
        // A panic while holding this lock cannot leave the map half-written.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_take_unknown_is_none() {
        let store = ReplyStore::new();
        assert!(store.take(42).is_none());
    }

    #[test]
    fn test_take_leaves_entry_in_place() {
        let store = ReplyStore::new();
        store.put(42, Continuation::new("pic", json!({"query": "cat"})));

        let first = store.take(42).unwrap();
        let second = store.take(42).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.context["query"], "cat");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear_removes_entry() {
        let store = ReplyStore::new();
        store.put(42, Continuation::new("pic", Value::Null));
        assert!(store.clear(42).is_some());
        assert!(store.take(42).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let store = ReplyStore::new();
        let handle = store.clone();
        handle.put(7, Continuation::new("PIC", Value::Null));
        assert_eq!(store.take(7).unwrap().command_name, "pic");
    }
}
