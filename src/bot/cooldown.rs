//! Per-command, per-user rate limiting with self-expiring entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{sleep, Instant};

type Key = (String, i64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CooldownOutcome {
    Allowed,
    Denied { retry_after: Duration },
}

/// (command, user) → time of last allowed use.
///
/// Every recorded use schedules its own removal once the window has passed,
/// so the map only holds users inside an active window.
#[derive(Debug, Clone, Default)]
pub struct CooldownTracker {
    last_use: Arc<Mutex<HashMap<Key, Instant>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a use of `command` by `user_id` unless it is still inside the
    /// previous use's window. Must be called within a tokio runtime.
    pub fn try_acquire(&self, command: &str, user_id: i64, cooldown: Duration) -> CooldownOutcome {
        let key = (command.to_lowercase(), user_id);
        let now = Instant::now();

        {
            let mut last_use = self.lock();
            if let Some(&used_at) = last_use.get(&key) {
                let expires_at = used_at + cooldown;
                if now < expires_at {
                    return CooldownOutcome::Denied { retry_after: expires_at - now };
                }
            }
            if cooldown.is_zero() {
                return CooldownOutcome::Allowed;
            }
            last_use.insert(key.clone(), now);
        }

        let tracker = self.clone();
        tokio::spawn(async move {
            sleep(cooldown).await;
            let mut last_use = tracker.lock();
            // A later use may have replaced the entry; only drop our own.
            if last_use.get(&key) == Some(&now) {
                last_use.remove(&key);
            }
        });

        CooldownOutcome::Allowed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Key, Instant>> {
        self.last_use.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Seconds rounded to one decimal, as shown to users.
pub fn format_retry_after(retry_after: Duration) -> String {
    format!("{:.1}", retry_after.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(3);

    #[tokio::test(start_paused = true)]
    async fn test_second_use_within_window_denied() {
        let tracker = CooldownTracker::new();
        assert_eq!(tracker.try_acquire("pic", 1, WINDOW), CooldownOutcome::Allowed);

        tokio::time::advance(Duration::from_secs(1)).await;
        match tracker.try_acquire("pic", 1, WINDOW) {
            CooldownOutcome::Denied { retry_after } => {
                assert!(retry_after > Duration::ZERO);
                assert!(retry_after <= Duration::from_secs(2));
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_window() {
        let tracker = CooldownTracker::new();
        tracker.try_acquire("pic", 1, WINDOW);
        assert_eq!(tracker.len(), 1);

        sleep(WINDOW + Duration::from_millis(10)).await;
        assert_eq!(tracker.len(), 0);
        assert_eq!(tracker.try_acquire("pic", 1, WINDOW), CooldownOutcome::Allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_have_independent_windows() {
        let tracker = CooldownTracker::new();
        tracker.try_acquire("pic", 1, WINDOW);
        assert_eq!(tracker.try_acquire("uptime", 1, WINDOW), CooldownOutcome::Allowed);
        assert_eq!(tracker.try_acquire("pic", 2, WINDOW), CooldownOutcome::Allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_name_case_insensitive() {
        let tracker = CooldownTracker::new();
        tracker.try_acquire("PIC", 1, WINDOW);
        assert!(matches!(tracker.try_acquire("pic", 1, WINDOW), CooldownOutcome::Denied { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_cooldown_never_records() {
        let tracker = CooldownTracker::new();
        assert_eq!(tracker.try_acquire("pic", 1, Duration::ZERO), CooldownOutcome::Allowed);
        assert_eq!(tracker.try_acquire("pic", 1, Duration::ZERO), CooldownOutcome::Allowed);
        assert_eq!(tracker.len(), 0);
    }

    #[test]
    fn test_format_retry_after() {
        assert_eq!(format_retry_after(Duration::from_millis(2_340)), "2.3");
        assert_eq!(format_retry_after(Duration::from_millis(1_960)), "2.0");
    }
}
