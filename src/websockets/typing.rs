use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// How long a typing entry stays active without a refresh
const TYPING_TTL: Duration = Duration::from_secs(5);

/// Tracks who is currently typing in which room
///
/// Entries expire lazily when the room is read, so a client that
/// disconnects mid-keystroke simply ages out without any background task.
pub struct TypingTracker {
    // room_id -> user_id -> when they last signalled typing
    rooms: Mutex<HashMap<String, HashMap<String, Instant>>>,
    ttl: Duration,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::with_ttl(TYPING_TTL)
    }

    /// Tracker with a custom expiry, for tests
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Records that a user started (or is still) typing
    pub fn started(&self, room_id: &str, user_id: &str) {
        let mut rooms = self.rooms.lock().unwrap();
        rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string(), Instant::now());
        debug!(room_id = %room_id, user_id = %user_id, "Typing started");
    }

    /// Clears a user's typing entry
    pub fn stopped(&self, room_id: &str, user_id: &str) {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(users) = rooms.get_mut(room_id) {
            users.remove(user_id);
            if users.is_empty() {
                rooms.remove(room_id);
            }
        }
    }

    /// Users whose typing entry has not expired, pruning stale ones
    pub fn active_typists(&self, room_id: &str) -> Vec<String> {
        let mut rooms = self.rooms.lock().unwrap();
        let users = match rooms.get_mut(room_id) {
            Some(users) => users,
            None => return Vec::new(),
        };

        users.retain(|_, started_at| started_at.elapsed() < self.ttl);

        let mut active: Vec<String> = users.keys().cloned().collect();
        if active.is_empty() {
            rooms.remove(room_id);
        }
        active.sort();
        active
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_and_stopped() {
        let tracker = TypingTracker::new();

        tracker.started("sweet-lark", "u1");
        tracker.started("sweet-lark", "u2");
        tracker.started("quiet-lake", "u3");

        assert_eq!(tracker.active_typists("sweet-lark"), vec!["u1", "u2"]);
        assert_eq!(tracker.active_typists("quiet-lake"), vec!["u3"]);

        tracker.stopped("sweet-lark", "u1");
        assert_eq!(tracker.active_typists("sweet-lark"), vec!["u2"]);

        tracker.stopped("sweet-lark", "u2");
        assert!(tracker.active_typists("sweet-lark").is_empty());
    }

    #[test]
    fn test_stopped_for_unknown_room_is_noop() {
        let tracker = TypingTracker::new();
        tracker.stopped("nowhere", "u1");
        assert!(tracker.active_typists("nowhere").is_empty());
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let tracker = TypingTracker::with_ttl(Duration::from_millis(30));

        tracker.started("sweet-lark", "u1");
        assert_eq!(tracker.active_typists("sweet-lark"), vec!["u1"]);

        std::thread::sleep(Duration::from_millis(50));
        assert!(tracker.active_typists("sweet-lark").is_empty());
    }

    #[test]
    fn test_restarting_refreshes_the_entry() {
        let tracker = TypingTracker::with_ttl(Duration::from_millis(200));

        tracker.started("sweet-lark", "u1");
        std::thread::sleep(Duration::from_millis(120));
        tracker.started("sweet-lark", "u1");
        std::thread::sleep(Duration::from_millis(120));

        // 240ms since the first signal, 120ms since the refresh
        assert_eq!(tracker.active_typists("sweet-lark"), vec!["u1"]);
    }
}
