//! Room presence: how many people are listening.

use std::collections::HashMap;
use std::sync::Mutex;

/// Source of listener counts for rooms.
pub trait RoomPresence: Send + Sync {
    /// Non-automated listeners in `room_id`, `None` when unknown.
    fn listeners(&self, room_id: &str) -> Option<usize>;

    /// Drop whatever is known about a room that went away.
    fn forget(&self, _room_id: &str) {}
}

/// Counts pushed by the gateway through the command API.
#[derive(Default)]
pub struct ReportedPresence {
    counts: Mutex<HashMap<String, usize>>,
}

impl ReportedPresence {
    pub fn report(&self, room_id: &str, count: usize) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.insert(room_id.to_string(), count);
        tracing::debug!(room_id = %room_id, count, "presence reported");
    }
}

impl RoomPresence for ReportedPresence {
    fn listeners(&self, room_id: &str) -> Option<usize> {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.get(room_id).copied()
    }

    fn forget(&self, room_id: &str) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.remove(room_id);
    }
}
