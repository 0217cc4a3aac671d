//! In-memory registry of per-room sessions.
//!
//! Creation and removal are the only operations touching the map; everything
//! else mutates an already retrieved [`Session`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use crate::session::Session;

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    /// Parent scope of every session; cancelled on shutdown.
    root: CancellationToken,
}

impl SessionRegistry {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            root,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Return the live session for `room_id`, creating it if needed.
    ///
    /// A terminated session still awaiting removal is replaced. The flag is
    /// `true` when a new session was created.
    pub fn get_or_create(&self, room_id: &str) -> (Arc<Session>, bool) {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(room_id) {
            if !existing.is_terminated() {
                return (existing.clone(), false);
            }
        }
        let session = Arc::new(Session::new(room_id, &self.root));
        sessions.insert(room_id.to_string(), session.clone());
        tracing::info!(room_id = %room_id, "session created");
        (session, true)
    }

    /// Return the live session for `room_id`.
    pub fn get(&self, room_id: &str) -> Option<Arc<Session>> {
        self.lock()
            .get(room_id)
            .filter(|session| !session.is_terminated())
            .cloned()
    }

    /// Remove `session` if it is still the registered one for its room.
    pub fn remove(&self, session: &Arc<Session>) -> bool {
        let mut sessions = self.lock();
        match sessions.get(session.room_id()) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(session.room_id());
                tracing::info!(room_id = %session.room_id(), "session removed");
                true
            }
            _ => false,
        }
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.lock().values().cloned().collect()
    }

    /// Room ids with a live session.
    pub fn active_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .lock()
            .values()
            .filter(|session| !session.is_terminated())
            .map(|session| session.room_id().to_string())
            .collect();
        rooms.sort();
        rooms
    }
}
