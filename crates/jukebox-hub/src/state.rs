//! Shared application state.

use std::sync::Arc;

use crate::jukebox::Jukebox;
use crate::presence::ReportedPresence;

/// State handed to every HTTP handler.
pub struct AppState {
    pub jukebox: Arc<Jukebox>,
    /// Listener counts reported by the gateway; also read by the watchdog.
    pub presence: Arc<ReportedPresence>,
}

impl AppState {
    pub fn new(jukebox: Arc<Jukebox>, presence: Arc<ReportedPresence>) -> Self {
        Self { jukebox, presence }
    }
}
