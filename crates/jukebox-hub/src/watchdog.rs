//! Per-session idle watchdog.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use jukebox_types::StopReason;

use crate::jukebox::Jukebox;
use crate::presence::RoomPresence;
use crate::session::Session;

/// Why the watchdog decided to tear a session down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleVerdict {
    NoListeners,
    Inactive,
}

/// Decide whether `session` should be torn down at this tick.
///
/// Unknown presence never counts as empty.
pub fn idle_verdict(
    presence: &dyn RoomPresence,
    session: &Session,
    period: Duration,
) -> Option<IdleVerdict> {
    if presence.listeners(session.room_id()) == Some(0) {
        return Some(IdleVerdict::NoListeners);
    }
    if !session.is_busy() && session.idle_for() >= period {
        return Some(IdleVerdict::Inactive);
    }
    None
}

/// Check `session` every `period` until it ends.
pub fn spawn(jukebox: Arc<Jukebox>, session: Arc<Session>, period: Duration) -> JoinHandle<()> {
    let engine = Arc::clone(&jukebox);
    engine.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = session.scope().cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(verdict) = idle_verdict(jukebox.presence(), &session, period) else {
                continue;
            };
            tracing::info!(room_id = %session.room_id(), verdict = ?verdict, "watchdog ending session");
            jukebox.teardown(&session, StopReason::Idle, true).await;
            break;
        }
    })
}
