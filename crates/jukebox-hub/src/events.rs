//! In-process event bus for playback notifications.
//!
//! Provides a lightweight broadcast channel the notification layer subscribes to.

use tokio::sync::broadcast;

use jukebox_types::{PlaybackEvent, StopReason, TrackSummary};

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PlaybackEvent>,
}

impl EventBus {
    /// Create a new event bus with a bounded broadcast channel.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; lagging or missing subscribers are not an error.
    pub fn publish(&self, event: PlaybackEvent) {
        match &event {
            PlaybackEvent::ResolutionFailed { .. }
            | PlaybackEvent::AcquisitionFailed { .. }
            | PlaybackEvent::TransportFailed { .. } => {
                tracing::warn!(room_id = %event.room_id(), summary = %event.summary(), "playback event");
            }
            _ => {
                tracing::info!(room_id = %event.room_id(), summary = %event.summary(), "playback event");
            }
        }
        let _ = self.sender.send(event);
    }

    pub fn enqueued(&self, room_id: &str, track: TrackSummary, position: usize) {
        self.publish(PlaybackEvent::Enqueued {
            room_id: room_id.to_string(),
            track,
            position,
        });
    }

    pub fn now_playing(&self, room_id: &str, track: TrackSummary) {
        self.publish(PlaybackEvent::NowPlaying {
            room_id: room_id.to_string(),
            track,
        });
    }

    pub fn queue_empty(&self, room_id: &str) {
        self.publish(PlaybackEvent::QueueEmpty {
            room_id: room_id.to_string(),
        });
    }

    pub fn resolution_failed(&self, room_id: &str, query: &str, reason: String) {
        self.publish(PlaybackEvent::ResolutionFailed {
            room_id: room_id.to_string(),
            query: query.to_string(),
            reason,
        });
    }

    pub fn acquisition_failed(&self, room_id: &str, track: TrackSummary, reason: String) {
        self.publish(PlaybackEvent::AcquisitionFailed {
            room_id: room_id.to_string(),
            track,
            reason,
        });
    }

    pub fn transport_failed(&self, room_id: &str, reason: String) {
        self.publish(PlaybackEvent::TransportFailed {
            room_id: room_id.to_string(),
            reason,
        });
    }

    pub fn stopped(&self, room_id: &str, reason: StopReason) {
        self.publish(PlaybackEvent::Stopped {
            room_id: room_id.to_string(),
            reason,
        });
    }
}
