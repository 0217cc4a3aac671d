use serde::{Deserialize, Serialize};

/// Where a queued track was requested from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Direct link to the primary audio platform.
    Youtube,
    /// Catalogue-only platform resolved through a secondary search.
    Spotify,
    /// Catalogue-only platform whose metadata comes from the link itself.
    Soundcloud,
    /// Free-text search against the primary audio platform.
    Search,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Spotify => "spotify",
            Platform::Soundcloud => "soundcloud",
            Platform::Search => "search",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compact, user-facing view of a queued track.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TrackSummary {
    pub title: String,
    pub author: Option<String>,
    pub platform: Platform,
    pub source_id: String,
    pub duration_ms: Option<u64>,
}

impl TrackSummary {
    /// `Title | Author | m:ss`, omitting the parts that are unknown.
    pub fn display_line(&self) -> String {
        let mut line = self.title.clone();
        if let Some(author) = self.author.as_deref().filter(|a| !a.is_empty()) {
            line.push_str(" | ");
            line.push_str(author);
        }
        if let Some(ms) = self.duration_ms {
            line.push_str(" | ");
            line.push_str(&format_duration_ms(ms));
        }
        line
    }
}

/// Why a session was torn down.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A user asked for it.
    Requested,
    /// The idle watchdog found no activity or no listeners.
    Idle,
    /// The transport failed while streaming.
    TransportLost,
    /// The server is shutting down.
    Shutdown,
}

/// Notification published by the playback engine.
///
/// The engine never formats final user-facing text; consumers decide how to
/// render these, `summary()` being a plain fallback.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaybackEvent {
    Enqueued {
        room_id: String,
        track: TrackSummary,
        /// 1-based position in the room queue.
        position: usize,
    },
    NowPlaying {
        room_id: String,
        track: TrackSummary,
    },
    QueueEmpty {
        room_id: String,
    },
    ResolutionFailed {
        room_id: String,
        query: String,
        reason: String,
    },
    AcquisitionFailed {
        room_id: String,
        track: TrackSummary,
        reason: String,
    },
    TransportFailed {
        room_id: String,
        reason: String,
    },
    Stopped {
        room_id: String,
        reason: StopReason,
    },
}

impl PlaybackEvent {
    pub fn room_id(&self) -> &str {
        match self {
            PlaybackEvent::Enqueued { room_id, .. }
            | PlaybackEvent::NowPlaying { room_id, .. }
            | PlaybackEvent::QueueEmpty { room_id }
            | PlaybackEvent::ResolutionFailed { room_id, .. }
            | PlaybackEvent::AcquisitionFailed { room_id, .. }
            | PlaybackEvent::TransportFailed { room_id, .. }
            | PlaybackEvent::Stopped { room_id, .. } => room_id,
        }
    }

    /// Short human-readable payload.
    pub fn summary(&self) -> String {
        match self {
            PlaybackEvent::Enqueued { track, position, .. } => {
                format!("#{position} {}", track.display_line())
            }
            PlaybackEvent::NowPlaying { track, .. } => track.display_line(),
            PlaybackEvent::QueueEmpty { .. } => "playlist finished".to_string(),
            PlaybackEvent::ResolutionFailed { query, reason, .. } => {
                format!("could not find \"{query}\": {reason}")
            }
            PlaybackEvent::AcquisitionFailed { track, reason, .. } => {
                format!("skipped {}: {reason}", track.title)
            }
            PlaybackEvent::TransportFailed { reason, .. } => format!("audio unavailable: {reason}"),
            PlaybackEvent::Stopped { reason, .. } => match reason {
                StopReason::Requested => "stopped and cleared the playlist".to_string(),
                StopReason::Idle => "left after inactivity".to_string(),
                StopReason::TransportLost => "disconnected from audio".to_string(),
                StopReason::Shutdown => "server shutting down".to_string(),
            },
        }
    }
}

/// Playback status of one room.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SessionStatus {
    pub room_id: String,
    /// `true` only while audio is being pumped to the transport.
    pub is_playing: bool,
    /// Queued tracks, including the one in flight until it has been advanced past.
    pub queue_depth: usize,
    pub now_playing: Option<TrackSummary>,
}

/// Request body for adding a query to a room queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EnqueueRequest {
    pub user_id: String,
    /// Link or free text.
    pub query: String,
    /// Start playback right away when idle (default `true`).
    pub autoplay: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EnqueueResponse {
    /// Tracks added, in queue order (more than one for playlist links).
    pub added: Vec<TrackSummary>,
    pub status: SessionStatus,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PlayOutcome {
    Started,
    AlreadyPlaying,
    NothingQueued,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PlayResponse {
    pub outcome: PlayOutcome,
    pub status: SessionStatus,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SkipOutcome {
    Skipped,
    NothingPlaying,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    NotActive,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SkipResponse {
    pub outcome: SkipOutcome,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StopResponse {
    pub outcome: StopOutcome,
}

/// Listener count pushed by the chat gateway for the idle watchdog.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ListenersRequest {
    /// Non-automated participants in the room's audio context.
    pub count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorResponse {
    pub error: String,
}

/// Format milliseconds as `m:ss`, or `h:mm:ss` past one hour.
pub fn format_duration_ms(ms: u64) -> String {
    let total = ms / 1000;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}
