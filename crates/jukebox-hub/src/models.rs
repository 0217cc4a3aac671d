//! Engine-internal data model.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jukebox_types::{Platform, TrackSummary};

/// Where the audio of a descriptor is fetched from on the primary platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaySource {
    /// Primary platform video id.
    pub video_id: String,
    /// URI handed to the download tool.
    pub uri: String,
}

impl PlaySource {
    pub fn youtube(video_id: impl Into<String>) -> Self {
        let video_id = video_id.into();
        let uri = format!("https://www.youtube.com/watch?v={video_id}");
        Self { video_id, uri }
    }
}

/// Normalized, platform-agnostic record of one playable track.
///
/// Immutable once resolved; backfilling a play source yields a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongDescriptor {
    pub title: String,
    pub author: Option<String>,
    pub platform: Platform,
    /// Platform-native id, unique per platform.
    pub source_id: String,
    pub duration: Option<Duration>,
    /// Absent for catalogue tracks whose secondary lookup was deferred.
    pub play_source: Option<PlaySource>,
    pub created_at_ms: i64,
}

/// Acquisition cache key.
pub type CacheKey = (Platform, String);

impl SongDescriptor {
    pub fn cache_key(&self) -> CacheKey {
        (self.platform, self.source_id.clone())
    }

    pub fn with_play_source(&self, play_source: PlaySource) -> Self {
        Self {
            play_source: Some(play_source),
            ..self.clone()
        }
    }

    /// Free-text query used to find this track on the primary platform.
    pub fn search_query(&self) -> String {
        match self.author.as_deref().filter(|a| !a.is_empty()) {
            Some(author) => format!("{} by {author}", self.title),
            None => self.title.clone(),
        }
    }

    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            title: self.title.clone(),
            author: self.author.clone(),
            platform: self.platform,
            source_id: self.source_id.clone(),
            duration_ms: self.duration.map(|d| d.as_millis() as u64),
        }
    }
}

/// Milliseconds since the unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
