//! Classification of raw user queries into source kinds.

use std::sync::LazyLock;

use regex::Regex;

static SPOTIFY_PLAYLIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"open\.spotify\.com/(?:intl-[a-z]{2}/)?playlist/(?P<id>[A-Za-z0-9]+)")
        .expect("spotify playlist regex")
});

static SPOTIFY_TRACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"open\.spotify\.com/(?:intl-[a-z]{2}/)?track/(?P<id>[A-Za-z0-9]+)")
        .expect("spotify track regex")
});

static SOUNDCLOUD_TRACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"soundcloud\.com/(?P<artist>[^/?#\s]+)/(?P<slug>[^/?#\s]+)")
        .expect("soundcloud regex")
});

static YOUTUBE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:youtu\.be/|youtube\.com/shorts/|youtube\.com/watch\?(?:[^\s#]*&)?v=)(?P<id>[A-Za-z0-9_-]{11})",
    )
    .expect("youtube regex")
});

static BARE_VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("video id regex"));

/// A link to a single track on the primary audio platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectLink {
    pub video_id: String,
    /// The query was an id without any URL around it; it may just be a word.
    pub bare: bool,
}

/// A single track on a metadata-only catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogueRef {
    Spotify { track_id: String },
    Soundcloud {
        /// `artist/slug` exactly as in the URL.
        path: String,
        artist: String,
        title: String,
    },
}

/// Tagged union of everything a user can ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceQuery {
    Direct(DirectLink),
    CatalogueTrack(CatalogueRef),
    CataloguePlaylist { playlist_id: String },
    FreeText(String),
}

impl SourceQuery {
    /// Classify a raw query; `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(caps) = SPOTIFY_PLAYLIST.captures(raw) {
            return Some(SourceQuery::CataloguePlaylist {
                playlist_id: caps["id"].to_string(),
            });
        }
        if let Some(caps) = SPOTIFY_TRACK.captures(raw) {
            return Some(SourceQuery::CatalogueTrack(CatalogueRef::Spotify {
                track_id: caps["id"].to_string(),
            }));
        }
        if let Some(caps) = SOUNDCLOUD_TRACK.captures(raw) {
            let artist = humanize_slug(&caps["artist"]);
            let title = humanize_slug(&caps["slug"]);
            return Some(SourceQuery::CatalogueTrack(CatalogueRef::Soundcloud {
                path: format!("{}/{}", &caps["artist"], &caps["slug"]),
                artist,
                title,
            }));
        }
        if let Some(caps) = YOUTUBE_LINK.captures(raw) {
            return Some(SourceQuery::Direct(DirectLink {
                video_id: caps["id"].to_string(),
                bare: false,
            }));
        }
        if BARE_VIDEO_ID.is_match(raw) {
            return Some(SourceQuery::Direct(DirectLink {
                video_id: raw.to_string(),
                bare: true,
            }));
        }
        Some(SourceQuery::FreeText(raw.to_string()))
    }
}

/// Turn a URL slug like `never-gonna-give-you-up` into words.
fn humanize_slug(slug: &str) -> String {
    let decoded = urlencoding::decode(slug)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| slug.to_string());
    decoded
        .split(['-', '_'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
