//! Catalogue platform client (Spotify Web API, client credentials flow).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::ResolveError;

pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Refresh the access token this long before the server-side expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// Guards against a catalogue that keeps handing out `next` links.
const MAX_PLAYLIST_PAGES: usize = 100;

/// Metadata of one catalogue track; catalogues carry no audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueTrack {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CataloguePlaylist {
    pub name: Option<String>,
    /// Tracks in playlist order.
    pub tracks: Vec<CatalogueTrack>,
}

#[async_trait]
pub trait TrackCatalogue: Send + Sync {
    async fn track(&self, track_id: &str) -> Result<Option<CatalogueTrack>, ResolveError>;
    async fn playlist_tracks(
        &self,
        playlist_id: &str,
    ) -> Result<Option<CataloguePlaylist>, ResolveError>;
}

pub struct SpotifyClient {
    http: Client,
    api_base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct TrackObject {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    duration_ms: Option<u64>,
}

#[derive(Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Deserialize)]
struct PlaylistObject {
    name: Option<String>,
    tracks: TrackPage,
}

#[derive(Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    track: Option<TrackObject>,
}

impl SpotifyClient {
    pub fn new(
        http: Client,
        client_id: String,
        client_secret: String,
        api_base_url: Option<String>,
        token_url: Option<String>,
    ) -> Self {
        Self {
            http,
            api_base_url: api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            token_url: token_url.unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, ResolveError> {
        {
            let guard = self.token.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(token) = guard.as_ref().filter(|t| t.expires_at > Instant::now()) {
                return Ok(token.access_token.clone());
            }
        }
        let resp = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()?;
        let token = resp.json::<TokenResponse>().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        let cached = CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + lifetime,
        };
        tracing::debug!(expires_in = token.expires_in, "spotify token refreshed");
        let access_token = cached.access_token.clone();
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = Some(cached);
        Ok(access_token)
    }

    /// GET a JSON document; `None` on 404.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
    ) -> Result<Option<T>, ResolveError> {
        let token = self.access_token().await?;
        let resp = self.http.get(url).bearer_auth(token).send().await?;
        if resp.status() == StatusCode::NOT_FOUND || resp.status() == StatusCode::BAD_REQUEST {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        Ok(Some(resp.json::<T>().await?))
    }
}

#[async_trait]
impl TrackCatalogue for SpotifyClient {
    async fn track(&self, track_id: &str) -> Result<Option<CatalogueTrack>, ResolveError> {
        let url = format!("{}/tracks/{track_id}", self.api_base_url);
        let track = self.get_json::<TrackObject>(&url).await?;
        Ok(track.and_then(catalogue_track))
    }

    async fn playlist_tracks(
        &self,
        playlist_id: &str,
    ) -> Result<Option<CataloguePlaylist>, ResolveError> {
        let url = format!("{}/playlists/{playlist_id}", self.api_base_url);
        let Some(playlist) = self.get_json::<PlaylistObject>(&url).await? else {
            return Ok(None);
        };
        let mut tracks = Vec::new();
        let mut page = playlist.tracks;
        let mut pages = 1;
        loop {
            let item_count = page.items.len();
            tracks.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.track)
                    .filter_map(catalogue_track),
            );
            tracing::debug!(playlist_id = %playlist_id, page = pages, items = item_count, "playlist page");
            let Some(next) = page.next else { break };
            if pages >= MAX_PLAYLIST_PAGES {
                tracing::warn!(playlist_id = %playlist_id, "playlist truncated after {MAX_PLAYLIST_PAGES} pages");
                break;
            }
            match self.get_json::<TrackPage>(&next).await? {
                Some(next_page) => page = next_page,
                None => break,
            }
            pages += 1;
        }
        Ok(Some(CataloguePlaylist {
            name: playlist.name,
            tracks,
        }))
    }
}

/// Local files and removed items come without an id and are skipped.
fn catalogue_track(track: TrackObject) -> Option<CatalogueTrack> {
    let id = track.id.filter(|id| !id.is_empty())?;
    let artist = (!track.artists.is_empty()).then(|| {
        track
            .artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    });
    Some(CatalogueTrack {
        id,
        title: track.name,
        artist,
        duration: track.duration_ms.map(Duration::from_millis),
    })
}
