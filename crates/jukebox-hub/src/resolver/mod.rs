//! Song descriptor resolution.
//!
//! Turns a raw user query into one or more playable descriptors. Each source
//! kind of [`SourceQuery`] has its own resolve path; catalogue tracks carry no
//! audio and get their play source from a secondary search on the primary
//! platform.

pub mod query;
pub mod spotify;
pub mod youtube;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::stream::{self, Stream, StreamExt};

use jukebox_types::Platform;

use crate::error::ResolveError;
use crate::models::{CacheKey, PlaySource, SongDescriptor, now_ms};
use query::{CatalogueRef, DirectLink, SourceQuery};
use spotify::{CatalogueTrack, TrackCatalogue};
use youtube::{VideoInfo, VideoPlatform};

/// What a query resolved to.
#[derive(Debug, Clone)]
pub enum Resolution {
    Track(SongDescriptor),
    /// Catalogue playlist; members are resolved with [`Resolver::resolve_members`].
    Playlist(PlaylistImport),
}

#[derive(Debug, Clone)]
pub struct PlaylistImport {
    pub playlist_id: String,
    pub name: Option<String>,
    pub tracks: Vec<CatalogueTrack>,
}

/// Outcome of resolving one playlist member.
#[derive(Debug, Clone)]
pub struct MemberResolution {
    pub track: CatalogueTrack,
    pub result: Result<SongDescriptor, ResolveError>,
}

/// Memoized descriptors keyed by `(platform, source id)`.
#[derive(Default)]
pub struct DescriptorCache {
    entries: Mutex<HashMap<CacheKey, SongDescriptor>>,
}

impl DescriptorCache {
    pub fn get(&self, key: &CacheKey) -> Option<SongDescriptor> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    pub fn insert(&self, descriptor: &SongDescriptor) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(descriptor.cache_key(), descriptor.clone());
    }
}

pub struct Resolver {
    videos: Arc<dyn VideoPlatform>,
    catalogue: Option<Arc<dyn TrackCatalogue>>,
    cache: Arc<DescriptorCache>,
    /// Parallelism of playlist member resolution.
    fan_out: usize,
}

impl Resolver {
    pub fn new(
        videos: Arc<dyn VideoPlatform>,
        catalogue: Option<Arc<dyn TrackCatalogue>>,
        cache: Arc<DescriptorCache>,
        fan_out: usize,
    ) -> Self {
        Self {
            videos,
            catalogue,
            cache,
            fan_out: fan_out.max(1),
        }
    }

    /// Resolve a raw query for `room_id`.
    pub async fn resolve(&self, raw: &str, room_id: &str) -> Result<Resolution, ResolveError> {
        let query = SourceQuery::parse(raw).ok_or_else(|| ResolveError::not_found(raw))?;
        tracing::debug!(room_id = %room_id, query = ?query, "resolving");
        let resolution = match query {
            SourceQuery::Direct(link) => self.resolve_direct(link).await.map(Resolution::Track),
            SourceQuery::CatalogueTrack(reference) => self
                .resolve_catalogue_track(reference)
                .await
                .map(Resolution::Track),
            SourceQuery::CataloguePlaylist { playlist_id } => self
                .resolve_playlist(playlist_id)
                .await
                .map(Resolution::Playlist),
            SourceQuery::FreeText(text) => {
                self.resolve_free_text(&text).await.map(Resolution::Track)
            }
        };
        if let Err(err) = &resolution {
            tracing::warn!(room_id = %room_id, query = %raw, error = %err, "resolution failed");
        }
        resolution
    }

    /// Resolve playlist members in parallel, yielding results in playlist order.
    pub fn resolve_members(
        &self,
        tracks: Vec<CatalogueTrack>,
    ) -> impl Stream<Item = MemberResolution> + Send + '_ {
        stream::iter(tracks)
            .map(move |track| async move {
                let result = self.resolve_member(&track).await;
                MemberResolution { track, result }
            })
            .buffered(self.fan_out)
    }

    /// Find a play source for a descriptor that has none yet.
    pub async fn backfill(&self, descriptor: &SongDescriptor) -> Result<SongDescriptor, ResolveError> {
        if descriptor.play_source.is_some() {
            return Ok(descriptor.clone());
        }
        let hit = self.search_required(&descriptor.search_query()).await?;
        let resolved = descriptor.with_play_source(PlaySource::youtube(hit.id));
        self.cache.insert(&resolved);
        Ok(resolved)
    }

    async fn resolve_direct(&self, link: DirectLink) -> Result<SongDescriptor, ResolveError> {
        let key = (Platform::Youtube, link.video_id.clone());
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }
        match self.videos.video(&link.video_id).await? {
            Some(info) => Ok(self.remember(descriptor_from_video(Platform::Youtube, info))),
            // A bare id may just be an eleven letter word.
            None if link.bare => self.resolve_free_text(&link.video_id).await,
            None => Err(ResolveError::not_found(link.video_id)),
        }
    }

    async fn resolve_free_text(&self, text: &str) -> Result<SongDescriptor, ResolveError> {
        let info = self.search_required(text).await?;
        Ok(self.remember(descriptor_from_video(Platform::Search, info)))
    }

    async fn resolve_catalogue_track(
        &self,
        reference: CatalogueRef,
    ) -> Result<SongDescriptor, ResolveError> {
        match reference {
            CatalogueRef::Spotify { track_id } => {
                if let Some(hit) = self.cached(&(Platform::Spotify, track_id.clone())) {
                    return Ok(hit);
                }
                let catalogue = self.catalogue_required(&track_id)?;
                let track = catalogue
                    .track(&track_id)
                    .await?
                    .ok_or_else(|| ResolveError::not_found(&track_id))?;
                let descriptor = descriptor_from_catalogue(&track);
                let hit = self.search_required(&descriptor.search_query()).await?;
                Ok(self.remember(merge_play_source(descriptor, hit)))
            }
            CatalogueRef::Soundcloud {
                path,
                artist,
                title,
            } => {
                if let Some(hit) = self.cached(&(Platform::Soundcloud, path.clone())) {
                    return Ok(hit);
                }
                let descriptor = SongDescriptor {
                    title,
                    author: Some(artist),
                    platform: Platform::Soundcloud,
                    source_id: path,
                    duration: None,
                    play_source: None,
                    created_at_ms: now_ms(),
                };
                let hit = self.search_required(&descriptor.search_query()).await?;
                // The URL slug is lossy; prefer the names of the matched video.
                let descriptor = SongDescriptor {
                    title: hit.title.clone(),
                    author: hit.channel.clone().or(descriptor.author.clone()),
                    ..descriptor
                };
                Ok(self.remember(merge_play_source(descriptor, hit)))
            }
        }
    }

    async fn resolve_playlist(&self, playlist_id: String) -> Result<PlaylistImport, ResolveError> {
        let catalogue = self.catalogue_required(&playlist_id)?;
        let playlist = catalogue
            .playlist_tracks(&playlist_id)
            .await?
            .ok_or_else(|| ResolveError::not_found(&playlist_id))?;
        if playlist.tracks.is_empty() {
            return Err(ResolveError::not_found(&playlist_id));
        }
        tracing::info!(
            playlist_id = %playlist_id,
            tracks = playlist.tracks.len(),
            "playlist fetched"
        );
        Ok(PlaylistImport {
            playlist_id,
            name: playlist.name,
            tracks: playlist.tracks,
        })
    }

    async fn resolve_member(&self, track: &CatalogueTrack) -> Result<SongDescriptor, ResolveError> {
        let key = (Platform::Spotify, track.id.clone());
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }
        let descriptor = descriptor_from_catalogue(track);
        match self.videos.search_top(&descriptor.search_query()).await {
            Ok(Some(hit)) => Ok(self.remember(merge_play_source(descriptor, hit))),
            Ok(None) => Err(ResolveError::not_found(descriptor.search_query())),
            Err(err) => {
                tracing::warn!(source_id = %track.id, error = %err, "playlist member lookup failed");
                Err(err)
            }
        }
    }

    async fn search_required(&self, text: &str) -> Result<VideoInfo, ResolveError> {
        self.videos
            .search_top(text)
            .await?
            .ok_or_else(|| ResolveError::not_found(text))
    }

    fn catalogue_required(&self, id: &str) -> Result<&Arc<dyn TrackCatalogue>, ResolveError> {
        self.catalogue.as_ref().ok_or_else(|| {
            tracing::warn!(id = %id, "catalogue link received but no catalogue is configured");
            ResolveError::not_found(id)
        })
    }

    fn cached(&self, key: &CacheKey) -> Option<SongDescriptor> {
        let hit = self.cache.get(key)?;
        tracing::debug!(platform = %key.0, source_id = %key.1, "descriptor cache hit");
        Some(SongDescriptor {
            created_at_ms: now_ms(),
            ..hit
        })
    }

    fn remember(&self, descriptor: SongDescriptor) -> SongDescriptor {
        self.cache.insert(&descriptor);
        descriptor
    }
}

fn descriptor_from_video(platform: Platform, info: VideoInfo) -> SongDescriptor {
    SongDescriptor {
        title: info.title,
        author: info.channel,
        platform,
        play_source: Some(PlaySource::youtube(info.id.clone())),
        source_id: info.id,
        duration: info.duration,
        created_at_ms: now_ms(),
    }
}

fn descriptor_from_catalogue(track: &CatalogueTrack) -> SongDescriptor {
    SongDescriptor {
        title: track.title.clone(),
        author: track.artist.clone(),
        platform: Platform::Spotify,
        source_id: track.id.clone(),
        duration: track.duration,
        play_source: None,
        created_at_ms: now_ms(),
    }
}

fn merge_play_source(descriptor: SongDescriptor, hit: VideoInfo) -> SongDescriptor {
    SongDescriptor {
        duration: descriptor.duration.or(hit.duration),
        play_source: Some(PlaySource::youtube(hit.id)),
        ..descriptor
    }
}
