//! Audio acquisition: descriptor to local file.
//!
//! Artifacts live in the requesting room's own cache directory, so downloads
//! are single-flight per `(room, platform, source id)`: concurrent callers for
//! the same key share one download task and observe the same result. A
//! process-wide semaphore caps simultaneous downloads and every download has a
//! hard timeout.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::Semaphore;

use jukebox_types::Platform;

use crate::config::AcquisitionSettings;
use crate::downloader::Downloader;
use crate::error::{AcquireError, ResolveError};
use crate::models::SongDescriptor;
use crate::resolver::Resolver;
use crate::resolver::youtube::VideoPlatform;

type SharedAcquire = Shared<BoxFuture<'static, Result<PathBuf, AcquireError>>>;

/// `(room id, platform, source id)`.
type ArtifactKey = (String, Platform, String);

#[derive(Default)]
struct AcquireState {
    /// Finished artifacts; an entry is only a hit while its file is non-empty.
    artifacts: HashMap<ArtifactKey, PathBuf>,
    in_flight: HashMap<ArtifactKey, SharedAcquire>,
}

fn artifact_key(room_id: &str, descriptor: &SongDescriptor) -> ArtifactKey {
    let (platform, source_id) = descriptor.cache_key();
    (room_id.to_string(), platform, source_id)
}

pub struct Acquirer {
    cache_root: PathBuf,
    settings: AcquisitionSettings,
    videos: Arc<dyn VideoPlatform>,
    resolver: Arc<Resolver>,
    downloader: Arc<dyn Downloader>,
    permits: Arc<Semaphore>,
    state: Mutex<AcquireState>,
}

impl Acquirer {
    pub fn new(
        cache_root: PathBuf,
        settings: AcquisitionSettings,
        videos: Arc<dyn VideoPlatform>,
        resolver: Arc<Resolver>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent));
        Self {
            cache_root,
            settings,
            videos,
            resolver,
            downloader,
            permits,
            state: Mutex::new(AcquireState::default()),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Return a local audio file for `descriptor`, downloading it if needed.
    ///
    /// Dropping the returned future abandons the wait only; the shared
    /// download keeps running for any other caller.
    pub async fn acquire(
        self: &Arc<Self>,
        room_id: &str,
        descriptor: &SongDescriptor,
    ) -> Result<PathBuf, AcquireError> {
        let key = artifact_key(room_id, descriptor);
        let shared = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(path) = state.artifacts.get(&key) {
                if is_complete(path) {
                    tracing::debug!(room_id = %room_id, source_id = %key.2, "acquisition cache hit");
                    return Ok(path.clone());
                }
                state.artifacts.remove(&key);
            }
            match state.in_flight.get(&key) {
                Some(shared) => {
                    tracing::debug!(room_id = %room_id, source_id = %key.2, "joining in-flight download");
                    shared.clone()
                }
                None => {
                    let shared = self.spawn_download(room_id, descriptor.clone());
                    state.in_flight.insert(key, shared.clone());
                    shared
                }
            }
        };
        shared.await
    }

    /// Forget every artifact recorded for a room whose cache is going away.
    pub fn forget_room(&self, room_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.artifacts.retain(|(room, _, _), _| room != room_id);
    }

    fn spawn_download(self: &Arc<Self>, room_id: &str, descriptor: SongDescriptor) -> SharedAcquire {
        let this = Arc::clone(self);
        let room_id = room_id.to_string();
        let source_id = descriptor.source_id.clone();
        let task = tokio::spawn(async move {
            let key = artifact_key(&room_id, &descriptor);
            let result = this.download(&room_id, &descriptor).await;
            let mut state = this.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Ok(path) = &result {
                state.artifacts.insert(key.clone(), path.clone());
            }
            state.in_flight.remove(&key);
            result
        });
        async move {
            match task.await {
                Ok(result) => result,
                Err(err) => Err(AcquireError::Failed {
                    source_id,
                    reason: format!("download task aborted: {err}"),
                }),
            }
        }
        .boxed()
        .shared()
    }

    async fn download(&self, room_id: &str, descriptor: &SongDescriptor) -> Result<PathBuf, AcquireError> {
        let source_id = descriptor.source_id.clone();
        let failed = |reason: String| AcquireError::Failed {
            source_id: source_id.clone(),
            reason,
        };

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| failed("acquisition is shutting down".to_string()))?;

        let descriptor = match self.resolver.backfill(descriptor).await {
            Ok(descriptor) => descriptor,
            Err(ResolveError::NotFound { .. }) => {
                return Err(AcquireError::Unavailable { source_id: source_id.clone() });
            }
            Err(err) => return Err(failed(err.to_string())),
        };
        let Some(play_source) = descriptor.play_source.as_ref() else {
            return Err(AcquireError::Unavailable { source_id: source_id.clone() });
        };

        match self.videos.video(&play_source.video_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return Err(AcquireError::Unavailable { source_id: source_id.clone() }),
            Err(err) => return Err(failed(err.to_string())),
        }

        let dir = room_dir(&self.cache_root, room_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| failed(format!("create {}: {err}", dir.display())))?;
        let target = dir.join(format!(
            "{}.{}",
            sanitize_component(&descriptor.source_id),
            self.settings.audio_format
        ));

        tracing::info!(
            room_id = %room_id,
            source_id = %source_id,
            uri = %play_source.uri,
            "download started"
        );
        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(
            self.settings.timeout,
            self.downloader.download(&play_source.uri, &target),
        )
        .await;
        match outcome {
            Err(_) => {
                tracing::warn!(room_id = %room_id, source_id = %source_id, "download timed out");
                let _ = tokio::fs::remove_file(&target).await;
                Err(AcquireError::Timeout {
                    source_id: source_id.clone(),
                    secs: self.settings.timeout.as_secs(),
                })
            }
            Ok(Err(err)) => {
                tracing::warn!(room_id = %room_id, source_id = %source_id, error = %format!("{err:#}"), "download failed");
                let _ = tokio::fs::remove_file(&target).await;
                Err(failed(format!("{err:#}")))
            }
            Ok(Ok(())) if is_complete(&target) => {
                tracing::info!(
                    room_id = %room_id,
                    source_id = %source_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "download finished"
                );
                Ok(target)
            }
            Ok(Ok(())) => Err(failed(format!("no audio written to {}", target.display()))),
        }
    }
}

/// Per-room cache directory.
pub fn room_dir(cache_root: &Path, room_id: &str) -> PathBuf {
    cache_root.join(sanitize_component(room_id))
}

/// Make an id safe to use as a single path component.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if cleaned.is_empty() { "_".to_string() } else { cleaned }
}

fn is_complete(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}
