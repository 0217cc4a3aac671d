//! In-crate fakes for the engine's external collaborators.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_util::sync::CancellationToken;

use jukebox_types::{PlaybackEvent, Platform};

use crate::acquisition::Acquirer;
use crate::config::AcquisitionSettings;
use crate::downloader::Downloader;
use crate::error::{ResolveError, TranscodeError, TransportError};
use crate::events::EventBus;
use crate::jukebox::{Jukebox, JukeboxParts};
use crate::models::{PlaySource, SongDescriptor};
use crate::presence::ReportedPresence;
use crate::resolver::spotify::{CataloguePlaylist, CatalogueTrack, TrackCatalogue};
use crate::resolver::youtube::{VideoInfo, VideoPlatform};
use crate::resolver::{DescriptorCache, Resolver};
use crate::transcode::{PcmStream, Transcoder};
use crate::transport::{Transport, TransportHandle};

pub fn video(id: &str, title: &str, secs: u64) -> VideoInfo {
    VideoInfo {
        id: id.to_string(),
        title: title.to_string(),
        channel: Some("Channel".to_string()),
        duration: Some(Duration::from_secs(secs)),
    }
}

pub fn catalogue_track(id: &str, title: &str, artist: &str) -> CatalogueTrack {
    CatalogueTrack {
        id: id.to_string(),
        title: title.to_string(),
        artist: Some(artist.to_string()),
        duration: Some(Duration::from_secs(180)),
    }
}

/// A resolved primary-platform track titled "Song" by "Artist".
pub fn descriptor(id: &str) -> SongDescriptor {
    SongDescriptor {
        title: "Song".to_string(),
        author: Some("Artist".to_string()),
        platform: Platform::Youtube,
        source_id: id.to_string(),
        duration: Some(Duration::from_secs(60)),
        play_source: Some(PlaySource::youtube(id)),
        created_at_ms: 0,
    }
}

/// Video platform answering from fixed tables.
#[derive(Default)]
pub struct FakeVideos {
    videos: HashMap<String, VideoInfo>,
    searches: HashMap<String, VideoInfo>,
    search_delay: Option<Duration>,
    failing: bool,
    video_calls: Arc<AtomicUsize>,
}

impl FakeVideos {
    pub fn with_video(mut self, info: VideoInfo) -> Self {
        self.videos.insert(info.id.clone(), info);
        self
    }

    /// Answer `query` (exact match) with `info`.
    pub fn with_search(mut self, query: &str, info: VideoInfo) -> Self {
        self.searches.insert(query.to_string(), info);
        self
    }

    pub fn with_search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = Some(delay);
        self
    }

    /// Every lookup fails with a transport error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn video_calls(&self) -> Arc<AtomicUsize> {
        self.video_calls.clone()
    }
}

#[async_trait]
impl VideoPlatform for FakeVideos {
    async fn search_top(&self, query: &str) -> Result<Option<VideoInfo>, ResolveError> {
        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(ResolveError::Transport("search unavailable".to_string()));
        }
        Ok(self.searches.get(query).cloned())
    }

    async fn video(&self, video_id: &str) -> Result<Option<VideoInfo>, ResolveError> {
        self.video_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(ResolveError::Transport("videos unavailable".to_string()));
        }
        Ok(self.videos.get(video_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeCatalogue {
    tracks: HashMap<String, CatalogueTrack>,
    playlists: HashMap<String, Vec<CatalogueTrack>>,
}

impl FakeCatalogue {
    pub fn with_track(mut self, track: CatalogueTrack) -> Self {
        self.tracks.insert(track.id.clone(), track);
        self
    }

    pub fn with_playlist(mut self, playlist_id: &str, tracks: Vec<CatalogueTrack>) -> Self {
        self.playlists.insert(playlist_id.to_string(), tracks);
        self
    }
}

#[async_trait]
impl TrackCatalogue for FakeCatalogue {
    async fn track(&self, track_id: &str) -> Result<Option<CatalogueTrack>, ResolveError> {
        Ok(self.tracks.get(track_id).cloned())
    }

    async fn playlist_tracks(
        &self,
        playlist_id: &str,
    ) -> Result<Option<CataloguePlaylist>, ResolveError> {
        Ok(self.playlists.get(playlist_id).map(|tracks| CataloguePlaylist {
            name: Some(playlist_id.to_string()),
            tracks: tracks.clone(),
        }))
    }
}

/// Writes `pcm:<uri>` to the target instead of fetching anything.
#[derive(Default)]
pub struct FakeDownloader {
    pub calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    delay: Option<Duration>,
    slow_uris: HashMap<String, Duration>,
    failing: bool,
    uris: Mutex<Vec<String>>,
}

impl FakeDownloader {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delay only downloads of `uri`.
    pub fn with_slow_uri(mut self, uri: &str, delay: Duration) -> Self {
        self.slow_uris.insert(uri.to_string(), delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn uris(&self) -> Vec<String> {
        self.uris.lock().unwrap().clone()
    }

    /// Most downloads ever running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, uri: &str, target: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.uris.lock().unwrap().push(uri.to_string());
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.slow_uris.get(uri).copied().or(self.delay) {
            tokio::time::sleep(delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        if self.failing {
            return Err(anyhow!("ERROR: Video unavailable"));
        }
        tokio::fs::write(target, format!("pcm:{uri}")).await?;
        Ok(())
    }
}

/// Streams the artifact bytes as PCM, or endless silence.
#[derive(Default)]
pub struct FakeTranscoder {
    endless: AtomicBool,
}

impl Transcoder for FakeTranscoder {
    fn open(&self, path: &Path) -> Result<PcmStream, TranscodeError> {
        if self.endless.load(Ordering::SeqCst) {
            return Ok(PcmStream::from_reader(tokio::io::repeat(0)));
        }
        let bytes = std::fs::read(path)
            .map_err(|_| TranscodeError::MissingInput(path.display().to_string()))?;
        Ok(PcmStream::from_reader(io::Cursor::new(bytes)))
    }
}

#[derive(Default)]
struct Recording {
    bytes: Mutex<Vec<u8>>,
    writes: AtomicUsize,
    flushes: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    fail_connect: AtomicBool,
    stall_flush: AtomicBool,
    fail_writes_after: Mutex<Option<usize>>,
}

/// Transport recording everything written to any room.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Recording>,
}

impl RecordingTransport {
    pub fn bytes(&self) -> Vec<u8> {
        self.inner.bytes.lock().unwrap().clone()
    }

    pub fn flushes(&self) -> usize {
        self.inner.flushes.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.inner.disconnects.load(Ordering::SeqCst)
    }

    pub fn fail_connect(&self, fail: bool) {
        self.inner.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make every flush hang until the caller gives up on it.
    pub fn stall_flush(&self, stall: bool) {
        self.inner.stall_flush.store(stall, Ordering::SeqCst);
    }

    /// Accept `n` more chunk writes, then fail every write.
    pub fn fail_writes_after(&self, n: usize) {
        let done = self.inner.writes.load(Ordering::SeqCst);
        *self.inner.fail_writes_after.lock().unwrap() = Some(done + n);
    }
}

struct RecordingHandle {
    inner: Arc<Recording>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn connect(&self, room_id: &str) -> Result<Box<dyn TransportHandle>, TransportError> {
        if self.inner.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connect(format!("room {room_id} refused")));
        }
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingHandle {
            inner: self.inner.clone(),
        }))
    }
}

#[async_trait]
impl TransportHandle for RecordingHandle {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        // An endless source would otherwise never give other tasks a turn.
        tokio::task::yield_now().await;
        let limit = *self.inner.fail_writes_after.lock().unwrap();
        if limit.is_some_and(|limit| self.inner.writes.load(Ordering::SeqCst) >= limit) {
            return Err(TransportError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "sink went away",
            )));
        }
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.bytes.lock().unwrap().extend_from_slice(chunk);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        self.inner.flushes.fetch_add(1, Ordering::SeqCst);
        if self.inner.stall_flush.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn disconnect(self: Box<Self>) {
        self.inner.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fully wired engine over fakes.
pub struct Harness {
    pub jukebox: Arc<Jukebox>,
    pub transport: RecordingTransport,
    pub presence: Arc<ReportedPresence>,
    pub events: broadcast::Receiver<PlaybackEvent>,
    transcoder: Arc<FakeTranscoder>,
    dir: tempfile::TempDir,
}

pub struct HarnessBuilder {
    videos: FakeVideos,
    catalogue: FakeCatalogue,
    downloader: FakeDownloader,
    acquisition_timeout: Duration,
    watchdog_interval: Duration,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            videos: FakeVideos::default(),
            catalogue: FakeCatalogue::default(),
            downloader: FakeDownloader::default(),
            acquisition_timeout: Duration::from_secs(5),
            watchdog_interval: Duration::from_secs(3600),
        }
    }

    /// Make every track stream silence until stopped or skipped.
    pub fn endless(self) -> Self {
        self.transcoder.endless.store(true, Ordering::SeqCst);
        self
    }

    pub fn cache_root(&self) -> &Path {
        self.dir.path()
    }

    pub async fn next_event(&mut self) -> PlaybackEvent {
        let events = &mut self.events;
        let next = async {
            loop {
                match events.recv().await {
                    Ok(event) => return event,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => panic!("event bus closed"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), next)
            .await
            .expect("timed out waiting for an event")
    }

    /// Skip events until one matches `pred`.
    pub async fn wait_for(&mut self, pred: impl Fn(&PlaybackEvent) -> bool) -> PlaybackEvent {
        loop {
            let event = self.next_event().await;
            if pred(&event) {
                return event;
            }
        }
    }

    /// Events already published and not yet consumed.
    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        let mut drained = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => drained.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return drained,
            }
        }
    }
}

impl HarnessBuilder {
    pub fn videos(mut self, f: impl FnOnce(FakeVideos) -> FakeVideos) -> Self {
        self.videos = f(self.videos);
        self
    }

    pub fn catalogue(mut self, f: impl FnOnce(FakeCatalogue) -> FakeCatalogue) -> Self {
        self.catalogue = f(self.catalogue);
        self
    }

    pub fn downloader(mut self, f: impl FnOnce(FakeDownloader) -> FakeDownloader) -> Self {
        self.downloader = f(self.downloader);
        self
    }

    pub fn acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.acquisition_timeout = timeout;
        self
    }

    pub fn watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval = interval;
        self
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let videos: Arc<dyn VideoPlatform> = Arc::new(self.videos);
        let catalogue: Arc<dyn TrackCatalogue> = Arc::new(self.catalogue);
        let resolver = Arc::new(Resolver::new(
            videos.clone(),
            Some(catalogue),
            Arc::new(DescriptorCache::default()),
            3,
        ));
        let acquirer = Arc::new(Acquirer::new(
            PathBuf::from(dir.path()),
            AcquisitionSettings {
                max_concurrent: 3,
                timeout: self.acquisition_timeout,
                tool: "yt-dlp".to_string(),
                audio_format: "mp3".to_string(),
            },
            videos,
            resolver.clone(),
            Arc::new(self.downloader),
        ));
        let transport = RecordingTransport::default();
        let transcoder = Arc::new(FakeTranscoder::default());
        let presence = Arc::new(ReportedPresence::default());
        let events = EventBus::new();
        let receiver = events.subscribe();
        let jukebox = Jukebox::new(
            JukeboxParts {
                resolver,
                acquirer,
                transcoder: transcoder.clone(),
                transport: Arc::new(transport.clone()),
                presence: presence.clone(),
                events,
                chunk_bytes: 8,
                watchdog_interval: self.watchdog_interval,
                runtime: tokio::runtime::Handle::current(),
            },
            CancellationToken::new(),
        );
        Harness {
            jukebox,
            transport,
            presence,
            events: receiver,
            transcoder,
            dir,
        }
    }
}
