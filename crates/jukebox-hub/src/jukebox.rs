//! Playlist/playback engine facade used by the command layer.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use jukebox_types::{PlayOutcome, SessionStatus, SkipOutcome, StopOutcome, StopReason, TrackSummary};

use crate::acquisition::{Acquirer, room_dir};
use crate::error::ResolveError;
use crate::events::EventBus;
use crate::models::SongDescriptor;
use crate::playback::{self, LoopExit, PlaybackContext};
use crate::presence::RoomPresence;
use crate::resolver::{Resolution, Resolver};
use crate::session::{Session, SessionTerminated, StartDecision};
use crate::session_registry::SessionRegistry;
use crate::transcode::Transcoder;
use crate::transport::Transport;
use crate::watchdog;

/// Collaborators the engine is built from.
pub struct JukeboxParts {
    pub resolver: Arc<Resolver>,
    pub acquirer: Arc<Acquirer>,
    pub transcoder: Arc<dyn Transcoder>,
    pub transport: Arc<dyn Transport>,
    pub presence: Arc<dyn RoomPresence>,
    pub events: EventBus,
    pub chunk_bytes: usize,
    pub watchdog_interval: Duration,
    /// Runtime every session task runs on, whichever thread issues the command.
    pub runtime: Handle,
}

pub struct Jukebox {
    registry: SessionRegistry,
    resolver: Arc<Resolver>,
    playback: PlaybackContext,
    presence: Arc<dyn RoomPresence>,
    events: EventBus,
    watchdog_interval: Duration,
    runtime: Handle,
    shutdown: CancellationToken,
}

impl Jukebox {
    pub fn new(parts: JukeboxParts, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            registry: SessionRegistry::new(shutdown.clone()),
            resolver: parts.resolver,
            playback: PlaybackContext {
                acquirer: parts.acquirer,
                transcoder: parts.transcoder,
                transport: parts.transport,
                events: parts.events.clone(),
                chunk_bytes: parts.chunk_bytes.max(1),
            },
            presence: parts.presence,
            events: parts.events,
            watchdog_interval: parts.watchdog_interval,
            runtime: parts.runtime,
            shutdown,
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn presence(&self) -> &dyn RoomPresence {
        self.presence.as_ref()
    }

    pub fn active_rooms(&self) -> Vec<String> {
        self.registry.active_rooms()
    }

    pub(crate) fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(task)
    }

    /// Resolve `raw` and append the result to the room's queue.
    ///
    /// Playlist members are appended one by one in playlist order as they
    /// resolve; failed members are reported and skipped.
    pub async fn enqueue(
        self: &Arc<Self>,
        room_id: &str,
        user_id: &str,
        raw: &str,
    ) -> Result<Vec<TrackSummary>, ResolveError> {
        tracing::info!(room_id = %room_id, user_id = %user_id, query = %raw, "enqueue requested");
        let resolution = match self.resolver.resolve(raw, room_id).await {
            Ok(resolution) => resolution,
            Err(err) => {
                self.events.resolution_failed(room_id, raw, err.to_string());
                return Err(err);
            }
        };
        match resolution {
            Resolution::Track(descriptor) => Ok(vec![self.push(room_id, descriptor)]),
            Resolution::Playlist(import) => {
                let mut added = Vec::new();
                let mut members = Box::pin(self.resolver.resolve_members(import.tracks));
                while let Some(member) = members.next().await {
                    match member.result {
                        Ok(descriptor) => added.push(self.push(room_id, descriptor)),
                        Err(err) => {
                            let query = match &member.track.artist {
                                Some(artist) => format!("{} by {artist}", member.track.title),
                                None => member.track.title.clone(),
                            };
                            self.events.resolution_failed(room_id, &query, err.to_string());
                        }
                    }
                }
                tracing::info!(
                    room_id = %room_id,
                    playlist_id = %import.playlist_id,
                    name = import.name.as_deref().unwrap_or(""),
                    added = added.len(),
                    "playlist imported"
                );
                if added.is_empty() {
                    return Err(ResolveError::not_found(raw));
                }
                Ok(added)
            }
        }
    }

    fn push(self: &Arc<Self>, room_id: &str, descriptor: SongDescriptor) -> TrackSummary {
        let summary = descriptor.summary();
        loop {
            let (session, created) = self.registry.get_or_create(room_id);
            if created {
                watchdog::spawn(Arc::clone(self), Arc::clone(&session), self.watchdog_interval);
            }
            match session.enqueue(descriptor.clone()) {
                Ok(position) => {
                    self.events.enqueued(room_id, summary.clone(), position);
                    return summary;
                }
                // Torn down between lookup and enqueue; the next lookup replaces it.
                Err(SessionTerminated) => continue,
            }
        }
    }

    /// Start the playback loop; a running loop is left alone.
    pub fn play(self: &Arc<Self>, room_id: &str) -> PlayOutcome {
        let Some(session) = self.registry.get(room_id) else {
            return PlayOutcome::NothingQueued;
        };
        let decision = session.start_worker(|| self.spawn_worker(&session));
        tracing::info!(room_id = %room_id, decision = ?decision, "play requested");
        match decision {
            StartDecision::Started => PlayOutcome::Started,
            StartDecision::AlreadyRunning => PlayOutcome::AlreadyPlaying,
            StartDecision::NothingQueued | StartDecision::Terminated => PlayOutcome::NothingQueued,
        }
    }

    fn spawn_worker(self: &Arc<Self>, session: &Arc<Session>) -> JoinHandle<()> {
        let jukebox = Arc::clone(self);
        let session = Arc::clone(session);
        self.spawn(async move {
            let exit = playback::run(&jukebox.playback, &session).await;
            tracing::debug!(room_id = %session.room_id(), exit = ?exit, "playback loop exited");
            if let LoopExit::TransportLost(reason) = exit {
                tracing::warn!(room_id = %session.room_id(), error = %reason, "transport lost");
                jukebox
                    .teardown(&session, StopReason::TransportLost, false)
                    .await;
            }
        })
    }

    /// Skip the current track.
    pub fn skip(&self, room_id: &str) -> SkipOutcome {
        let outcome = self
            .registry
            .get(room_id)
            .map(|session| session.skip())
            .unwrap_or(SkipOutcome::NothingPlaying);
        tracing::info!(room_id = %room_id, outcome = ?outcome, "skip requested");
        outcome
    }

    /// Tear the room's session down.
    pub async fn stop(&self, room_id: &str) -> StopOutcome {
        let Some(session) = self.registry.get(room_id) else {
            return StopOutcome::NotActive;
        };
        if self.teardown(&session, StopReason::Requested, true).await {
            StopOutcome::Stopped
        } else {
            StopOutcome::NotActive
        }
    }

    pub fn status(&self, room_id: &str) -> SessionStatus {
        match self.registry.get(room_id) {
            Some(session) => session.status(),
            None => SessionStatus {
                room_id: room_id.to_string(),
                is_playing: false,
                queue_depth: 0,
                now_playing: None,
            },
        }
    }

    /// Terminate a session: clear the queue, wait for its loop, disconnect
    /// the transport, delete the room's cache directory and unregister it.
    ///
    /// Runs at most once per session; returns `false` for later calls.
    /// `await_worker` must be `false` when called from the loop itself.
    pub(crate) async fn teardown(
        &self,
        session: &Arc<Session>,
        reason: StopReason,
        await_worker: bool,
    ) -> bool {
        if !session.terminate() {
            return false;
        }
        let room_id = session.room_id();
        tracing::info!(room_id = %room_id, reason = ?reason, "tearing down session");

        if let Some(worker) = session.take_worker() {
            if await_worker {
                if let Err(err) = worker.await {
                    tracing::warn!(room_id = %room_id, error = %err, "playback loop panicked");
                }
            }
        }
        session.transport().release().await;

        let dir = room_dir(self.playback.acquirer.cache_root(), room_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => tracing::debug!(room_id = %room_id, dir = %dir.display(), "room cache removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(room_id = %room_id, dir = %dir.display(), error = %err, "remove room cache failed")
            }
        }

        self.playback.acquirer.forget_room(room_id);
        self.presence.forget(room_id);
        self.registry.remove(session);
        self.events.stopped(room_id, reason);
        true
    }

    /// Stop every session and cancel background tasks.
    pub async fn shutdown(&self) {
        let sessions = self.registry.sessions();
        tracing::info!(sessions = sessions.len(), "stopping all sessions");
        for session in sessions {
            self.teardown(&session, StopReason::Shutdown, true).await;
        }
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jukebox_types::PlaybackEvent;

    use crate::session::SessionPhase;
    use crate::testing::{Harness, catalogue_track, video};
    use crate::transport::Checkout;

    fn abc123_harness() -> Harness {
        Harness::builder()
            .videos(|v| v.with_search("abc123", video("abc123", "Song", 1)).with_video(video("abc123", "Song", 1)))
            .build()
    }

    #[tokio::test]
    async fn direct_track_plays_to_completion() {
        let mut h = abc123_harness();
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        assert_eq!(h.jukebox.status("1").queue_depth, 1);

        assert_eq!(h.jukebox.play("1"), PlayOutcome::Started);
        let now_playing = h.wait_for(|e| matches!(e, PlaybackEvent::NowPlaying { .. })).await;
        let PlaybackEvent::NowPlaying { track, .. } = now_playing else {
            unreachable!()
        };
        assert_eq!(track.source_id, "abc123");

        h.wait_for(|e| matches!(e, PlaybackEvent::QueueEmpty { .. })).await;
        assert_eq!(h.jukebox.status("1").queue_depth, 0);
        assert!(!h.jukebox.status("1").is_playing);
        assert_eq!(h.transport.bytes(), b"pcm:https://www.youtube.com/watch?v=abc123".to_vec());
        assert_eq!(h.transport.flushes(), 1);
    }

    #[tokio::test]
    async fn playlist_enqueues_every_member_in_order_before_playing() {
        let mut h = Harness::builder()
            .videos(|v| {
                v.with_search("One by X", video("one", "One", 1))
                    .with_search("Two by X", video("two", "Two", 1))
                    .with_search("Three by X", video("three", "Three", 1))
                    .with_video(video("one", "One", 1))
                    .with_video(video("two", "Two", 1))
                    .with_video(video("three", "Three", 1))
            })
            .catalogue(|c| {
                c.with_playlist(
                    "mix",
                    vec![
                        catalogue_track("s1", "One", "X"),
                        catalogue_track("s2", "Two", "X"),
                        catalogue_track("s3", "Three", "X"),
                    ],
                )
            })
            .build();

        let added = h
            .jukebox
            .enqueue("1", "u", "https://open.spotify.com/playlist/mix")
            .await
            .unwrap();
        assert_eq!(added.len(), 3);
        h.jukebox.play("1");

        let mut enqueued = Vec::new();
        loop {
            match h.next_event().await {
                PlaybackEvent::Enqueued { track, position, .. } => enqueued.push((track.source_id, position)),
                PlaybackEvent::NowPlaying { .. } => break,
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(
            enqueued,
            vec![("s1".to_string(), 1), ("s2".to_string(), 2), ("s3".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn skip_with_nothing_playing_changes_nothing() {
        let h = abc123_harness();
        assert_eq!(h.jukebox.skip("1"), SkipOutcome::NothingPlaying);

        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        assert_eq!(h.jukebox.skip("1"), SkipOutcome::NothingPlaying);
        assert_eq!(h.jukebox.status("1").queue_depth, 1);
    }

    #[tokio::test]
    async fn timed_out_track_is_reported_and_the_next_one_plays() {
        let mut h = Harness::builder()
            .videos(|v| {
                v.with_search("slow", video("slow", "Slow", 1))
                    .with_search("fast", video("fast", "Fast", 1))
                    .with_video(video("slow", "Slow", 1))
                    .with_video(video("fast", "Fast", 1))
            })
            .downloader(|d| d.with_slow_uri("https://www.youtube.com/watch?v=slow", Duration::from_secs(10)))
            .acquisition_timeout(Duration::from_millis(50))
            .build();
        h.jukebox.enqueue("1", "u", "slow").await.unwrap();
        h.jukebox.enqueue("1", "u", "fast").await.unwrap();
        h.jukebox.play("1");

        let failed = h
            .wait_for(|e| matches!(e, PlaybackEvent::AcquisitionFailed { .. }))
            .await;
        let PlaybackEvent::AcquisitionFailed { track, reason, .. } = failed else {
            unreachable!()
        };
        assert_eq!(track.source_id, "slow");
        assert!(reason.contains("timed out"));

        let next = h.wait_for(|e| matches!(e, PlaybackEvent::NowPlaying { .. })).await;
        assert!(matches!(next, PlaybackEvent::NowPlaying { track, .. } if track.source_id == "fast"));
    }

    #[tokio::test]
    async fn second_play_is_a_no_op() {
        let mut h = abc123_harness().endless();
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        assert_eq!(h.jukebox.play("1"), PlayOutcome::Started);
        h.wait_for(|e| matches!(e, PlaybackEvent::NowPlaying { .. })).await;

        let before = h.jukebox.status("1");
        assert_eq!(h.jukebox.play("1"), PlayOutcome::AlreadyPlaying);
        assert_eq!(h.jukebox.status("1"), before);
        assert_eq!(h.transport.connects(), 1);
        h.jukebox.stop("1").await;
    }

    #[tokio::test]
    async fn skip_moves_on_and_never_replays() {
        let mut h = Harness::builder()
            .videos(|v| {
                v.with_search("first", video("first", "First", 1))
                    .with_search("second", video("second", "Second", 1))
                    .with_video(video("first", "First", 1))
                    .with_video(video("second", "Second", 1))
            })
            .build()
            .endless();
        h.jukebox.enqueue("1", "u", "first").await.unwrap();
        h.jukebox.enqueue("1", "u", "second").await.unwrap();
        h.jukebox.play("1");
        h.wait_for(|e| matches!(e, PlaybackEvent::NowPlaying { track, .. } if track.source_id == "first"))
            .await;

        assert_eq!(h.jukebox.skip("1"), SkipOutcome::Skipped);
        h.wait_for(|e| matches!(e, PlaybackEvent::NowPlaying { track, .. } if track.source_id == "second"))
            .await;
        assert_eq!(h.jukebox.status("1").queue_depth, 1);
        assert_eq!(h.transport.flushes(), 0);

        assert_eq!(h.jukebox.skip("1"), SkipOutcome::Skipped);
        h.wait_for(|e| matches!(e, PlaybackEvent::QueueEmpty { .. })).await;
        assert_eq!(h.jukebox.status("1").queue_depth, 0);
    }

    #[tokio::test]
    async fn stop_while_streaming_cleans_everything_up() {
        let mut h = abc123_harness().endless();
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        h.jukebox.play("1");
        h.wait_for(|e| matches!(e, PlaybackEvent::NowPlaying { .. })).await;
        let dir = h.cache_root().join("1");
        assert!(dir.exists());

        assert_eq!(h.jukebox.stop("1").await, StopOutcome::Stopped);
        assert_eq!(h.jukebox.status("1").queue_depth, 0);
        assert!(h.jukebox.active_rooms().is_empty());
        assert_eq!(h.transport.disconnects(), 1);
        assert!(!dir.exists());
        h.wait_for(|e| matches!(e, PlaybackEvent::Stopped { reason: StopReason::Requested, .. }))
            .await;
    }

    #[tokio::test]
    async fn stop_from_idle_clears_queue_and_registry() {
        let h = abc123_harness();
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        assert_eq!(h.jukebox.stop("1").await, StopOutcome::Stopped);
        assert_eq!(h.jukebox.status("1").queue_depth, 0);
        assert!(h.jukebox.active_rooms().is_empty());
        assert_eq!(h.transport.connects(), 0);
        assert_eq!(h.jukebox.stop("1").await, StopOutcome::NotActive);
    }

    #[tokio::test]
    async fn stop_wins_over_a_concurrent_skip() {
        let mut h = abc123_harness().endless();
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        h.jukebox.play("1");
        h.wait_for(|e| matches!(e, PlaybackEvent::NowPlaying { .. })).await;

        h.jukebox.skip("1");
        h.jukebox.stop("1").await;
        let events = h.drain_events();
        assert!(!events.iter().any(|e| matches!(e, PlaybackEvent::NowPlaying { .. })));
        assert!(events.iter().any(|e| matches!(e, PlaybackEvent::Stopped { reason: StopReason::Requested, .. })));
    }

    #[tokio::test]
    async fn connect_failure_leaves_queue_and_session_idle() {
        let mut h = abc123_harness();
        h.transport.fail_connect(true);
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        h.jukebox.play("1");
        h.wait_for(|e| matches!(e, PlaybackEvent::TransportFailed { .. })).await;
        tokio::task::yield_now().await;

        let status = h.jukebox.status("1");
        assert_eq!(status.queue_depth, 1);
        assert!(!status.is_playing);
        assert_eq!(h.jukebox.active_rooms(), vec!["1".to_string()]);

        h.transport.fail_connect(false);
        assert_eq!(h.jukebox.play("1"), PlayOutcome::Started);
        h.wait_for(|e| matches!(e, PlaybackEvent::QueueEmpty { .. })).await;
    }

    #[tokio::test]
    async fn write_failure_tears_the_session_down() {
        let mut h = abc123_harness().endless();
        h.transport.fail_writes_after(3);
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        h.jukebox.play("1");
        h.wait_for(|e| matches!(e, PlaybackEvent::Stopped { reason: StopReason::TransportLost, .. }))
            .await;
        assert!(h.jukebox.active_rooms().is_empty());
        assert_eq!(h.transport.disconnects(), 1);
    }

    #[tokio::test]
    async fn unknown_query_is_reported_without_creating_a_session() {
        let mut h = abc123_harness();
        let err = h.jukebox.enqueue("1", "u", "no such song").await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
        h.wait_for(|e| matches!(e, PlaybackEvent::ResolutionFailed { .. })).await;
        assert!(h.jukebox.active_rooms().is_empty());
        assert_eq!(h.jukebox.play("1"), PlayOutcome::NothingQueued);
    }

    #[tokio::test]
    async fn rooms_are_independent() {
        let mut h = abc123_harness().endless();
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        h.jukebox.enqueue("2", "u", "abc123").await.unwrap();
        h.jukebox.play("1");
        h.wait_for(|e| matches!(e, PlaybackEvent::NowPlaying { room_id, .. } if room_id == "1"))
            .await;

        h.jukebox.stop("1").await;
        let status = h.jukebox.status("2");
        assert_eq!(status.queue_depth, 1);
        assert_eq!(status.now_playing, None);
        assert_eq!(h.jukebox.active_rooms(), vec!["2".to_string()]);
    }

    #[tokio::test]
    async fn shutdown_stops_every_session() {
        let mut h = abc123_harness().endless();
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        h.jukebox.enqueue("2", "u", "abc123").await.unwrap();
        h.jukebox.play("1");
        h.wait_for(|e| matches!(e, PlaybackEvent::NowPlaying { .. })).await;

        h.jukebox.shutdown().await;
        assert!(h.jukebox.active_rooms().is_empty());
        let stops = h
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, PlaybackEvent::Stopped { reason: StopReason::Shutdown, .. }))
            .count();
        assert_eq!(stops, 2);
    }

    #[tokio::test]
    async fn play_waits_for_the_previous_loop_to_return_the_transport() {
        let mut h = abc123_harness();
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        h.jukebox.play("1");
        h.wait_for(|e| matches!(e, PlaybackEvent::QueueEmpty { .. })).await;

        let session = h.jukebox.registry.get("1").unwrap();
        let Checkout::Leased(held) = session.transport().checkout() else {
            panic!("transport should be free after the queue drained");
        };
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        assert_eq!(h.jukebox.play("1"), PlayOutcome::Started);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(session.is_busy());
        assert!(!h.drain_events().iter().any(|e| matches!(e, PlaybackEvent::NowPlaying { .. })));

        drop(held);
        h.wait_for(|e| matches!(e, PlaybackEvent::NowPlaying { .. })).await;
        h.wait_for(|e| matches!(e, PlaybackEvent::QueueEmpty { .. })).await;
        assert_eq!(h.jukebox.play("1"), PlayOutcome::NothingQueued);
        assert_eq!(h.transport.connects(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn replay_after_drain_restarts_every_time() {
        let mut h = abc123_harness();
        for _ in 0..30 {
            h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
            assert_eq!(h.jukebox.play("1"), PlayOutcome::Started);
            h.wait_for(|e| matches!(e, PlaybackEvent::NowPlaying { .. })).await;
            h.wait_for(|e| matches!(e, PlaybackEvent::QueueEmpty { .. })).await;
        }
        assert_eq!(h.jukebox.status("1").queue_depth, 0);
        assert_eq!(h.transport.connects(), 1);
    }

    #[tokio::test]
    async fn stopping_one_room_spares_a_track_shared_with_another() {
        let mut h = Harness::builder()
            .videos(|v| v.with_search("abc123", video("abc123", "Song", 1)).with_video(video("abc123", "Song", 1)))
            .downloader(|d| d.with_delay(Duration::from_millis(150)))
            .build();
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        h.jukebox.enqueue("2", "u", "abc123").await.unwrap();
        h.jukebox.play("1");
        h.jukebox.play("2");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.jukebox.stop("1").await, StopOutcome::Stopped);

        loop {
            match h.next_event().await {
                PlaybackEvent::NowPlaying { room_id, .. } if room_id == "2" => break,
                PlaybackEvent::AcquisitionFailed { room_id, reason, .. } => {
                    panic!("room {room_id} lost its track: {reason}")
                }
                _ => {}
            }
        }
        assert!(h.cache_root().join("2").join("abc123.mp3").exists());
        assert!(!h.cache_root().join("1").exists());
    }

    #[tokio::test]
    async fn stop_during_a_slow_download_is_honoured() {
        let mut h = Harness::builder()
            .videos(|v| v.with_search("abc123", video("abc123", "Song", 1)).with_video(video("abc123", "Song", 1)))
            .downloader(|d| d.with_delay(Duration::from_secs(10)))
            .build();
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        h.jukebox.play("1");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.jukebox.registry.get("1").unwrap().phase(), SessionPhase::Acquiring);

        let outcome = tokio::time::timeout(Duration::from_secs(1), h.jukebox.stop("1"))
            .await
            .unwrap();
        assert_eq!(outcome, StopOutcome::Stopped);
        assert!(h.jukebox.active_rooms().is_empty());
        let events = h.drain_events();
        assert!(!events.iter().any(|e| matches!(e, PlaybackEvent::NowPlaying { .. })));
        assert!(events.iter().any(|e| matches!(e, PlaybackEvent::Stopped { reason: StopReason::Requested, .. })));
    }

    #[tokio::test]
    async fn skip_during_a_slow_download_moves_on() {
        let mut h = Harness::builder()
            .videos(|v| {
                v.with_search("slow", video("slow", "Slow", 1))
                    .with_search("fast", video("fast", "Fast", 1))
                    .with_video(video("slow", "Slow", 1))
                    .with_video(video("fast", "Fast", 1))
            })
            .downloader(|d| d.with_slow_uri("https://www.youtube.com/watch?v=slow", Duration::from_secs(10)))
            .build();
        h.jukebox.enqueue("1", "u", "slow").await.unwrap();
        h.jukebox.enqueue("1", "u", "fast").await.unwrap();
        h.jukebox.play("1");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.jukebox.registry.get("1").unwrap().phase(), SessionPhase::Acquiring);

        assert_eq!(h.jukebox.skip("1"), SkipOutcome::Skipped);
        let next = h.wait_for(|e| matches!(e, PlaybackEvent::NowPlaying { .. })).await;
        assert!(matches!(next, PlaybackEvent::NowPlaying { track, .. } if track.source_id == "fast"));
    }

    #[tokio::test]
    async fn stop_is_not_held_up_by_a_stalled_flush() {
        let mut h = abc123_harness();
        h.transport.stall_flush(true);
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        h.jukebox.play("1");
        h.wait_for(|e| matches!(e, PlaybackEvent::NowPlaying { .. })).await;
        while h.transport.flushes() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let outcome = tokio::time::timeout(Duration::from_secs(1), h.jukebox.stop("1"))
            .await
            .unwrap();
        assert_eq!(outcome, StopOutcome::Stopped);
        assert!(h.jukebox.active_rooms().is_empty());
    }

    #[tokio::test]
    async fn stop_forgets_reported_presence() {
        let h = abc123_harness();
        h.jukebox.enqueue("1", "u", "abc123").await.unwrap();
        h.presence.report("1", 2);
        h.jukebox.stop("1").await;
        assert_eq!(h.presence.listeners("1"), None);
    }

    #[tokio::test]
    async fn status_of_unknown_room_is_empty() {
        let h = abc123_harness();
        let status = h.jukebox.status("nobody");
        assert_eq!(status.queue_depth, 0);
        assert!(!status.is_playing);
        assert_eq!(status.now_playing, None);
    }
}
