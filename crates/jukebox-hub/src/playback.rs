//! Per-session playback loop.
//!
//! Idle -> Acquiring -> Streaming -> Advancing -> (Acquiring | Idle), with
//! Terminated reachable from anywhere through the session scope. Every
//! suspension point races against the track scope; the session scope is
//! checked first so a stop always wins over a concurrent skip.

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::acquisition::Acquirer;
use crate::events::EventBus;
use crate::models::SongDescriptor;
use crate::session::{NextTrack, Session};
use crate::transcode::{PcmStream, Transcoder};
use crate::transport::{Checkout, Transport, TransportLease};

/// Shared collaborators of every playback loop.
pub struct PlaybackContext {
    pub acquirer: Arc<Acquirer>,
    pub transcoder: Arc<dyn Transcoder>,
    pub transport: Arc<dyn Transport>,
    pub events: EventBus,
    pub chunk_bytes: usize,
}

/// Why a loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// Queue drained; the session is Idle.
    Drained,
    /// Stop or shutdown cancelled the session scope.
    Cancelled,
    /// The transport could not be connected; the queue is untouched.
    ConnectFailed,
    /// A write failed mid-stream; the session must be torn down.
    TransportLost(String),
}

#[derive(Debug)]
enum TrackEnd {
    Finished,
    Skipped,
    Failed,
    Stopped,
    TransportLost(String),
}

/// Run the loop until the queue drains, the session is stopped or the
/// transport breaks.
pub async fn run(ctx: &PlaybackContext, session: &Arc<Session>) -> LoopExit {
    let room_id = session.room_id().to_string();
    let mut played = 0usize;
    loop {
        let mut lease = match open_transport(ctx, session).await {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                session.worker_exited();
                return LoopExit::Cancelled;
            }
            Err(reason) => {
                tracing::warn!(room_id = %room_id, error = %reason, "transport connect failed");
                session.worker_exited();
                ctx.events.transport_failed(&room_id, reason);
                return LoopExit::ConnectFailed;
            }
        };

        loop {
            let (descriptor, track_scope) = match session.begin_next() {
                NextTrack::Track { descriptor, scope } => (descriptor, scope),
                NextTrack::Drained => break,
                NextTrack::Terminated => return LoopExit::Cancelled,
            };
            played += 1;

            let end = play_track(ctx, session, &mut lease, &descriptor, &track_scope).await;
            tracing::debug!(room_id = %room_id, source_id = %descriptor.source_id, end = ?end, "track ended");
            match end {
                TrackEnd::Finished | TrackEnd::Skipped | TrackEnd::Failed => session.finish_track(),
                TrackEnd::Stopped => return LoopExit::Cancelled,
                TrackEnd::TransportLost(reason) => {
                    lease.discard().await;
                    return LoopExit::TransportLost(reason);
                }
            }
        }

        // The next loop may only start once the transport is back in the slot.
        drop(lease);
        if session.park() {
            if played > 0 {
                ctx.events.queue_empty(&room_id);
            }
            tracing::info!(room_id = %room_id, played, "playback idle");
            return LoopExit::Drained;
        }
        tracing::debug!(room_id = %room_id, "tracks queued while draining; continuing");
    }
}

/// Reuse the session's connected transport or connect it now.
///
/// Waits while a finishing loop still holds the lease. `Ok(None)` when the
/// session was stopped meanwhile.
async fn open_transport(
    ctx: &PlaybackContext,
    session: &Arc<Session>,
) -> Result<Option<TransportLease>, String> {
    let slot = session.transport();
    loop {
        match slot.checkout() {
            Checkout::Leased(lease) => return Ok(Some(lease)),
            Checkout::Released => return Ok(None),
            Checkout::Vacant => break,
            Checkout::Busy => {
                tracing::debug!(room_id = %session.room_id(), "transport still leased; waiting");
                tokio::select! {
                    biased;
                    _ = session.scope().cancelled() => return Ok(None),
                    _ = slot.returned() => {}
                }
            }
        }
    }
    let handle = tokio::select! {
        biased;
        _ = session.scope().cancelled() => return Ok(None),
        connected = ctx.transport.connect(session.room_id()) => connected.map_err(|err| err.to_string())?,
    };
    match slot.install(handle) {
        Ok(lease) => Ok(Some(lease)),
        Err(handle) => {
            handle.disconnect().await;
            Ok(None)
        }
    }
}

async fn play_track(
    ctx: &PlaybackContext,
    session: &Arc<Session>,
    lease: &mut TransportLease,
    descriptor: &SongDescriptor,
    track_scope: &CancellationToken,
) -> TrackEnd {
    let room_id = session.room_id();
    tracing::info!(room_id = %room_id, source_id = %descriptor.source_id, title = %descriptor.title, "acquiring");

    let acquired = tokio::select! {
        biased;
        _ = session.scope().cancelled() => return TrackEnd::Stopped,
        _ = track_scope.cancelled() => return TrackEnd::Skipped,
        acquired = ctx.acquirer.acquire(room_id, descriptor) => acquired,
    };
    let path = match acquired {
        Ok(path) => path,
        Err(err) => {
            ctx.events
                .acquisition_failed(room_id, descriptor.summary(), err.to_string());
            return TrackEnd::Failed;
        }
    };
    let mut pcm = match ctx.transcoder.open(&path) {
        Ok(pcm) => pcm,
        Err(err) => {
            tracing::warn!(room_id = %room_id, path = %path.display(), error = %err, "transcoder failed to start");
            ctx.events
                .acquisition_failed(room_id, descriptor.summary(), err.to_string());
            return TrackEnd::Failed;
        }
    };

    if let Some(end) = cancelled(session, track_scope) {
        return end;
    }
    session.mark_streaming();
    ctx.events.now_playing(room_id, descriptor.summary());
    tracing::info!(room_id = %room_id, source_id = %descriptor.source_id, "streaming");

    let end = pump(ctx, session, lease, &mut pcm, track_scope).await;
    session.mark_advancing();
    end
}

/// Copy PCM chunks to the transport until the stream ends or the track is
/// cancelled. Only a natural end flushes the transport.
async fn pump(
    ctx: &PlaybackContext,
    session: &Arc<Session>,
    lease: &mut TransportLease,
    pcm: &mut PcmStream,
    track_scope: &CancellationToken,
) -> TrackEnd {
    let mut buf = vec![0u8; ctx.chunk_bytes];
    loop {
        if let Some(end) = cancelled(session, track_scope) {
            return end;
        }
        let read = tokio::select! {
            biased;
            _ = track_scope.cancelled() => return cancel_end(session),
            read = pcm.read(&mut buf) => read,
        };
        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(room_id = %session.room_id(), error = %err, "pcm read failed; ending track");
                break;
            }
        };
        let written = tokio::select! {
            biased;
            _ = track_scope.cancelled() => return cancel_end(session),
            written = lease.write_chunk(&buf[..n]) => written,
        };
        if let Err(err) = written {
            return TrackEnd::TransportLost(err.to_string());
        }
        session.touch();
    }
    let flushed = tokio::select! {
        biased;
        _ = track_scope.cancelled() => return cancel_end(session),
        flushed = lease.flush() => flushed,
    };
    match flushed {
        Ok(()) => TrackEnd::Finished,
        Err(err) => TrackEnd::TransportLost(err.to_string()),
    }
}

fn cancelled(session: &Session, track_scope: &CancellationToken) -> Option<TrackEnd> {
    track_scope.is_cancelled().then(|| cancel_end(session))
}

fn cancel_end(session: &Session) -> TrackEnd {
    if session.scope().is_cancelled() {
        TrackEnd::Stopped
    } else {
        TrackEnd::Skipped
    }
}
