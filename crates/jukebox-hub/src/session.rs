//! Per-room playback session state.
//!
//! Queue, phase and worker bookkeeping share one short-lived std mutex so that
//! enqueue, play and the loop deciding to go idle cannot interleave badly. The
//! mutex is never held across an await.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use jukebox_types::{SessionStatus, SkipOutcome};

use crate::models::SongDescriptor;
use crate::transport::TransportSlot;

/// Playback loop state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Acquiring,
    Streaming,
    Advancing,
    /// Torn down; absorbing.
    Terminated,
}

/// Result of asking a session to start its playback loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDecision {
    Started,
    AlreadyRunning,
    NothingQueued,
    Terminated,
}

/// What the loop should do next.
#[derive(Debug)]
pub enum NextTrack {
    Track {
        descriptor: SongDescriptor,
        /// Cancelled by skip, or by stop through the session scope.
        scope: CancellationToken,
    },
    /// Queue empty; the loop is still active until it calls [`Session::park`].
    Drained,
    Terminated,
}

/// The session was torn down before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTerminated;

struct SessionState {
    phase: SessionPhase,
    queue: VecDeque<SongDescriptor>,
    current: Option<SongDescriptor>,
    track_scope: Option<CancellationToken>,
    worker: Option<JoinHandle<()>>,
    worker_active: bool,
    last_activity: Instant,
}

pub struct Session {
    room_id: String,
    scope: CancellationToken,
    state: Mutex<SessionState>,
    transport: Arc<TransportSlot>,
}

impl Session {
    /// Create a session whose scope is a child of `parent`.
    pub fn new(room_id: impl Into<String>, parent: &CancellationToken) -> Self {
        Self {
            room_id: room_id.into(),
            scope: parent.child_token(),
            state: Mutex::new(SessionState {
                phase: SessionPhase::Idle,
                queue: VecDeque::new(),
                current: None,
                track_scope: None,
                worker: None,
                worker_active: false,
                last_activity: Instant::now(),
            }),
            transport: Arc::new(TransportSlot::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Session-wide cancellation scope; cancelled by stop.
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    pub fn transport(&self) -> &Arc<TransportSlot> {
        &self.transport
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    pub fn is_terminated(&self) -> bool {
        self.phase() == SessionPhase::Terminated
    }

    /// True while a playback loop is running for this session.
    pub fn is_busy(&self) -> bool {
        self.lock().worker_active
    }

    /// Append to the queue; returns the 1-based position counting the
    /// current track.
    pub fn enqueue(&self, descriptor: SongDescriptor) -> Result<usize, SessionTerminated> {
        let mut state = self.lock();
        if state.phase == SessionPhase::Terminated {
            return Err(SessionTerminated);
        }
        state.queue.push_back(descriptor);
        state.last_activity = Instant::now();
        Ok(state.queue.len() + usize::from(state.current.is_some()))
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.lock();
        SessionStatus {
            room_id: self.room_id.clone(),
            is_playing: state.phase == SessionPhase::Streaming,
            queue_depth: state.queue.len() + usize::from(state.current.is_some()),
            now_playing: state.current.as_ref().map(SongDescriptor::summary),
        }
    }

    /// Start the playback loop unless one is running or there is nothing to play.
    ///
    /// `spawn` runs under the session lock so the stored handle always
    /// belongs to the active loop.
    pub fn start_worker(&self, spawn: impl FnOnce() -> JoinHandle<()>) -> StartDecision {
        let mut state = self.lock();
        if state.phase == SessionPhase::Terminated {
            return StartDecision::Terminated;
        }
        if state.worker_active {
            return StartDecision::AlreadyRunning;
        }
        if state.queue.is_empty() {
            return StartDecision::NothingQueued;
        }
        state.worker_active = true;
        state.worker = Some(spawn());
        StartDecision::Started
    }

    /// Dequeue the next track and open a fresh track scope for it.
    pub fn begin_next(&self) -> NextTrack {
        let mut state = self.lock();
        if state.phase == SessionPhase::Terminated || self.scope.is_cancelled() {
            return NextTrack::Terminated;
        }
        let Some(descriptor) = state.queue.pop_front() else {
            state.phase = SessionPhase::Idle;
            state.current = None;
            state.track_scope = None;
            return NextTrack::Drained;
        };
        let scope = self.scope.child_token();
        state.current = Some(descriptor.clone());
        state.track_scope = Some(scope.clone());
        state.phase = SessionPhase::Acquiring;
        state.last_activity = Instant::now();
        NextTrack::Track { descriptor, scope }
    }

    pub fn mark_streaming(&self) {
        let mut state = self.lock();
        if state.phase != SessionPhase::Terminated {
            state.phase = SessionPhase::Streaming;
            state.last_activity = Instant::now();
        }
    }

    /// Record that a chunk reached the transport.
    pub fn touch(&self) {
        self.lock().last_activity = Instant::now();
    }

    /// Leave Streaming for Advancing.
    pub fn mark_advancing(&self) {
        let mut state = self.lock();
        if state.phase != SessionPhase::Terminated {
            state.phase = SessionPhase::Advancing;
        }
    }

    /// Done with the current track; it no longer counts towards the depth.
    pub fn finish_track(&self) {
        let mut state = self.lock();
        state.current = None;
        state.track_scope = None;
        state.last_activity = Instant::now();
    }

    /// Mark a drained loop inactive so the next `play` can start a new one.
    ///
    /// Must be called after the loop has handed its transport back. Returns
    /// `false` when tracks were queued since the drain; the loop carries on.
    pub fn park(&self) -> bool {
        let mut state = self.lock();
        if state.phase != SessionPhase::Terminated && !state.queue.is_empty() {
            return false;
        }
        state.worker_active = false;
        true
    }

    /// The loop gave up before dequeuing anything.
    pub fn worker_exited(&self) {
        let mut state = self.lock();
        state.worker_active = false;
        state.worker = None;
        if state.phase != SessionPhase::Terminated {
            state.phase = SessionPhase::Idle;
        }
    }

    /// Cancel the current track only.
    pub fn skip(&self) -> SkipOutcome {
        let state = self.lock();
        match (&state.current, &state.track_scope) {
            (Some(_), Some(scope)) if state.phase != SessionPhase::Terminated => {
                scope.cancel();
                SkipOutcome::Skipped
            }
            _ => SkipOutcome::NothingPlaying,
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.lock().last_activity.elapsed()
    }

    /// Mark the session terminated, clear the queue and cancel every scope.
    ///
    /// Returns `false` when it was already terminated.
    pub fn terminate(&self) -> bool {
        let mut state = self.lock();
        if state.phase == SessionPhase::Terminated {
            return false;
        }
        state.phase = SessionPhase::Terminated;
        state.queue.clear();
        state.current = None;
        state.track_scope = None;
        state.worker_active = false;
        self.scope.cancel();
        true
    }

    pub fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.lock().worker.take()
    }
}
