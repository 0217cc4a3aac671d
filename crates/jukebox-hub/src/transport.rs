//! Live audio sinks and the per-session transport slot.
//!
//! A [`Transport`] opens one [`TransportHandle`] per room. The handle is owned
//! by the session's [`TransportSlot`], connected lazily on the first track and
//! reused for every following one. The playback loop borrows it through a
//! [`TransportLease`]; teardown releases it exactly once.

use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Notify;

use crate::config::{PlaybackSettings, TransportSettings};
use crate::error::TransportError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, room_id: &str) -> Result<Box<dyn TransportHandle>, TransportError>;
}

#[async_trait]
pub trait TransportHandle: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError>;
    async fn flush(&mut self) -> Result<(), TransportError>;
    async fn disconnect(self: Box<Self>);
}

/// Build the configured transport.
pub fn transport_from_settings(
    settings: &TransportSettings,
    playback: &PlaybackSettings,
) -> Arc<dyn Transport> {
    match settings {
        TransportSettings::Tcp { addr } => Arc::new(TcpTransport {
            addr: *addr,
            sample_rate: playback.sample_rate,
            channels: playback.channels,
        }),
        TransportSettings::Command { program, args } => Arc::new(CommandTransport {
            program: program.clone(),
            args: args.clone(),
        }),
        TransportSettings::Null => Arc::new(NullTransport),
    }
}

/// One TCP connection per room to a PCM sink.
pub struct TcpTransport {
    addr: SocketAddr,
    sample_rate: u32,
    channels: u16,
}

struct TcpHandle {
    stream: TcpStream,
}

/// Header line sent once per connection before raw frames.
fn room_header(room_id: &str, sample_rate: u32, channels: u16) -> String {
    format!("ROOM {room_id} {sample_rate} {channels}\n")
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, room_id: &str) -> Result<Box<dyn TransportHandle>, TransportError> {
        let mut stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(self.addr))
            .await
            .map_err(|_| TransportError::Connect(format!("connect {} timed out", self.addr)))?
            .map_err(|err| TransportError::Connect(format!("connect {}: {err}", self.addr)))?;
        stream.set_nodelay(true).ok();
        stream
            .write_all(room_header(room_id, self.sample_rate, self.channels).as_bytes())
            .await
            .map_err(|err| TransportError::Connect(format!("write header: {err}")))?;
        tracing::info!(room_id = %room_id, addr = %self.addr, "transport connected");
        Ok(Box::new(TcpHandle { stream }))
    }
}

#[async_trait]
impl TransportHandle for TcpHandle {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(chunk).await.map_err(TransportError::Write)
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        self.stream.flush().await.map_err(TransportError::Write)
    }

    async fn disconnect(mut self: Box<Self>) {
        let _ = self.stream.shutdown().await;
    }
}

/// Sink process per room, fed PCM on stdin.
pub struct CommandTransport {
    program: String,
    args: Vec<String>,
}

struct CommandHandle {
    child: Child,
    stdin: Option<ChildStdin>,
}

#[async_trait]
impl Transport for CommandTransport {
    async fn connect(&self, room_id: &str) -> Result<Box<dyn TransportHandle>, TransportError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("JUKEBOX_ROOM_ID", room_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| TransportError::Connect(format!("spawn {}: {err}", self.program)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Connect("sink has no stdin".to_string()))?;
        tracing::info!(room_id = %room_id, program = %self.program, "transport sink started");
        Ok(Box::new(CommandHandle {
            child,
            stdin: Some(stdin),
        }))
    }
}

impl CommandHandle {
    fn stdin(&mut self) -> Result<&mut ChildStdin, TransportError> {
        self.stdin.as_mut().ok_or_else(|| {
            TransportError::Write(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "sink stdin closed",
            ))
        })
    }
}

#[async_trait]
impl TransportHandle for CommandHandle {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        self.stdin()?.write_all(chunk).await.map_err(TransportError::Write)
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        self.stdin()?.flush().await.map_err(TransportError::Write)
    }

    async fn disconnect(mut self: Box<Self>) {
        drop(self.stdin.take());
        let _ = self.child.kill().await;
    }
}

/// Discards audio.
pub struct NullTransport;

struct NullHandle {
    room_id: String,
    bytes: u64,
}

#[async_trait]
impl Transport for NullTransport {
    async fn connect(&self, room_id: &str) -> Result<Box<dyn TransportHandle>, TransportError> {
        Ok(Box::new(NullHandle {
            room_id: room_id.to_string(),
            bytes: 0,
        }))
    }
}

#[async_trait]
impl TransportHandle for NullHandle {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(self: Box<Self>) {
        tracing::debug!(room_id = %self.room_id, bytes = self.bytes, "null transport closed");
    }
}

#[derive(Default)]
struct SlotState {
    handle: Option<Box<dyn TransportHandle>>,
    leased: bool,
    released: bool,
}

/// What a loop finds when it asks for the session's transport.
pub enum Checkout {
    Leased(TransportLease),
    /// Still out on lease to a loop that is finishing.
    Busy,
    /// Nothing connected yet.
    Vacant,
    Released,
}

/// Session-owned holder of the lazily connected transport handle.
#[derive(Default)]
pub struct TransportSlot {
    state: Mutex<SlotState>,
    returned: Notify,
}

impl TransportSlot {
    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Borrow the connected handle if it is free.
    pub fn checkout(self: &Arc<Self>) -> Checkout {
        let mut state = self.lock();
        if state.released {
            return Checkout::Released;
        }
        if state.leased {
            return Checkout::Busy;
        }
        match state.handle.take() {
            Some(handle) => {
                state.leased = true;
                Checkout::Leased(TransportLease {
                    slot: Arc::clone(self),
                    handle: Some(handle),
                })
            }
            None => Checkout::Vacant,
        }
    }

    /// Resolves once a lease has ended since the last wake-up.
    pub async fn returned(&self) {
        self.returned.notified().await;
    }

    /// Store a freshly connected handle and lease it.
    ///
    /// Hands the handle back when the slot was already released or is in
    /// use; the caller must disconnect it.
    pub fn install(
        self: &Arc<Self>,
        handle: Box<dyn TransportHandle>,
    ) -> Result<TransportLease, Box<dyn TransportHandle>> {
        let mut state = self.lock();
        if state.released || state.leased || state.handle.is_some() {
            return Err(handle);
        }
        state.leased = true;
        Ok(TransportLease {
            slot: Arc::clone(self),
            handle: Some(handle),
        })
    }

    /// Disconnect the stored handle; later calls and leases are no-ops.
    ///
    /// A handle still out on lease is dropped when the lease ends.
    pub async fn release(&self) {
        let handle = {
            let mut state = self.lock();
            if state.released {
                return;
            }
            state.released = true;
            state.handle.take()
        };
        self.returned.notify_one();
        if let Some(handle) = handle {
            handle.disconnect().await;
        }
    }
}

/// Exclusive borrow of a session's transport handle.
///
/// Dropping the lease returns the handle to its slot.
pub struct TransportLease {
    slot: Arc<TransportSlot>,
    handle: Option<Box<dyn TransportHandle>>,
}

impl TransportLease {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        match self.handle.as_mut() {
            Some(handle) => handle.write_chunk(chunk).await,
            None => Err(TransportError::Connect("transport lease is empty".to_string())),
        }
    }

    pub async fn flush(&mut self) -> Result<(), TransportError> {
        match self.handle.as_mut() {
            Some(handle) => handle.flush().await,
            None => Ok(()),
        }
    }

    /// Disconnect a broken handle instead of returning it.
    pub async fn discard(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.disconnect().await;
        }
    }
}

impl Drop for TransportLease {
    fn drop(&mut self) {
        {
            let mut state = self.slot.lock();
            state.leased = false;
            if let Some(handle) = self.handle.take() {
                if !state.released {
                    state.handle = Some(handle);
                }
            }
        }
        self.slot.returned.notify_one();
    }
}
