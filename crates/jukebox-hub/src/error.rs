//! Error taxonomy of the playback engine.
//!
//! Per-track failures never escape the playback loop; they are turned into
//! events. Only transport failures and explicit stops end a session.

use thiserror::Error;

/// Failure turning a raw query into a playable descriptor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// Nothing matched; a user-facing "could not find".
    #[error("no results for {query:?}")]
    NotFound { query: String },
    /// The external API could not be reached or answered garbage.
    #[error("lookup failed: {0}")]
    Transport(String),
}

impl ResolveError {
    pub fn not_found(query: impl Into<String>) -> Self {
        ResolveError::NotFound {
            query: query.into(),
        }
    }
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        ResolveError::Transport(err.to_string())
    }
}

/// Failure turning a descriptor into a local audio file.
///
/// Cloneable so every waiter of a shared in-flight download sees the same result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AcquireError {
    #[error("download of {source_id} timed out after {secs}s")]
    Timeout { source_id: String, secs: u64 },
    #[error("{source_id} is unavailable, removed or region-locked")]
    Unavailable { source_id: String },
    #[error("download of {source_id} failed: {reason}")]
    Failed { source_id: String, reason: String },
}

/// Failure of the live audio sink.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport connect failed: {0}")]
    Connect(String),
    #[error("transport write failed: {0}")]
    Write(#[source] std::io::Error),
}

/// Failure starting the PCM transcoder for a local file.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("spawn {program} failed: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transcoder produced no output pipe")]
    NoOutput,
    #[error("audio file missing: {0}")]
    MissingInput(String),
}
