//! Local audio file to raw PCM conversion.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{Child, Command};

use crate::config::PlaybackSettings;
use crate::error::TranscodeError;

/// Readable stream of s16le PCM frames.
///
/// Owns the producing process, if any; dropping the stream kills it.
pub struct PcmStream {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    _child: Option<Child>,
}

impl PcmStream {
    #[cfg(test)]
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            _child: None,
        }
    }

    fn from_child(mut child: Child) -> Result<Self, TranscodeError> {
        let stdout = child.stdout.take().ok_or(TranscodeError::NoOutput)?;
        Ok(Self {
            reader: Box::new(stdout),
            _child: Some(child),
        })
    }
}

impl AsyncRead for PcmStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

pub trait Transcoder: Send + Sync {
    fn open(&self, path: &Path) -> Result<PcmStream, TranscodeError>;
}

/// `ffmpeg` based transcoder writing PCM to its stdout.
pub struct FfmpegTranscoder {
    settings: PlaybackSettings,
}

impl FfmpegTranscoder {
    pub fn new(settings: PlaybackSettings) -> Self {
        Self { settings }
    }

    fn args(&self, path: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "panic".to_string(),
            "-nostdin".to_string(),
            "-i".to_string(),
            path.to_string_lossy().into_owned(),
            "-vn".to_string(),
            "-ac".to_string(),
            self.settings.channels.to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "-ar".to_string(),
            self.settings.sample_rate.to_string(),
            "pipe:1".to_string(),
        ]
    }
}

impl Transcoder for FfmpegTranscoder {
    fn open(&self, path: &Path) -> Result<PcmStream, TranscodeError> {
        if !path.is_file() {
            return Err(TranscodeError::MissingInput(path.display().to_string()));
        }
        let child = Command::new(&self.settings.ffmpeg)
            .args(self.args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                program: self.settings.ffmpeg.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "transcoder started");
        PcmStream::from_child(child)
    }
}
