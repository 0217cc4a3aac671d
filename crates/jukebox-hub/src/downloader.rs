//! External download-and-transcode tool.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tokio::process::Command;

/// Fetches remote audio into a local file.
///
/// Implementations must not leave a complete-looking file behind on failure;
/// the caller treats any non-empty file at `target` as a finished artifact.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, uri: &str, target: &Path) -> Result<()>;
}

/// `yt-dlp` driven downloader extracting audio in a fixed format.
pub struct YtDlpDownloader {
    tool: String,
    audio_format: String,
}

impl YtDlpDownloader {
    pub fn new(tool: String, audio_format: String) -> Self {
        Self { tool, audio_format }
    }

    fn args(&self, uri: &str, target: &Path) -> Vec<String> {
        let template = target.with_extension("%(ext)s");
        vec![
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            self.audio_format.clone(),
            "--audio-quality".to_string(),
            "5".to_string(),
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--no-warnings".to_string(),
            "--quiet".to_string(),
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
            uri.to_string(),
        ]
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn download(&self, uri: &str, target: &Path) -> Result<()> {
        let output = Command::new(&self.tool)
            .args(self.args(uri, target))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawn {}", self.tool))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(anyhow!("{} exited with {}: {}", self.tool, output.status, last_line.trim()));
        }
        Ok(())
    }
}
