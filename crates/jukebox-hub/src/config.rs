//! Configuration loading and parsing.
//!
//! Defines the hub config schema and resolves defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_BIND: &str = "127.0.0.1:8090";
const DEFAULT_CACHE_DIR: &str = "cache";
const DEFAULT_MAX_CONCURRENT: usize = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_WATCHDOG_SECS: u64 = 120;
const DEFAULT_HOUSEKEEPING_SECS: u64 = 3600;
const DEFAULT_CHUNK_BYTES: usize = 81920;

/// Top-level hub configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct HubConfig {
    /// Bind address (host:port) of the command API.
    pub bind: Option<String>,
    /// Root of the per-room cache directories.
    pub cache_dir: Option<String>,
    /// Primary audio platform settings.
    pub youtube: Option<YoutubeConfig>,
    /// Catalogue platform settings.
    pub spotify: Option<SpotifyConfig>,
    /// Download pipeline settings.
    pub acquisition: Option<AcquisitionConfig>,
    /// PCM streaming settings.
    pub playback: Option<PlaybackConfig>,
    /// Idle watchdog settings.
    pub watchdog: Option<WatchdogConfig>,
    /// Cache sweep settings.
    pub housekeeping: Option<HousekeepingConfig>,
    /// Audio sink settings.
    pub transport: Option<TransportConfig>,
}

/// YouTube Data API configuration.
#[derive(Debug, Deserialize)]
pub struct YoutubeConfig {
    pub api_key: Option<String>,
    /// Optional base URL override (defaults to https://www.googleapis.com/youtube/v3).
    pub base_url: Option<String>,
}

/// Spotify Web API configuration (client credentials flow).
#[derive(Debug, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base_url: Option<String>,
    pub token_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AcquisitionConfig {
    /// Process-wide cap on simultaneous downloads.
    pub max_concurrent: Option<usize>,
    /// Hard download timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Download-and-transcode executable (default `yt-dlp`).
    pub tool: Option<String>,
    /// Audio format requested from the tool; also the artifact extension.
    pub audio_format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaybackConfig {
    /// PCM transcoder executable (default `ffmpeg`).
    pub ffmpeg: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    /// Bytes per streamed chunk.
    pub chunk_bytes: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct WatchdogConfig {
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct HousekeepingConfig {
    /// Sweep period in seconds; `0` disables the sweep.
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct TransportConfig {
    /// `tcp`, `command` or `null`.
    pub kind: Option<String>,
    /// TCP sink address for `tcp`.
    pub addr: Option<String>,
    /// Sink executable for `command`.
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
}

/// Resolved acquisition settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionSettings {
    pub max_concurrent: usize,
    pub timeout: Duration,
    pub tool: String,
    pub audio_format: String,
}

/// Resolved PCM output settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSettings {
    pub ffmpeg: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_bytes: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            sample_rate: 48_000,
            channels: 2,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }
}

/// Resolved catalogue credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: String,
    pub api_base_url: Option<String>,
    pub token_url: Option<String>,
}

/// Resolved transport selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSettings {
    Tcp { addr: SocketAddr },
    Command { program: String, args: Vec<String> },
    Null,
}

impl HubConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<HubConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Parse the bind address, falling back to the default.
pub fn bind_from_config(cfg: &HubConfig) -> Result<SocketAddr> {
    let bind = cfg.bind.as_deref().unwrap_or(DEFAULT_BIND);
    bind.parse().with_context(|| format!("parse bind {bind}"))
}

/// Extract the cache root directory.
pub fn cache_dir_from_config(cfg: &HubConfig) -> PathBuf {
    cfg.cache_dir
        .as_deref()
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR))
}

/// Extract the YouTube API key, which is required for any resolution.
pub fn youtube_api_key_from_config(cfg: &HubConfig) -> Result<String> {
    cfg.youtube
        .as_ref()
        .and_then(|yt| yt.api_key.as_deref())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("youtube.api_key is required in config"))
}

/// Catalogue credentials, or `None` when catalogue links are disabled.
pub fn spotify_settings(cfg: &HubConfig) -> Option<SpotifySettings> {
    let spotify = cfg.spotify.as_ref()?;
    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    Some(SpotifySettings {
        client_id: non_empty(&spotify.client_id)?,
        client_secret: non_empty(&spotify.client_secret)?,
        api_base_url: spotify.api_base_url.clone(),
        token_url: spotify.token_url.clone(),
    })
}

pub fn acquisition_settings(cfg: &HubConfig) -> Result<AcquisitionSettings> {
    let acq = cfg.acquisition.as_ref();
    let max_concurrent = acq
        .and_then(|a| a.max_concurrent)
        .unwrap_or(DEFAULT_MAX_CONCURRENT);
    if max_concurrent == 0 {
        return Err(anyhow::anyhow!("acquisition.max_concurrent must be at least 1"));
    }
    let timeout_secs = acq
        .and_then(|a| a.timeout_secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
        .max(1);
    Ok(AcquisitionSettings {
        max_concurrent,
        timeout: Duration::from_secs(timeout_secs),
        tool: acq
            .and_then(|a| a.tool.clone())
            .unwrap_or_else(|| "yt-dlp".to_string()),
        audio_format: acq
            .and_then(|a| a.audio_format.clone())
            .unwrap_or_else(|| "mp3".to_string()),
    })
}

pub fn playback_settings(cfg: &HubConfig) -> Result<PlaybackSettings> {
    let defaults = PlaybackSettings::default();
    let Some(pb) = cfg.playback.as_ref() else {
        return Ok(defaults);
    };
    let chunk_bytes = pb.chunk_bytes.unwrap_or(defaults.chunk_bytes);
    if chunk_bytes == 0 {
        return Err(anyhow::anyhow!("playback.chunk_bytes must be positive"));
    }
    Ok(PlaybackSettings {
        ffmpeg: pb.ffmpeg.clone().unwrap_or(defaults.ffmpeg),
        sample_rate: pb.sample_rate.unwrap_or(defaults.sample_rate),
        channels: pb.channels.unwrap_or(defaults.channels),
        chunk_bytes,
    })
}

pub fn watchdog_interval(cfg: &HubConfig) -> Duration {
    let secs = cfg
        .watchdog
        .as_ref()
        .and_then(|w| w.interval_secs)
        .unwrap_or(DEFAULT_WATCHDOG_SECS)
        .max(1);
    Duration::from_secs(secs)
}

/// Housekeeping period, or `None` when disabled.
pub fn housekeeping_interval(cfg: &HubConfig) -> Option<Duration> {
    let secs = cfg
        .housekeeping
        .as_ref()
        .and_then(|h| h.interval_secs)
        .unwrap_or(DEFAULT_HOUSEKEEPING_SECS);
    (secs > 0).then(|| Duration::from_secs(secs))
}

pub fn transport_settings(cfg: &HubConfig) -> Result<TransportSettings> {
    let Some(transport) = cfg.transport.as_ref() else {
        return Ok(TransportSettings::Null);
    };
    match transport.kind.as_deref().unwrap_or("null") {
        "null" => Ok(TransportSettings::Null),
        "tcp" => {
            let addr = transport
                .addr
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("transport.addr is required for tcp"))?;
            let addr = addr
                .parse()
                .with_context(|| format!("parse transport addr {addr}"))?;
            Ok(TransportSettings::Tcp { addr })
        }
        "command" => {
            let program = transport
                .program
                .clone()
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("transport.program is required for command"))?;
            Ok(TransportSettings::Command {
                program,
                args: transport.args.clone().unwrap_or_default(),
            })
        }
        other => Err(anyhow::anyhow!("unknown transport kind {other}")),
    }
}
