//! Primary audio platform client (YouTube Data API v3).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::ResolveError;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Music video category on the primary platform.
const MUSIC_CATEGORY_ID: &str = "10";

/// Metadata of one video on the primary platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub channel: Option<String>,
    pub duration: Option<Duration>,
}

/// Lookup surface of the primary audio platform.
#[async_trait]
pub trait VideoPlatform: Send + Sync {
    /// Best match for a free-text query, `None` when nothing matched.
    async fn search_top(&self, query: &str) -> Result<Option<VideoInfo>, ResolveError>;
    /// Metadata of a known video id, `None` when it does not exist (anymore).
    async fn video(&self, video_id: &str) -> Result<Option<VideoInfo>, ResolveError>;
}

pub struct YoutubeClient {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: Option<VideoSnippet>,
    content_details: Option<ContentDetails>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    channel_title: Option<String>,
}

#[derive(Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

impl YoutubeClient {
    pub fn new(http: Client, base_url: Option<String>, api_key: String) -> Self {
        let base_url = base_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn get_list<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>, ResolveError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?;
        let list = resp.json::<ListResponse<T>>().await?;
        Ok(list.items)
    }
}

#[async_trait]
impl VideoPlatform for YoutubeClient {
    async fn search_top(&self, query: &str) -> Result<Option<VideoInfo>, ResolveError> {
        let items = self
            .get_list::<SearchItem>(
                "search",
                &[
                    ("part", "snippet"),
                    ("type", "video"),
                    ("videoCategoryId", MUSIC_CATEGORY_ID),
                    ("maxResults", "1"),
                    ("q", query),
                ],
            )
            .await?;
        let Some(video_id) = items.into_iter().find_map(|item| item.id.video_id) else {
            tracing::debug!(query = %query, "search returned no videos");
            return Ok(None);
        };
        // Search snippets carry HTML-escaped titles and no duration.
        self.video(&video_id).await
    }

    async fn video(&self, video_id: &str) -> Result<Option<VideoInfo>, ResolveError> {
        let items = self
            .get_list::<VideoItem>(
                "videos",
                &[("part", "snippet,contentDetails"), ("id", video_id)],
            )
            .await?;
        Ok(items.into_iter().next().map(video_info))
    }
}

fn video_info(item: VideoItem) -> VideoInfo {
    let (title, channel) = match item.snippet {
        Some(snippet) => (snippet.title, snippet.channel_title),
        None => (item.id.clone(), None),
    };
    let duration = item
        .content_details
        .and_then(|details| details.duration)
        .and_then(|raw| parse_iso8601_duration(&raw));
    VideoInfo {
        id: item.id,
        title,
        channel,
        duration,
    }
}

/// Parse an ISO-8601 duration such as `PT1H2M3S` or `P0D`.
pub fn parse_iso8601_duration(raw: &str) -> Option<Duration> {
    let rest = raw.trim().strip_prefix('P')?;
    let (date, time) = match rest.split_once('T') {
        Some((date, time)) => (date, time),
        None => (rest, ""),
    };
    let mut secs: u64 = 0;
    let mut consume = |part: &str, units: &[(char, u64)]| -> Option<()> {
        let mut number = String::new();
        for ch in part.chars() {
            if ch.is_ascii_digit() {
                number.push(ch);
                continue;
            }
            let (_, scale) = units.iter().find(|(unit, _)| *unit == ch)?;
            let value: u64 = number.parse().ok()?;
            secs = secs.checked_add(value.checked_mul(*scale)?)?;
            number.clear();
        }
        number.is_empty().then_some(())
    };
    consume(date, &[('W', 604_800), ('D', 86_400)])?;
    consume(time, &[('H', 3_600), ('M', 60), ('S', 1)])?;
    Some(Duration::from_secs(secs))
}
