//! YouTube Data API v3 client.
//!
//! Responses are untyped JSON from an external service; they are decoded into
//! loose structs here and coerced into [`VideoMetadata`] / [`Candidate`] at
//! this boundary. Entries that cannot be coerced are skipped with a warning.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use maqam_shared::{Candidate, MaqamError, Result, VideoMetadata, YouTubeConfig};

use crate::duration::parse_iso8601_duration;
use crate::source::{SourceRef, parse_source};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("Maqam/", env!("CARGO_PKG_VERSION"));

/// `videos.list` accepts at most this many ids per request.
const VIDEOS_BATCH_SIZE: usize = 50;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    channel_title: String,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItem {
    id: Option<SearchId>,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: Option<String>,
    snippet: Option<Snippet>,
    content_details: Option<VideoDetails>,
}

#[derive(Debug, Deserialize)]
struct VideoDetails {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    content_details: Option<PlaylistItemDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemDetails {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    content_details: Option<ChannelDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelDetails {
    related_playlists: Option<RelatedPlaylists>,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

// ---------------------------------------------------------------------------
// YouTubeClient
// ---------------------------------------------------------------------------

/// Client for the YouTube Data API v3.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    client: Client,
    base_url: String,
    api_key: String,
    page_size: u32,
}

impl YouTubeClient {
    /// Create a client from the `[youtube]` config and an API key.
    pub fn new(config: &YouTubeConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MaqamError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            page_size: config.page_size,
        })
    }

    /// Resolve a source URL to its cover videos, in source order.
    #[instrument(skip_all, fields(source = %source_url))]
    pub async fn fetch_source(&self, source_url: &str) -> Result<Vec<VideoMetadata>> {
        let source = parse_source(source_url)?;
        let single_video = matches!(source, SourceRef::Video(_));

        let ids = match source {
            SourceRef::Playlist(id) => self.playlist_video_ids(&id).await?,
            SourceRef::Channel(id) => {
                let uploads = self.uploads_playlist(&[("id", id.as_str())]).await?;
                self.playlist_video_ids(&uploads).await?
            }
            SourceRef::Handle(handle) => {
                let handle = format!("@{handle}");
                let uploads = self
                    .uploads_playlist(&[("forHandle", handle.as_str())])
                    .await?;
                self.playlist_video_ids(&uploads).await?
            }
            SourceRef::Video(id) => vec![id],
        };

        let ids = dedup_preserving_order(ids);
        let videos = self.videos(&ids).await?;

        let mut by_id: HashMap<String, VideoItem> = videos
            .into_iter()
            .filter_map(|v| v.id.clone().map(|id| (id, v)))
            .collect();

        let mut result = Vec::with_capacity(ids.len());
        for id in &ids {
            let Some(item) = by_id.remove(id) else {
                warn!(video_id = %id, "video unavailable (private or deleted), skipping");
                continue;
            };
            match to_metadata(id, item) {
                Some(meta) => result.push(meta),
                None => warn!(video_id = %id, "video has no usable duration, skipping"),
            }
        }

        if single_video && result.is_empty() {
            return Err(MaqamError::NotFound(format!("video {source_url}")));
        }

        info!(videos = result.len(), listed = ids.len(), "fetched cover metadata");
        Ok(result)
    }

    /// Search for videos matching `query`, returning up to `limit` candidates
    /// ranked in the API's relevance order.
    #[instrument(skip_all, fields(query = %query, limit))]
    pub async fn search_candidates(&self, query: &str, limit: u32) -> Result<Vec<Candidate>> {
        let max_results = limit.clamp(1, 50).to_string();
        let response: ListResponse<SearchItem> = self
            .get_json(
                "search",
                &[
                    ("part", "snippet"),
                    ("type", "video"),
                    ("q", query),
                    ("maxResults", max_results.as_str()),
                ],
            )
            .await?;

        let hits: Vec<(String, Snippet)> = response
            .items
            .into_iter()
            .filter_map(|item| {
                let id = item.id?.video_id.filter(|id| !id.is_empty())?;
                Some((id, item.snippet.unwrap_or_default()))
            })
            .collect();

        if hits.is_empty() {
            debug!("search returned no videos");
            return Ok(Vec::new());
        }

        // Durations only come from videos.list; a failure there degrades to
        // unknown durations rather than losing the candidates.
        let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
        let details: HashMap<String, VideoItem> = match self.videos(&ids).await {
            Ok(items) => items
                .into_iter()
                .filter_map(|v| v.id.clone().map(|id| (id, v)))
                .collect(),
            Err(e) => {
                warn!(error = %e, "could not hydrate search results, durations unknown");
                HashMap::new()
            }
        };

        let candidates = hits
            .into_iter()
            .enumerate()
            .map(|(rank, (id, snippet))| {
                let detail = details.get(&id);
                let duration_secs = detail
                    .and_then(|d| d.content_details.as_ref())
                    .and_then(|c| c.duration.as_deref())
                    .and_then(parse_iso8601_duration);
                let (title, channel) = match detail.and_then(|d| d.snippet.as_ref()) {
                    Some(s) => (s.title.clone(), s.channel_title.clone()),
                    None => (snippet.title, snippet.channel_title),
                };
                Candidate {
                    id,
                    title,
                    channel,
                    duration_secs,
                    rank: rank as u32,
                }
            })
            .collect::<Vec<_>>();

        debug!(candidates = candidates.len(), "search complete");
        Ok(candidates)
    }

    /// List the video ids of a playlist, following pagination.
    async fn playlist_video_ids(&self, playlist_id: &str) -> Result<Vec<String>> {
        let page_size = self.page_size.to_string();
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("part", "contentDetails"),
                ("playlistId", playlist_id),
                ("maxResults", page_size.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let page: ListResponse<PlaylistItem> =
                self.get_json("playlistItems", &params).await?;

            ids.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.content_details?.video_id)
                    .filter(|id| !id.is_empty()),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(playlist_id, videos = ids.len(), "listed playlist");
        Ok(ids)
    }

    /// Resolve a channel to its uploads playlist.
    async fn uploads_playlist(&self, selector: &[(&str, &str)]) -> Result<String> {
        let mut params = vec![("part", "contentDetails")];
        params.extend_from_slice(selector);

        let response: ListResponse<ChannelItem> = self.get_json("channels", &params).await?;

        response
            .items
            .into_iter()
            .find_map(|c| c.content_details?.related_playlists?.uploads)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                let what: Vec<String> = selector.iter().map(|(k, v)| format!("{k}={v}")).collect();
                MaqamError::NotFound(format!("channel {}", what.join(", ")))
            })
    }

    /// Hydrate video ids with snippet and duration, in chunks of 50.
    async fn videos(&self, ids: &[String]) -> Result<Vec<VideoItem>> {
        let mut items = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(VIDEOS_BATCH_SIZE) {
            let joined = chunk.join(",");
            let response: ListResponse<VideoItem> = self
                .get_json(
                    "videos",
                    &[("part", "snippet,contentDetails"), ("id", joined.as_str())],
                )
                .await?;
            items.extend(response.items);
        }
        Ok(items)
    }

    /// GET `<base>/<endpoint>` with the API key and decode the JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}/{endpoint}", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MaqamError::Network(format!("{endpoint}: request timed out"))
                } else {
                    MaqamError::Network(format!("{endpoint}: {e}"))
                }
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(MaqamError::NotFound(format!("{endpoint}: {}", describe(params))));
        }
        if !status.is_success() {
            return Err(MaqamError::Network(format!("{endpoint}: HTTP {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| MaqamError::Network(format!("{endpoint}: malformed response: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Coerce a `videos.list` item into metadata. `None` when the duration is
/// missing or unparsable.
fn to_metadata(id: &str, item: VideoItem) -> Option<VideoMetadata> {
    let duration_secs = item
        .content_details
        .as_ref()
        .and_then(|c| c.duration.as_deref())
        .and_then(parse_iso8601_duration)?;
    let snippet = item.snippet.unwrap_or_default();
    let published_at = snippet
        .published_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));

    Some(VideoMetadata {
        id: id.to_string(),
        title: snippet.title,
        duration_secs,
        channel: snippet.channel_title,
        published_at,
    })
}

fn dedup_preserving_order(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Describe the request for error messages, without the API key.
fn describe(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .filter(|(k, _)| *k != "part" && *k != "maxResults" && *k != "pageToken")
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}
