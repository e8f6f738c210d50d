//! Parsing of user-supplied YouTube URLs.
//!
//! A curation source is a playlist, a channel (by id or `@handle`), or a
//! single video. Manual originals in review are given as a video URL or a
//! bare id.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use maqam_shared::{MaqamError, Result};

/// Where a curation session's cover videos come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// `...?list=PL...`
    Playlist(String),
    /// `/channel/UC...`
    Channel(String),
    /// `/@handle`
    Handle(String),
    /// A single watch/shorts/youtu.be URL.
    Video(String),
}

static VIDEO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid regex"));

/// Classify a source URL.
pub fn parse_source(input: &str) -> Result<SourceRef> {
    let url = Url::parse(input.trim())
        .map_err(|e| MaqamError::validation(format!("invalid source URL '{input}': {e}")))?;

    if !is_youtube_host(&url) {
        return Err(MaqamError::validation(format!(
            "not a YouTube URL: {input}"
        )));
    }

    if let Some(list) = query_value(&url, "list") {
        return Ok(SourceRef::Playlist(list));
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        ["channel", id, ..] => Ok(SourceRef::Channel((*id).to_string())),
        [handle, ..] if handle.starts_with('@') && handle.len() > 1 => {
            Ok(SourceRef::Handle(handle[1..].to_string()))
        }
        _ => video_id_from_url(input)
            .map(SourceRef::Video)
            .ok_or_else(|| {
                MaqamError::validation(format!(
                    "unsupported YouTube URL (expected a playlist, channel, or video): {input}"
                ))
            }),
    }
}

/// Extract a video id from a watch, shorts, embed, or youtu.be URL, or
/// accept a bare 11-character id.
pub fn video_id_from_url(input: &str) -> Option<String> {
    let input = input.trim();
    if VIDEO_ID_RE.is_match(input) {
        return Some(input.to_string());
    }

    let url = Url::parse(input).ok()?;
    let host = url.host_str()?;

    let candidate = if host.ends_with("youtu.be") {
        url.path_segments()?.next().map(str::to_string)
    } else if is_youtube_host(&url) {
        match query_value(&url, "v") {
            Some(v) => Some(v),
            None => {
                let mut segments = url.path_segments()?;
                match segments.next() {
                    Some("shorts" | "embed" | "live" | "v") => segments.next().map(str::to_string),
                    _ => None,
                }
            }
        }
    } else {
        None
    };

    candidate.filter(|id| VIDEO_ID_RE.is_match(id))
}

fn is_youtube_host(url: &Url) -> bool {
    matches!(
        url.host_str(),
        Some(h) if h == "youtube.com" || h.ends_with(".youtube.com") || h == "youtu.be"
    )
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, v)| k == key && !v.is_empty())
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_playlist_urls() {
        assert_eq!(
            parse_source("https://www.youtube.com/playlist?list=PLabc123").unwrap(),
            SourceRef::Playlist("PLabc123".into())
        );
        // A watch URL inside a playlist is treated as the playlist.
        assert_eq!(
            parse_source("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PLxyz").unwrap(),
            SourceRef::Playlist("PLxyz".into())
        );
    }

    #[test]
    fn parses_channel_and_handle() {
        assert_eq!(
            parse_source("https://www.youtube.com/channel/UCabcdef/videos").unwrap(),
            SourceRef::Channel("UCabcdef".into())
        );
        assert_eq!(
            parse_source("https://youtube.com/@MaqamKeys").unwrap(),
            SourceRef::Handle("MaqamKeys".into())
        );
    }

    #[test]
    fn parses_single_video() {
        assert_eq!(
            parse_source("https://youtu.be/dQw4w9WgXcQ").unwrap(),
            SourceRef::Video("dQw4w9WgXcQ".into())
        );
    }

    #[test]
    fn rejects_foreign_hosts() {
        assert!(parse_source("https://vimeo.com/12345").is_err());
        assert!(parse_source("not a url").is_err());
    }

    #[test]
    fn video_id_variants() {
        let id = Some("dQw4w9WgXcQ".to_string());
        assert_eq!(video_id_from_url("dQw4w9WgXcQ"), id);
        assert_eq!(video_id_from_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10"), id);
        assert_eq!(video_id_from_url("https://m.youtube.com/shorts/dQw4w9WgXcQ"), id);
        assert_eq!(video_id_from_url("https://youtu.be/dQw4w9WgXcQ?si=x"), id);
        assert_eq!(video_id_from_url("https://www.youtube.com/embed/dQw4w9WgXcQ"), id);
    }

    #[test]
    fn video_id_rejects_garbage() {
        assert_eq!(video_id_from_url(""), None);
        assert_eq!(video_id_from_url("short"), None);
        assert_eq!(video_id_from_url("https://example.com/watch?v=dQw4w9WgXcQ"), None);
        assert_eq!(video_id_from_url("https://www.youtube.com/watch?v=bad"), None);
    }
}
