//! Video platform collaborators.
//!
//! The matching core only sees two traits: [`MetadataFetcher`] turns a source
//! URL into cover video metadata, and [`CandidateRetriever`] turns a
//! normalized query into ranked candidate originals. [`YouTubeClient`]
//! implements both over the YouTube Data API v3; tests substitute fakes.

mod client;
mod duration;
mod source;

use async_trait::async_trait;

use maqam_shared::{Candidate, Result, VideoMetadata};

pub use client::YouTubeClient;
pub use duration::parse_iso8601_duration;
pub use source::{SourceRef, parse_source, video_id_from_url};

/// Resolves a playlist/channel/video URL into cover video metadata.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Fetch the cover videos behind `source_url`, in source order.
    ///
    /// Errors: `Network` on transport failure, `NotFound` for an unknown
    /// playlist or channel. An empty playlist is `Ok(vec![])`.
    async fn fetch(&self, source_url: &str) -> Result<Vec<VideoMetadata>>;
}

/// Searches the platform for candidate originals.
#[async_trait]
pub trait CandidateRetriever: Send + Sync {
    /// Up to `limit` candidates for `query`, most relevant first.
    ///
    /// Results are untrusted: they may contain duplicates, vary between
    /// calls, or be empty.
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<Candidate>>;
}

#[async_trait]
impl MetadataFetcher for YouTubeClient {
    async fn fetch(&self, source_url: &str) -> Result<Vec<VideoMetadata>> {
        self.fetch_source(source_url).await
    }
}

#[async_trait]
impl CandidateRetriever for YouTubeClient {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<Candidate>> {
        self.search_candidates(query, limit).await
    }
}
