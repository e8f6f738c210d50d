//! Concurrent candidate retrieval for a batch of covers.
//!
//! Retrieval is the only concurrent stage: one task per cover on a
//! [`JoinSet`], bounded by a [`Semaphore`]. Decisions are built only after
//! every retrieval has finished, so a cancelled batch yields no records at
//! all rather than a partial set.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use maqam_shared::{AppConfig, Candidate, MaqamError, MatchRecord, Result, VideoMetadata};
use maqam_youtube::CandidateRetriever;

use crate::decision::DecisionBuilder;
use crate::pipeline::ProgressReporter;

pub const NOTE_QUERY_TOO_SHORT: &str = "query too short to search";

/// Knobs for one batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum retrievals in flight.
    pub concurrency: usize,
    /// Candidates requested per search.
    pub search_limit: u32,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl BatchOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            concurrency: config.retrieval.concurrency as usize,
            search_limit: config.youtube.search_limit,
        }
    }
}

/// Records of a batch, in input order, plus retrieval statistics.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub records: Vec<MatchRecord>,
    /// Covers whose retrieval failed (recorded as no-match).
    pub retrieval_failures: usize,
    /// Covers whose normalized title was too short to search.
    pub skipped_queries: usize,
    /// Repeated cover ids dropped before matching.
    pub duplicate_covers: usize,
}

enum Retrieval {
    Skipped,
    Found(Vec<Candidate>),
    Failed(String),
}

/// Retrieve candidates for every cover concurrently, then decide each one.
///
/// A cover id seen twice is matched once, at its first position. A retrieval
/// error only affects its own cover, which becomes a no-match record noting
/// the failure. Cancelling `cancel` aborts in-flight searches
/// and returns [`MaqamError::Cancelled`].
#[instrument(skip_all, fields(covers = covers.len(), concurrency = options.concurrency))]
pub async fn match_batch(
    covers: Vec<VideoMetadata>,
    retriever: Arc<dyn CandidateRetriever>,
    builder: &DecisionBuilder,
    options: &BatchOptions,
    cancel: &CancellationToken,
    progress: &dyn ProgressReporter,
) -> Result<BatchOutcome> {
    if cancel.is_cancelled() {
        return Err(MaqamError::Cancelled);
    }

    let (covers, duplicate_covers) = dedup_covers(covers);
    let total = covers.len();
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut retrievals: Vec<Option<Retrieval>> = (0..total).map(|_| None).collect();
    let mut tasks: JoinSet<(usize, Result<Vec<Candidate>>)> = JoinSet::new();
    let mut completed = 0;

    for (index, cover) in covers.iter().enumerate() {
        let prepared = builder.prepare(cover)?;
        let Some(query) = builder.query_for(&prepared) else {
            debug!(video_id = %cover.id, query = %prepared.normalized.text, "query too short, not searching");
            retrievals[index] = Some(Retrieval::Skipped);
            completed += 1;
            progress.cover_matched(&cover.title, completed, total);
            continue;
        };

        let query = query.to_string();
        let retriever = Arc::clone(&retriever);
        let semaphore = Arc::clone(&semaphore);
        let limit = options.search_limit;

        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => retriever.search(&query, limit).await,
                Err(_) => Err(MaqamError::Cancelled),
            };
            (index, result)
        });
    }

    loop {
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tasks.abort_all();
                info!(completed, total, "batch cancelled");
                return Err(MaqamError::Cancelled);
            }
            joined = tasks.join_next() => joined,
        };

        let Some(joined) = joined else { break };
        completed += 1;

        match joined {
            Ok((index, result)) => {
                let cover = &covers[index];
                retrievals[index] = Some(match result {
                    Ok(candidates) => {
                        debug!(video_id = %cover.id, candidates = candidates.len(), "retrieved");
                        Retrieval::Found(candidates)
                    }
                    Err(e) => {
                        warn!(video_id = %cover.id, error = %e, "retrieval failed, recording no match");
                        Retrieval::Failed(e.to_string())
                    }
                });
                progress.cover_matched(&cover.title, completed, total);
            }
            // A panicked task leaves its slot empty; it is recorded below.
            Err(e) => warn!(error = %e, "retrieval task failed"),
        }
    }

    let mut records = Vec::with_capacity(total);
    let mut retrieval_failures = 0;
    let mut skipped_queries = 0;

    for (cover, retrieval) in covers.into_iter().zip(retrievals) {
        let record = match retrieval {
            Some(Retrieval::Found(candidates)) => builder.decide(cover, candidates)?,
            Some(Retrieval::Failed(reason)) => {
                retrieval_failures += 1;
                builder.decide_unretrieved(cover, &format!("retrieval failed: {reason}"))?
            }
            Some(Retrieval::Skipped) => {
                skipped_queries += 1;
                builder.decide_unretrieved(cover, NOTE_QUERY_TOO_SHORT)?
            }
            None => {
                retrieval_failures += 1;
                builder.decide_unretrieved(cover, "retrieval failed: task did not complete")?
            }
        };
        records.push(record);
    }

    info!(
        records = records.len(),
        retrieval_failures, skipped_queries, duplicate_covers, "batch matched"
    );

    Ok(BatchOutcome {
        records,
        retrieval_failures,
        skipped_queries,
        duplicate_covers,
    })
}

/// Keep the first occurrence of each cover id.
fn dedup_covers(covers: Vec<VideoMetadata>) -> (Vec<VideoMetadata>, usize) {
    let mut seen = HashSet::with_capacity(covers.len());
    let mut unique = Vec::with_capacity(covers.len());
    let mut dropped = 0;

    for cover in covers {
        if seen.insert(cover.id.clone()) {
            unique.push(cover);
        } else {
            warn!(video_id = %cover.id, title = %cover.title, "duplicate cover, keeping first");
            dropped += 1;
        }
    }

    (unique, dropped)
}
