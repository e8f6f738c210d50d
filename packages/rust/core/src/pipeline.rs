//! End-to-end curation: source URL → covers → candidates → decisions → session.
//!
//! Also hosts the review entry point used by the CLI, which applies one
//! action to a stored session and persists the result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use maqam_shared::{Classification, MatchRecord, RecordId, Result, SessionId};
use maqam_storage::Storage;
use maqam_youtube::{CandidateRetriever, MetadataFetcher};

use crate::batch::{BatchOptions, match_batch};
use crate::decision::DecisionBuilder;
use crate::repository::RecordRepository;
use crate::review::ReviewAction;

/// Input to [`curate`].
#[derive(Debug, Clone)]
pub struct CurateRequest {
    /// Playlist, channel, or video URL.
    pub source_url: String,
    pub options: BatchOptions,
}

/// Summary numbers for a curation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurateStats {
    pub covers: usize,
    pub shorts: usize,
    pub full: usize,
    /// Records with a best candidate.
    pub matched: usize,
    /// Records flagged for priority review.
    pub flagged: usize,
    pub retrieval_failures: usize,
    pub skipped_queries: usize,
    /// Repeated cover ids returned by the fetcher and dropped.
    pub duplicate_covers: usize,
    pub elapsed: Duration,
}

/// Result of [`curate`].
#[derive(Debug)]
pub struct CurateResult {
    pub session_id: SessionId,
    pub repository: RecordRepository,
    pub stats: CurateStats,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each cover's retrieval finishes.
    fn cover_matched(&self, title: &str, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &CurateResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn cover_matched(&self, _title: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &CurateResult) {}
}

/// Run a full curation session.
///
/// 1. Fetch cover metadata for the source
/// 2. Retrieve and score candidates for every cover
/// 3. Persist the session and all records in one transaction
///
/// Nothing is persisted when fetching fails or the batch is cancelled.
#[instrument(skip_all, fields(source = %request.source_url))]
pub async fn curate(
    request: &CurateRequest,
    fetcher: &dyn MetadataFetcher,
    retriever: Arc<dyn CandidateRetriever>,
    builder: &DecisionBuilder,
    storage: &Storage,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<CurateResult> {
    let start = Instant::now();
    let session_id = SessionId::new();

    info!(%session_id, "starting curation");

    // --- Phase 1: Fetch covers ---
    progress.phase("Fetching cover videos");
    let covers = fetcher.fetch(&request.source_url).await?;
    info!(covers = covers.len(), "fetched covers");

    // --- Phase 2: Match ---
    progress.phase("Matching covers to originals");
    let outcome = match_batch(
        covers,
        retriever,
        builder,
        &request.options,
        cancel,
        progress,
    )
    .await?;

    // --- Phase 3: Persist ---
    progress.phase("Saving session");
    storage
        .save_session_records(&session_id, &request.source_url, &outcome.records)
        .await?;

    let mut stats = summarize(&outcome.records);
    stats.retrieval_failures = outcome.retrieval_failures;
    stats.skipped_queries = outcome.skipped_queries;
    stats.duplicate_covers = outcome.duplicate_covers;
    stats.elapsed = start.elapsed();

    let repository = RecordRepository::from_records(outcome.records)?;

    info!(
        %session_id,
        covers = stats.covers,
        matched = stats.matched,
        flagged = stats.flagged,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "curation complete"
    );

    let result = CurateResult {
        session_id,
        repository,
        stats,
    };
    progress.done(&result);
    Ok(result)
}

fn summarize(records: &[MatchRecord]) -> CurateStats {
    let mut stats = CurateStats {
        covers: records.len(),
        ..CurateStats::default()
    };
    for record in records {
        match record.classification {
            Classification::Short => stats.shorts += 1,
            Classification::Full => stats.full += 1,
        }
        if record.best_candidate.is_some() {
            stats.matched += 1;
        }
        if record.needs_attention {
            stats.flagged += 1;
        }
    }
    stats
}

/// Load a stored session into a repository.
pub async fn load_session(storage: &Storage, session_id: &SessionId) -> Result<RecordRepository> {
    RecordRepository::from_records(storage.load_records(session_id).await?)
}

/// Apply a review action to one record of a stored session and persist it.
///
/// The stored copy is written only when the transition succeeds.
#[instrument(skip_all, fields(session = %session_id, record = %record_id, action = action.name()))]
pub async fn review(
    storage: &Storage,
    session_id: &SessionId,
    repository: &mut RecordRepository,
    record_id: &RecordId,
    action: &ReviewAction,
) -> Result<MatchRecord> {
    let updated = repository.apply(record_id, action)?.clone();
    storage.update_record(session_id, &updated).await?;
    info!(
        status = %updated.review_status,
        source = %updated.decision_source,
        "review applied"
    );
    Ok(updated)
}
