//! Matching core for Maqam.
//!
//! Ties together classification, scoring, decision building and review into
//! the curation workflow (`curate`), and keeps a session's records in an
//! explicit [`RecordRepository`].

pub mod batch;
pub mod classify;
pub mod decision;
pub mod pipeline;
pub mod repository;
pub mod review;
pub mod scorer;

pub use batch::{BatchOptions, BatchOutcome, match_batch};
pub use classify::{Classifier, classify};
pub use decision::DecisionBuilder;
pub use pipeline::{
    CurateRequest, CurateResult, CurateStats, ProgressReporter, SilentProgress, curate,
    load_session, review,
};
pub use repository::{RecordFilter, RecordRepository, StatusCounts};
pub use review::{ReviewAction, transition};
pub use scorer::{CandidateScore, MatchScorer};
