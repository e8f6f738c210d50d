//! Shared types, error model, and configuration for Maqam.
//!
//! This crate is the foundation depended on by all other Maqam crates.
//! It provides:
//! - [`MaqamError`] — the unified error type
//! - Domain types ([`VideoMetadata`], [`Candidate`], [`MatchRecord`], [`RecordId`])
//! - Configuration ([`AppConfig`], [`ScoringConfig`], config loading and validation)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ClassifierConfig, DecisionConfig, DefaultsConfig, NormalizerConfig,
    RetrievalConfig, SHORT_MAX_DURATION_SECS, ScoringConfig, ScoringWeights, YouTubeConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{MaqamError, Result};
pub use types::{
    Candidate, CandidateFailure, Classification, DecisionSource, MatchRecord, RecordId,
    ReviewStatus, ScoreBreakdown, SessionId, SignalContribution, VideoMetadata, watch_url,
};
