//! Core domain types for Maqam curation sessions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MaqamError, Result};

/// Build a canonical YouTube watch URL from a video id.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for match record identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Generate a new time-sortable record identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A UUID v7 wrapper for curation session identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Platform metadata
// ---------------------------------------------------------------------------

/// Metadata for a single cover video, fetched once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Platform-unique video id.
    pub id: String,
    /// Raw upload title (UTF-8, any script).
    pub title: String,
    /// Duration in seconds.
    pub duration_secs: u64,
    /// Uploading channel name.
    pub channel: String,
    /// Publication timestamp, when the platform reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl VideoMetadata {
    /// Canonical watch URL for this video.
    pub fn url(&self) -> String {
        watch_url(&self.id)
    }
}

/// A search result hypothesized to be the original song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Platform video id.
    pub id: String,
    /// Raw result title.
    pub title: String,
    /// Channel name.
    pub channel: String,
    /// Duration in seconds, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    /// Position in the retriever's ordering (0 = most relevant).
    pub rank: u32,
}

impl Candidate {
    /// Canonical watch URL for this candidate.
    pub fn url(&self) -> String {
        watch_url(&self.id)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Short vs Full, derived from duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Short,
    Full,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "SHORT",
            Self::Full => "FULL",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Classification {
    type Err = MaqamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SHORT" => Ok(Self::Short),
            "FULL" => Ok(Self::Full),
            other => Err(MaqamError::validation(format!(
                "unknown classification '{other}'"
            ))),
        }
    }
}

/// Whether the effective choice came from the scorer or a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionSource {
    Automatic,
    HumanOverride,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automatic => "AUTOMATIC",
            Self::HumanOverride => "HUMAN_OVERRIDE",
        }
    }
}

impl std::fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DecisionSource {
    type Err = MaqamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AUTOMATIC" => Ok(Self::Automatic),
            "HUMAN_OVERRIDE" => Ok(Self::HumanOverride),
            other => Err(MaqamError::validation(format!(
                "unknown decision source '{other}'"
            ))),
        }
    }
}

/// Human review state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    Included,
    Excluded,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Included => "INCLUDED",
            Self::Excluded => "EXCLUDED",
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReviewStatus {
    type Err = MaqamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "INCLUDED" => Ok(Self::Included),
            "EXCLUDED" => Ok(Self::Excluded),
            other => Err(MaqamError::validation(format!(
                "unknown review status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Score breakdown
// ---------------------------------------------------------------------------

/// One signal's contribution to a confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalContribution {
    /// Signal value in [0, 1] before weighting.
    pub raw: f64,
    /// Weight applied to the raw value.
    pub weight: f64,
    /// Amount added to (or, for penalties, removed from) the total.
    pub weighted: f64,
    /// Why the signal took this value, when not self-explanatory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A candidate whose scoring failed and was excluded from selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub candidate_id: String,
    pub rank: u32,
    /// Score recorded for the candidate; always 0.0.
    #[serde(default)]
    pub score: f64,
    pub reason: String,
}

/// Auditable explanation of an automatic decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Signal name → contribution, for the selected candidate.
    #[serde(default)]
    pub signals: BTreeMap<String, SignalContribution>,
    /// Number of candidates the scorer saw.
    #[serde(default)]
    pub candidates_considered: usize,
    /// Candidates that failed to score (recorded at 0.0, never selected).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<CandidateFailure>,
    /// Free-text notes (no candidates, retrieval failures, skipped queries).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ScoreBreakdown {
    /// Breakdown for a record decided without any scored candidate.
    pub fn with_note(note: impl Into<String>) -> Self {
        Self {
            notes: vec![note.into()],
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// MatchRecord
// ---------------------------------------------------------------------------

/// The pairing of a cover video with its hypothesized original.
///
/// `confidence` and `breakdown` always hold the automatic judgment; review
/// actions change only `review_status`, `decision_source`, and
/// `override_candidate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: RecordId,
    pub cover: VideoMetadata,
    pub classification: Classification,
    /// Normalized cover title used as the search query.
    pub normalized_query: String,
    /// Scorer's pick; `None` is the "no match" marker.
    pub best_candidate: Option<Candidate>,
    /// Automatic confidence in [0, 1].
    pub confidence: f64,
    pub breakdown: ScoreBreakdown,
    pub decision_source: DecisionSource,
    pub review_status: ReviewStatus,
    /// Manually supplied original, set by a human override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_candidate: Option<Candidate>,
    /// Low confidence: surface first to the reviewer.
    pub needs_attention: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchRecord {
    /// The candidate used for export: the override if any, else the best candidate.
    pub fn effective_candidate(&self) -> Option<&Candidate> {
        self.override_candidate
            .as_ref()
            .or(self.best_candidate.as_ref())
    }

    /// Check the record's structural invariants.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(MaqamError::validation(format!(
                "record {}: confidence {} outside [0, 1]",
                self.id, self.confidence
            )));
        }

        match (self.decision_source, &self.override_candidate) {
            (DecisionSource::HumanOverride, None) => {
                return Err(MaqamError::validation(format!(
                    "record {}: human override without a manual original",
                    self.id
                )));
            }
            (DecisionSource::Automatic, Some(_)) => {
                return Err(MaqamError::validation(format!(
                    "record {}: manual original present on an automatic decision",
                    self.id
                )));
            }
            _ => {}
        }

        if self.review_status == ReviewStatus::Included && self.effective_candidate().is_none() {
            return Err(MaqamError::validation(format!(
                "record {}: included without an original",
                self.id
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> MatchRecord {
        let now = Utc::now();
        MatchRecord {
            id: RecordId::new(),
            cover: VideoMetadata {
                id: "cover1".into(),
                title: "اغنية حب (Piano Cover) HD".into(),
                duration_secs: 180,
                channel: "Maqam Keys".into(),
                published_at: None,
            },
            classification: Classification::Full,
            normalized_query: "اغنية حب".into(),
            best_candidate: Some(Candidate {
                id: "orig1".into(),
                title: "اغنية حب - Official".into(),
                channel: "Label".into(),
                duration_secs: Some(200),
                rank: 0,
            }),
            confidence: 0.87,
            breakdown: ScoreBreakdown::default(),
            decision_source: DecisionSource::Automatic,
            review_status: ReviewStatus::Pending,
            override_candidate: None,
            needs_attention: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn record_id_roundtrip() {
        let id = RecordId::new();
        let parsed: RecordId = id.to_string().parse().expect("parse RecordId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn enums_serialize_screaming_case() {
        let json = serde_json::to_string(&ReviewStatus::Included).unwrap();
        assert_eq!(json, "\"INCLUDED\"");
        let json = serde_json::to_string(&DecisionSource::HumanOverride).unwrap();
        assert_eq!(json, "\"HUMAN_OVERRIDE\"");
        assert_eq!(
            "EXCLUDED".parse::<ReviewStatus>().unwrap(),
            ReviewStatus::Excluded
        );
        assert!("DONE".parse::<ReviewStatus>().is_err());
        assert_eq!(
            "SHORT".parse::<Classification>().unwrap(),
            Classification::Short
        );
        assert!("short".parse::<Classification>().is_err());
    }

    #[test]
    fn record_json_preserves_arabic() {
        let record = sample_record();
        let json = serde_json::to_string(&record).expect("serialize");
        let parsed: MatchRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.cover.title, "اغنية حب (Piano Cover) HD");
        assert_eq!(parsed, record);
    }

    #[test]
    fn effective_candidate_prefers_override() {
        let mut record = sample_record();
        assert_eq!(record.effective_candidate().unwrap().id, "orig1");

        record.override_candidate = Some(Candidate {
            id: "manual".into(),
            title: "(manual)".into(),
            channel: String::new(),
            duration_secs: None,
            rank: 0,
        });
        record.decision_source = DecisionSource::HumanOverride;
        assert_eq!(record.effective_candidate().unwrap().id, "manual");
        record.validate().expect("valid override");
    }

    #[test]
    fn included_without_original_is_invalid() {
        let mut record = sample_record();
        record.best_candidate = None;
        record.review_status = ReviewStatus::Included;
        assert!(record.validate().is_err());
    }

    #[test]
    fn watch_url_format() {
        assert_eq!(watch_url("abc"), "https://www.youtube.com/watch?v=abc");
    }
}
