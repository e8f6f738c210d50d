//! Human review of match records.
//!
//! [`transition`] is pure: it returns the next record or an error and never
//! mutates its input. Confidence and breakdown always keep the automatic
//! judgment.

use chrono::Utc;

use maqam_shared::{Candidate, DecisionSource, MaqamError, MatchRecord, Result, ReviewStatus};
use maqam_youtube::video_id_from_url;

/// Title recorded for originals supplied by hand.
pub const MANUAL_TITLE: &str = "(manual)";

/// A reviewer's decision about one record.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewAction {
    /// Accept the record, optionally with a manually chosen original.
    Include { original: Option<Candidate> },
    /// Reject the record from the dataset.
    Exclude,
    /// Back to pending with the automatic decision.
    Reset,
}

impl ReviewAction {
    /// Include with a manual original given as a video id or YouTube URL.
    pub fn include_manual(input: &str) -> Result<Self> {
        let id = video_id_from_url(input).ok_or_else(|| {
            MaqamError::invalid_override(format!("not a YouTube video id or URL: '{input}'"))
        })?;
        Ok(Self::Include {
            original: Some(Candidate {
                id,
                title: MANUAL_TITLE.to_string(),
                channel: String::new(),
                duration_secs: None,
                rank: 0,
            }),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Include { original: Some(_) } => "include (override)",
            Self::Include { original: None } => "include",
            Self::Exclude => "exclude",
            Self::Reset => "reset",
        }
    }
}

/// Apply a review action, returning the updated record.
pub fn transition(record: &MatchRecord, action: &ReviewAction) -> Result<MatchRecord> {
    let mut next = record.clone();

    match action {
        ReviewAction::Include { original } => {
            match original {
                Some(original) => {
                    if original.id.trim().is_empty() {
                        return Err(MaqamError::invalid_override(
                            "manual original has an empty id",
                        ));
                    }
                    let is_best = record
                        .best_candidate
                        .as_ref()
                        .is_some_and(|best| best.id == original.id);
                    if is_best {
                        next.override_candidate = None;
                        next.decision_source = DecisionSource::Automatic;
                    } else {
                        next.override_candidate = Some(original.clone());
                        next.decision_source = DecisionSource::HumanOverride;
                    }
                }
                None => {
                    if record.effective_candidate().is_none() {
                        return Err(MaqamError::invalid_override(
                            "no original to include; supply one manually",
                        ));
                    }
                }
            }
            next.review_status = ReviewStatus::Included;
        }
        ReviewAction::Exclude => {
            if record.review_status == ReviewStatus::Excluded {
                return Ok(next);
            }
            next.review_status = ReviewStatus::Excluded;
        }
        ReviewAction::Reset => {
            next.review_status = ReviewStatus::Pending;
            next.decision_source = DecisionSource::Automatic;
            next.override_candidate = None;
        }
    }

    next.updated_at = Utc::now();
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maqam_shared::{Classification, RecordId, ScoreBreakdown, VideoMetadata};

    fn best() -> Candidate {
        Candidate {
            id: "orig".into(),
            title: "Tamally Maak".into(),
            channel: "Amr Diab".into(),
            duration_secs: Some(250),
            rank: 0,
        }
    }

    fn manual(id: &str) -> Candidate {
        Candidate {
            id: id.into(),
            title: MANUAL_TITLE.into(),
            channel: String::new(),
            duration_secs: None,
            rank: 0,
        }
    }

    fn record(best_candidate: Option<Candidate>) -> MatchRecord {
        let now = Utc::now();
        MatchRecord {
            id: RecordId::new(),
            cover: VideoMetadata {
                id: "cover".into(),
                title: "Tamally Maak (Piano Cover)".into(),
                duration_secs: 200,
                channel: "Keys".into(),
                published_at: None,
            },
            classification: Classification::Full,
            normalized_query: "tamally maak".into(),
            best_candidate,
            confidence: 0.62,
            breakdown: ScoreBreakdown::with_note("n"),
            decision_source: DecisionSource::Automatic,
            review_status: ReviewStatus::Pending,
            override_candidate: None,
            needs_attention: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn include(original: Option<Candidate>) -> ReviewAction {
        ReviewAction::Include { original }
    }

    #[test]
    fn include_with_override_keeps_score() {
        let before = record(Some(best()));
        let after = transition(&before, &include(Some(manual("xyz")))).unwrap();

        assert_eq!(after.review_status, ReviewStatus::Included);
        assert_eq!(after.decision_source, DecisionSource::HumanOverride);
        assert_eq!(after.effective_candidate().unwrap().id, "xyz");
        assert_eq!(after.confidence, before.confidence);
        assert_eq!(after.breakdown, before.breakdown);
        assert_eq!(after.best_candidate, before.best_candidate);
        after.validate().unwrap();
    }

    #[test]
    fn include_without_original_on_no_match_fails() {
        let before = record(None);
        let err = transition(&before, &include(None)).unwrap_err();
        assert!(matches!(err, MaqamError::InvalidOverride { .. }));
        assert_eq!(before.review_status, ReviewStatus::Pending);
    }

    #[test]
    fn include_confirms_automatic_choice() {
        let after = transition(&record(Some(best())), &include(None)).unwrap();
        assert_eq!(after.review_status, ReviewStatus::Included);
        assert_eq!(after.decision_source, DecisionSource::Automatic);
        assert_eq!(after.effective_candidate().unwrap().id, "orig");
    }

    #[test]
    fn override_equal_to_best_is_automatic() {
        let overridden = transition(&record(Some(best())), &include(Some(manual("xyz")))).unwrap();
        let after = transition(&overridden, &include(Some(manual("orig")))).unwrap();
        assert_eq!(after.decision_source, DecisionSource::Automatic);
        assert!(after.override_candidate.is_none());
    }

    #[test]
    fn reinclude_keeps_existing_override() {
        let overridden = transition(&record(None), &include(Some(manual("xyz")))).unwrap();
        let excluded = transition(&overridden, &ReviewAction::Exclude).unwrap();
        let after = transition(&excluded, &include(None)).unwrap();
        assert_eq!(after.review_status, ReviewStatus::Included);
        assert_eq!(after.effective_candidate().unwrap().id, "xyz");
    }

    #[test]
    fn exclude_retains_candidates_and_is_idempotent() {
        let before = record(Some(best()));
        let once = transition(&before, &ReviewAction::Exclude).unwrap();
        assert_eq!(once.review_status, ReviewStatus::Excluded);
        assert_eq!(once.best_candidate, before.best_candidate);

        let twice = transition(&once, &ReviewAction::Exclude).unwrap();
        assert_eq!(twice, once);
    }

    #[test]
    fn reset_clears_override() {
        let overridden = transition(&record(Some(best())), &include(Some(manual("xyz")))).unwrap();
        let after = transition(&overridden, &ReviewAction::Reset).unwrap();
        assert_eq!(after.review_status, ReviewStatus::Pending);
        assert_eq!(after.decision_source, DecisionSource::Automatic);
        assert!(after.override_candidate.is_none());
        assert_eq!(after.confidence, overridden.confidence);
    }

    #[test]
    fn blank_override_is_rejected() {
        let before = record(Some(best()));
        let err = transition(&before, &include(Some(manual("  ")))).unwrap_err();
        assert!(matches!(err, MaqamError::InvalidOverride { .. }));
    }

    #[test]
    fn manual_original_from_url() {
        let action = ReviewAction::include_manual("https://youtu.be/dQw4w9WgXcQ").unwrap();
        match action {
            ReviewAction::Include { original: Some(c) } => {
                assert_eq!(c.id, "dQw4w9WgXcQ");
                assert_eq!(c.title, MANUAL_TITLE);
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert!(matches!(
            ReviewAction::include_manual("https://example.com/x"),
            Err(MaqamError::InvalidOverride { .. })
        ));
    }
}
