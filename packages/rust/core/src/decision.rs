//! Turning scored candidates into a [`MatchRecord`].

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, warn};

use maqam_normalizer::{NormalizedTitle, Normalizer};
use maqam_shared::{
    AppConfig, Candidate, CandidateFailure, Classification, DecisionSource, MatchRecord,
    RecordId, Result, ReviewStatus, ScoreBreakdown, VideoMetadata,
};

use crate::classify::Classifier;
use crate::scorer::MatchScorer;

pub const NOTE_NO_CANDIDATES: &str = "retriever returned no candidates";
pub const NOTE_ALL_FAILED: &str = "every candidate failed to score";

/// A cover video prepared for retrieval.
#[derive(Debug, Clone)]
pub struct PreparedCover {
    pub normalized: NormalizedTitle,
    pub classification: Classification,
}

/// Builds match records from cover metadata and retrieved candidates.
///
/// Holds the normalizer, classifier and scorer so every record of a batch is
/// judged with the same configuration.
#[derive(Debug, Clone)]
pub struct DecisionBuilder {
    normalizer: Normalizer,
    classifier: Classifier,
    scorer: MatchScorer,
    flag_below: f64,
    min_query_chars: usize,
}

impl DecisionBuilder {
    /// Build from application config. Fails when the config is invalid.
    pub fn new(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let normalizer = Normalizer::new(&config.normalizer);
        Ok(Self {
            scorer: MatchScorer::new(&config.scoring, normalizer.clone())?,
            normalizer,
            classifier: Classifier::new(&config.classifier),
            flag_below: config.decision.flag_below,
            min_query_chars: config.decision.min_query_chars,
        })
    }

    /// Normalize and classify a cover.
    pub fn prepare(&self, cover: &VideoMetadata) -> Result<PreparedCover> {
        let seconds = i64::try_from(cover.duration_secs).unwrap_or(i64::MAX);
        Ok(PreparedCover {
            normalized: self.normalizer.normalize(&cover.title),
            classification: self.classifier.classify(seconds)?,
        })
    }

    /// The search query for a prepared cover, or `None` when the normalized
    /// title is too short to search for.
    pub fn query_for<'a>(&self, prepared: &'a PreparedCover) -> Option<&'a str> {
        let text = prepared.normalized.text.as_str();
        (text.chars().count() >= self.min_query_chars).then_some(text)
    }

    /// Score every candidate and build the automatic decision.
    pub fn decide(&self, cover: VideoMetadata, candidates: Vec<Candidate>) -> Result<MatchRecord> {
        let prepared = self.prepare(&cover)?;
        let candidates = dedup_candidates(candidates);

        if candidates.is_empty() {
            debug!(video_id = %cover.id, "no candidates");
            return Ok(self.no_match(cover, prepared, ScoreBreakdown::with_note(NOTE_NO_CANDIDATES)));
        }

        let mut failures = Vec::new();
        let mut best: Option<(Candidate, crate::scorer::CandidateScore)> = None;

        for candidate in candidates.iter() {
            match self
                .scorer
                .score(&prepared.normalized, prepared.classification, candidate)
            {
                Ok(scored) => {
                    let better = match &best {
                        None => true,
                        Some((_, current)) => {
                            scored.score > current.score + self.scorer.tie_epsilon()
                        }
                    };
                    if better {
                        best = Some((candidate.clone(), scored));
                    }
                }
                Err(e) => {
                    warn!(video_id = %cover.id, candidate = %candidate.id, error = %e, "candidate failed to score");
                    failures.push(CandidateFailure {
                        candidate_id: candidate.id.clone(),
                        rank: candidate.rank,
                        score: 0.0,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let considered = candidates.len();

        let Some((candidate, scored)) = best else {
            let breakdown = ScoreBreakdown {
                candidates_considered: considered,
                failures,
                notes: vec![NOTE_ALL_FAILED.to_string()],
                ..ScoreBreakdown::default()
            };
            return Ok(self.no_match(cover, prepared, breakdown));
        };

        let breakdown = ScoreBreakdown {
            signals: scored.signals,
            candidates_considered: considered,
            failures,
            notes: Vec::new(),
        };

        Ok(self.record(cover, prepared, Some(candidate), scored.score, breakdown))
    }

    /// The no-match record for a cover whose retrieval failed or was skipped.
    pub fn decide_unretrieved(&self, cover: VideoMetadata, reason: &str) -> Result<MatchRecord> {
        let prepared = self.prepare(&cover)?;
        Ok(self.no_match(cover, prepared, ScoreBreakdown::with_note(reason)))
    }

    fn no_match(
        &self,
        cover: VideoMetadata,
        prepared: PreparedCover,
        breakdown: ScoreBreakdown,
    ) -> MatchRecord {
        self.record(cover, prepared, None, 0.0, breakdown)
    }

    fn record(
        &self,
        cover: VideoMetadata,
        prepared: PreparedCover,
        best_candidate: Option<Candidate>,
        confidence: f64,
        breakdown: ScoreBreakdown,
    ) -> MatchRecord {
        let now = Utc::now();
        MatchRecord {
            id: RecordId::new(),
            cover,
            classification: prepared.classification,
            normalized_query: prepared.normalized.text,
            best_candidate,
            confidence,
            breakdown,
            decision_source: DecisionSource::Automatic,
            review_status: ReviewStatus::Pending,
            override_candidate: None,
            needs_attention: confidence < self.flag_below,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Drop repeated candidate ids, keeping the lowest rank, and order by rank.
fn dedup_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut by_id: HashMap<String, Candidate> = HashMap::with_capacity(candidates.len());
    for candidate in candidates {
        match by_id.get(&candidate.id) {
            Some(existing) if existing.rank <= candidate.rank => {}
            _ => {
                by_id.insert(candidate.id.clone(), candidate);
            }
        }
    }
    let mut unique: Vec<Candidate> = by_id.into_values().collect();
    unique.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.id.cmp(&b.id)));
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> DecisionBuilder {
        DecisionBuilder::new(&AppConfig::default()).unwrap()
    }

    fn cover(title: &str, duration: u64) -> VideoMetadata {
        VideoMetadata {
            id: "cover1".into(),
            title: title.into(),
            duration_secs: duration,
            channel: "Maqam Keys".into(),
            published_at: None,
        }
    }

    fn candidate(id: &str, title: &str, rank: u32) -> Candidate {
        Candidate {
            id: id.into(),
            title: title.into(),
            channel: String::new(),
            duration_secs: Some(240),
            rank,
        }
    }

    #[test]
    fn arabic_cover_matches_original() {
        let record = builder()
            .decide(
                cover("اغنية حب (Piano Cover) HD", 180),
                vec![Candidate {
                    channel: "Label".into(),
                    duration_secs: Some(200),
                    ..candidate("orig", "اغنية حب - Official", 0)
                }],
            )
            .unwrap();

        assert_eq!(record.classification, Classification::Full);
        assert_eq!(record.best_candidate.as_ref().unwrap().id, "orig");
        assert!(record.confidence > 0.5);
        assert_eq!(record.review_status, ReviewStatus::Pending);
        assert_eq!(record.decision_source, DecisionSource::Automatic);
        assert!(!record.needs_attention);
        assert_eq!(record.normalized_query, "اغنية حب");
    }

    #[test]
    fn no_candidates_gives_no_match() {
        let record = builder()
            .decide(cover("Some Song (Piano Cover)", 45), Vec::new())
            .unwrap();

        assert_eq!(record.classification, Classification::Short);
        assert!(record.best_candidate.is_none());
        assert_eq!(record.confidence, 0.0);
        assert_eq!(record.review_status, ReviewStatus::Pending);
        assert!(record.needs_attention);
        assert_eq!(record.breakdown.notes, vec![NOTE_NO_CANDIDATES.to_string()]);
    }

    #[test]
    fn ties_go_to_lower_rank() {
        let record = builder()
            .decide(
                cover("Tamally Maak (Piano Cover)", 200),
                vec![
                    candidate("second", "Tamally Maak", 1),
                    candidate("first", "Tamally Maak", 0),
                ],
            )
            .unwrap();
        assert_eq!(record.best_candidate.unwrap().id, "first");
    }

    #[test]
    fn failed_candidates_are_recorded_not_selected() {
        let record = builder()
            .decide(
                cover("Tamally Maak (Piano Cover)", 200),
                vec![candidate("bad", "", 0), candidate("good", "Tamally Maak", 1)],
            )
            .unwrap();

        assert_eq!(record.best_candidate.as_ref().unwrap().id, "good");
        assert_eq!(record.breakdown.failures.len(), 1);
        assert_eq!(record.breakdown.failures[0].candidate_id, "bad");
        assert_eq!(record.breakdown.failures[0].score, 0.0);
        assert_eq!(record.breakdown.candidates_considered, 2);
    }

    #[test]
    fn all_failed_gives_no_match() {
        let record = builder()
            .decide(cover("Tamally Maak", 200), vec![candidate("bad", " ", 0)])
            .unwrap();
        assert!(record.best_candidate.is_none());
        assert_eq!(record.confidence, 0.0);
        assert_eq!(record.breakdown.notes, vec![NOTE_ALL_FAILED.to_string()]);
    }

    #[test]
    fn duplicate_ids_keep_lowest_rank() {
        let unique = dedup_candidates(vec![
            candidate("a", "x", 3),
            candidate("b", "y", 1),
            candidate("a", "x", 0),
        ]);
        let ids: Vec<(&str, u32)> = unique.iter().map(|c| (c.id.as_str(), c.rank)).collect();
        assert_eq!(ids, vec![("a", 0), ("b", 1)]);
    }

    #[test]
    fn low_confidence_is_flagged_not_excluded() {
        let record = builder()
            .decide(
                cover("Tamally Maak (Piano Cover)", 200),
                vec![candidate("x", "Completely Unrelated Karaoke Song", 0)],
            )
            .unwrap();
        assert!(record.needs_attention);
        assert_eq!(record.review_status, ReviewStatus::Pending);
        assert!(record.best_candidate.is_some());
    }

    #[test]
    fn short_queries_are_not_searched() {
        let b = builder();
        let prepared = b.prepare(&cover("Hb (Piano Cover)", 100)).unwrap();
        assert_eq!(b.query_for(&prepared), None);

        let prepared = b.prepare(&cover("Habibi (Piano Cover)", 100)).unwrap();
        assert_eq!(b.query_for(&prepared), Some("habibi"));
    }

    #[test]
    fn unretrieved_records_carry_reason() {
        let record = builder()
            .decide_unretrieved(cover("Tamally Maak", 200), "retrieval failed: timeout")
            .unwrap();
        assert!(record.best_candidate.is_none());
        assert_eq!(record.breakdown.notes, vec!["retrieval failed: timeout".to_string()]);
        record.validate().unwrap();
    }
}
