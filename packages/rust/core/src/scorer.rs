//! Candidate scoring.
//!
//! A candidate's confidence is a weighted sum of independent signals, each in
//! [0, 1]:
//!
//! - `lexical`: how close the candidate's normalized title is to the cover's
//!   (mean of token Dice coefficient and normalized Levenshtein similarity)
//! - `artist`: whether the cover's artist segment appears in the candidate's
//!   title or channel
//! - `duration`: whether the candidate is long enough to be a full song
//!
//! A candidate whose raw title carries a cover marker ("piano", "karaoke",
//! ...) is itself a cover, and its total is scaled down by the configured
//! penalty. Every contribution is kept in the breakdown.

use std::collections::{BTreeMap, HashSet};

use maqam_normalizer::{NormalizedTitle, Normalizer, raw_tokens};
use maqam_shared::{
    Candidate, Classification, MaqamError, Result, ScoringConfig, ScoringWeights,
    SignalContribution,
};

pub const SIGNAL_LEXICAL: &str = "lexical";
pub const SIGNAL_ARTIST: &str = "artist";
pub const SIGNAL_DURATION: &str = "duration";
pub const SIGNAL_COVER_MARKER: &str = "cover_marker";

/// Score of one candidate plus the contribution of every signal.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub score: f64,
    pub signals: BTreeMap<String, SignalContribution>,
}

/// Scores candidates against a normalized cover title.
#[derive(Debug, Clone)]
pub struct MatchScorer {
    normalizer: Normalizer,
    weights: ScoringWeights,
    min_full_song_secs: u64,
    tie_epsilon: f64,
    cover_markers: Vec<Vec<String>>,
    cover_penalty: f64,
}

impl MatchScorer {
    /// Build a scorer. Fails with a config error when the weights are invalid.
    pub fn new(config: &ScoringConfig, normalizer: Normalizer) -> Result<Self> {
        config.validate()?;

        let cover_markers = config
            .cover_markers
            .iter()
            .map(|m| raw_tokens(m))
            .filter(|tokens| !tokens.is_empty())
            .collect();

        Ok(Self {
            normalizer,
            weights: config.weights,
            min_full_song_secs: u64::from(config.min_full_song_secs),
            tie_epsilon: config.tie_epsilon,
            cover_markers,
            cover_penalty: config.cover_penalty,
        })
    }

    /// Scores closer than this are ties.
    pub fn tie_epsilon(&self) -> f64 {
        self.tie_epsilon
    }

    /// Score one candidate. Errors affect only this candidate.
    pub fn score(
        &self,
        cover: &NormalizedTitle,
        classification: Classification,
        candidate: &Candidate,
    ) -> Result<CandidateScore> {
        if candidate.id.trim().is_empty() {
            return Err(MaqamError::scoring("candidate has an empty id"));
        }
        if candidate.title.trim().is_empty() {
            return Err(MaqamError::scoring(format!(
                "candidate {} has an empty title",
                candidate.id
            )));
        }

        let candidate_title = self.normalizer.normalize_text(&candidate.title);
        let candidate_channel = self.normalizer.normalize_text(&candidate.channel);

        let mut signals = BTreeMap::new();

        let lexical = lexical_similarity(&cover.text, &candidate_title);
        signals.insert(
            SIGNAL_LEXICAL.to_string(),
            contribution(lexical, self.weights.lexical, None),
        );

        let (artist, artist_note) = match cover.artist.as_deref() {
            None => (0.5, Some("cover title has no artist segment".to_string())),
            Some(artist) => {
                let found = contains_phrase(&candidate_title, artist)
                    || contains_phrase(&candidate_channel, artist);
                (if found { 1.0 } else { 0.0 }, None)
            }
        };
        signals.insert(
            SIGNAL_ARTIST.to_string(),
            contribution(artist, self.weights.artist, artist_note),
        );

        let (duration, duration_note) = self.duration_signal(classification, candidate);
        signals.insert(
            SIGNAL_DURATION.to_string(),
            contribution(duration, self.weights.duration, duration_note),
        );

        let mut total: f64 = signals.values().map(|s| s.weighted).sum();

        if let Some(marker) = self.cover_marker_in(&candidate.title) {
            let removed = total * self.cover_penalty;
            total -= removed;
            signals.insert(
                SIGNAL_COVER_MARKER.to_string(),
                SignalContribution {
                    raw: 1.0,
                    weight: self.cover_penalty,
                    weighted: -removed,
                    note: Some(format!("candidate title contains '{marker}'")),
                },
            );
        }

        if !total.is_finite() {
            return Err(MaqamError::scoring(format!(
                "candidate {} produced a non-finite score",
                candidate.id
            )));
        }

        Ok(CandidateScore {
            score: total.clamp(0.0, 1.0),
            signals,
        })
    }

    fn duration_signal(
        &self,
        classification: Classification,
        candidate: &Candidate,
    ) -> (f64, Option<String>) {
        match classification {
            Classification::Short => (1.0, Some("not applied to shorts".to_string())),
            Classification::Full => match candidate.duration_secs {
                None => (0.5, Some("candidate duration unknown".to_string())),
                Some(secs) if secs >= self.min_full_song_secs => (1.0, None),
                Some(secs) => (
                    0.0,
                    Some(format!(
                        "{secs}s is shorter than a full song ({}s)",
                        self.min_full_song_secs
                    )),
                ),
            },
        }
    }

    fn cover_marker_in(&self, raw_title: &str) -> Option<String> {
        let tokens = raw_tokens(raw_title);
        self.cover_markers
            .iter()
            .find(|marker| tokens.windows(marker.len()).any(|w| w == marker.as_slice()))
            .map(|marker| marker.join(" "))
    }
}

fn contribution(raw: f64, weight: f64, note: Option<String>) -> SignalContribution {
    SignalContribution {
        raw,
        weight,
        weighted: raw * weight,
        note,
    }
}

/// Mean of token-set Dice coefficient and normalized Levenshtein similarity.
/// 0.0 when either side is empty.
pub fn lexical_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    let shared = left.intersection(&right).count();
    let dice = (2 * shared) as f64 / (left.len() + right.len()) as f64;

    let edit = strsim::normalized_levenshtein(a, b);

    (dice + edit) / 2.0
}

/// Whether `needle`'s tokens appear contiguously in `haystack`.
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let hay: Vec<&str> = haystack.split_whitespace().collect();
    let needle: Vec<&str> = needle.split_whitespace().collect();
    !needle.is_empty() && hay.windows(needle.len()).any(|w| w == needle.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> MatchScorer {
        MatchScorer::new(&ScoringConfig::default(), Normalizer::default()).unwrap()
    }

    fn candidate(id: &str, title: &str, channel: &str, duration: Option<u64>) -> Candidate {
        Candidate {
            id: id.into(),
            title: title.into(),
            channel: channel.into(),
            duration_secs: duration,
            rank: 0,
        }
    }

    fn normalize(raw: &str) -> NormalizedTitle {
        maqam_normalizer::normalize(raw)
    }

    #[test]
    fn arabic_title_scores_high() {
        let cover = normalize("اغنية حب (Piano Cover) HD");
        let result = scorer()
            .score(
                &cover,
                Classification::Full,
                &candidate("orig", "اغنية حب - Official", "Label", Some(200)),
            )
            .unwrap();

        assert!(result.score > 0.5, "score was {}", result.score);
        assert!((result.score - 0.875).abs() < 1e-9);
        assert!(result.signals.contains_key(SIGNAL_LEXICAL));
        assert!(!result.signals.contains_key(SIGNAL_COVER_MARKER));
    }

    #[test]
    fn artist_match_via_channel() {
        let cover = normalize("Amr Diab - Tamally Maak (Piano Cover)");
        let result = scorer()
            .score(
                &cover,
                Classification::Full,
                &candidate("orig", "Tamally Maak", "Amr Diab", Some(250)),
            )
            .unwrap();
        assert_eq!(result.signals[SIGNAL_ARTIST].raw, 1.0);
    }

    #[test]
    fn missing_artist_is_penalized() {
        let cover = normalize("Amr Diab - Tamally Maak (Piano Cover)");
        let result = scorer()
            .score(
                &cover,
                Classification::Full,
                &candidate("x", "Tamally Maak", "Some Uploader", Some(250)),
            )
            .unwrap();
        assert_eq!(result.signals[SIGNAL_ARTIST].raw, 0.0);
    }

    #[test]
    fn duration_signal_for_full_covers() {
        let cover = normalize("Tamally Maak");
        let s = scorer();

        let short = s
            .score(&cover, Classification::Full, &candidate("a", "Tamally Maak", "", Some(20)))
            .unwrap();
        assert_eq!(short.signals[SIGNAL_DURATION].raw, 0.0);

        let unknown = s
            .score(&cover, Classification::Full, &candidate("b", "Tamally Maak", "", None))
            .unwrap();
        assert_eq!(unknown.signals[SIGNAL_DURATION].raw, 0.5);

        let shorts = s
            .score(&cover, Classification::Short, &candidate("c", "Tamally Maak", "", Some(20)))
            .unwrap();
        assert_eq!(shorts.signals[SIGNAL_DURATION].raw, 1.0);
        assert!(shorts.signals[SIGNAL_DURATION].note.is_some());
    }

    #[test]
    fn cover_marker_penalty_demotes_other_covers() {
        let cover = normalize("Tamally Maak (Piano Cover)");
        let s = scorer();

        let original = s
            .score(&cover, Classification::Full, &candidate("o", "Tamally Maak", "", Some(250)))
            .unwrap();
        let other_cover = s
            .score(
                &cover,
                Classification::Full,
                &candidate("c", "Tamally Maak (Piano Cover)", "", Some(250)),
            )
            .unwrap();

        assert!(original.score > other_cover.score);
        let penalty = &other_cover.signals[SIGNAL_COVER_MARKER];
        assert!(penalty.weighted < 0.0);
        assert!((other_cover.score - original.score * 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_cover_text_has_zero_lexical() {
        let cover = normalize("(Piano Cover) 🎹");
        let result = scorer()
            .score(&cover, Classification::Full, &candidate("a", "Anything", "", Some(200)))
            .unwrap();
        assert_eq!(result.signals[SIGNAL_LEXICAL].raw, 0.0);
    }

    #[test]
    fn malformed_candidates_fail() {
        let cover = normalize("Tamally Maak");
        let s = scorer();
        assert!(matches!(
            s.score(&cover, Classification::Full, &candidate("", "Title", "", None)),
            Err(MaqamError::Scoring { .. })
        ));
        assert!(matches!(
            s.score(&cover, Classification::Full, &candidate("id", "  ", "", None)),
            Err(MaqamError::Scoring { .. })
        ));
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let cover = normalize("Amr Diab - Tamally Maak");
        let result = scorer()
            .score(
                &cover,
                Classification::Full,
                &candidate("o", "Amr Diab - Tamally Maak", "Amr Diab", Some(250)),
            )
            .unwrap();
        assert!((0.0..=1.0).contains(&result.score));
        assert!((result.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let mut config = ScoringConfig::default();
        config.weights.lexical = 0.5;
        assert!(matches!(
            MatchScorer::new(&config, Normalizer::default()),
            Err(MaqamError::Config { .. })
        ));
    }

    #[test]
    fn lexical_similarity_bounds() {
        assert_eq!(lexical_similarity("", "x"), 0.0);
        assert!((lexical_similarity("tamally maak", "tamally maak") - 1.0).abs() < 1e-12);
        let partial = lexical_similarity("tamally maak", "tamally");
        assert!(partial > 0.0 && partial < 1.0);
    }

    #[test]
    fn phrase_match_is_token_based() {
        assert!(contains_phrase("amr diab tamally maak", "amr diab"));
        assert!(!contains_phrase("tamr diab", "amr"));
    }
}
