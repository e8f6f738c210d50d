//! Title normalization for cover/original matching.
//!
//! Turns a noisy, multilingual video title into a canonical comparable form:
//! lowercased, bracket/punctuation/emoji free, with configured stop phrases
//! ("piano cover", "official", ...) removed. Non-Latin scripts are preserved.
//!
//! Normalization is pure and idempotent: feeding a normalized text back in
//! returns it unchanged.

mod passes;

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use maqam_shared::NormalizerConfig;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Canonical form of a raw title.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedTitle {
    /// Normalized text; may be empty.
    pub text: String,
    /// Normalized artist segment ("Artist - Song" titles), if one was found.
    pub artist: Option<String>,
}

impl NormalizedTitle {
    /// Whitespace-separated tokens of the normalized text.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.text.split(' ').filter(|t| !t.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Configured title normalizer.
#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Stop phrases as token sequences, longest first.
    stop_phrases: Vec<Vec<String>>,
    /// Tokens that truncate the title.
    cut_markers: Vec<String>,
    /// Tokens that truncate the title when they follow removed noise.
    attribution_markers: Vec<String>,
}

/// A title token, remembering whether noise was removed right before it.
#[derive(Debug, Clone)]
struct Token {
    text: String,
    after_removal: bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&NormalizerConfig::default())
    }
}

impl Normalizer {
    /// Build a normalizer. Phrases go through the same character passes as
    /// titles, so `"Feat."` in config matches `feat` in a title.
    pub fn new(config: &NormalizerConfig) -> Self {
        let mut stop_phrases: Vec<Vec<String>> = config
            .stop_phrases
            .iter()
            .map(|p| tokenize(&passes::run_pipeline(p)))
            .filter(|tokens| !tokens.is_empty())
            .collect();
        stop_phrases.sort_by(|a, b| b.len().cmp(&a.len()));
        stop_phrases.dedup();

        Self {
            stop_phrases,
            cut_markers: single_tokens(&config.cut_markers),
            attribution_markers: single_tokens(&config.attribution_markers),
        }
    }

    /// Normalize a raw title and extract its artist segment.
    pub fn normalize(&self, raw_title: &str) -> NormalizedTitle {
        let text = self.normalize_text(raw_title);
        let artist = if text.is_empty() {
            None
        } else {
            self.extract_artist(raw_title)
        };

        trace!(raw = raw_title, normalized = %text, ?artist, "normalized title");

        NormalizedTitle { text, artist }
    }

    /// Normalize to text only (used for candidate titles and channel names).
    pub fn normalize_text(&self, raw: &str) -> String {
        let tokens = self.remove_stop_phrases(title_tokens(raw));
        let tokens = self.apply_cut_markers(tokens);
        tokens
            .into_iter()
            .map(|t| t.text)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Remove stop phrases until no phrase matches anymore.
    ///
    /// Removing a phrase can bring two tokens together that form another
    /// phrase, so a single sweep is not enough for idempotence.
    fn remove_stop_phrases(&self, mut tokens: Vec<Token>) -> Vec<Token> {
        loop {
            let before = tokens.len();
            tokens = self.sweep(tokens);
            if tokens.len() == before {
                return tokens;
            }
        }
    }

    fn sweep(&self, tokens: Vec<Token>) -> Vec<Token> {
        let mut kept: Vec<Token> = Vec::with_capacity(tokens.len());
        let mut removed = false;
        let mut i = 0;

        'outer: while i < tokens.len() {
            for phrase in &self.stop_phrases {
                let end = i + phrase.len();
                if end <= tokens.len()
                    && tokens[i..end]
                        .iter()
                        .zip(phrase)
                        .all(|(token, word)| token.text == *word)
                {
                    removed = true;
                    i = end;
                    continue 'outer;
                }
            }
            let mut token = tokens[i].clone();
            token.after_removal |= removed;
            removed = false;
            kept.push(token);
            i += 1;
        }

        kept
    }

    fn apply_cut_markers(&self, mut tokens: Vec<Token>) -> Vec<Token> {
        let cut = tokens.iter().position(|t| {
            self.cut_markers.contains(&t.text)
                || (t.after_removal && self.attribution_markers.contains(&t.text))
        });
        if let Some(pos) = cut {
            tokens.truncate(pos);
        }
        tokens
    }

    /// Take the segment before the first separator as the artist, provided
    /// both sides still carry text after normalization.
    fn extract_artist(&self, raw_title: &str) -> Option<String> {
        static SEPARATOR_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"\s+-\s+|[–—|]").expect("valid regex"));

        let unbracketed = passes::strip_brackets(&passes::compose(raw_title));
        let sep = SEPARATOR_RE.find(&unbracketed)?;

        let left = self.normalize_text(&unbracketed[..sep.start()]);
        let right = self.normalize_text(&unbracketed[sep.end()..]);

        if left.is_empty() || right.is_empty() {
            None
        } else {
            Some(left)
        }
    }
}

fn tokenize(s: &str) -> Vec<String> {
    s.split_whitespace().map(String::from).collect()
}

/// Config markers reduced to single normalized tokens.
fn single_tokens(markers: &[String]) -> Vec<String> {
    markers
        .iter()
        .map(|m| passes::run_pipeline(m))
        .filter(|m| !m.is_empty() && !m.contains(' '))
        .collect()
}

/// Clean a raw title into tokens, marking the first token after each
/// removed bracketed segment.
fn title_tokens(raw: &str) -> Vec<Token> {
    let lowered = passes::lowercase(&passes::compose(raw));
    let mut tokens = Vec::new();

    for (n, piece) in passes::split_at_brackets(&lowered).iter().enumerate() {
        let cleaned = passes::collapse_whitespace(&passes::strip_symbols(piece));
        for (i, word) in cleaned.split(' ').filter(|w| !w.is_empty()).enumerate() {
            tokens.push(Token {
                text: word.to_string(),
                after_removal: n > 0 && i == 0,
            });
        }
    }

    tokens
}

/// Lowercased word tokens of a raw title, keeping bracketed segments and
/// stop phrases. Used to spot cover markers such as "(Piano Cover)".
pub fn raw_tokens(raw_title: &str) -> Vec<String> {
    let lowered = passes::lowercase(&passes::compose(raw_title));
    tokenize(&passes::strip_symbols(&lowered))
}

/// Normalize with the default stop-phrase list.
pub fn normalize(raw_title: &str) -> NormalizedTitle {
    static DEFAULT: LazyLock<Normalizer> = LazyLock::new(Normalizer::default);
    DEFAULT.normalize(raw_title)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_cover_noise_and_brackets() {
        let n = normalize("Amr Diab - Tamally Maak (Piano Cover by X)");
        assert_eq!(n.text, "amr diab tamally maak");
        assert_eq!(n.artist.as_deref(), Some("amr diab"));
    }

    #[test]
    fn strips_hq_and_official() {
        let n = normalize("Fairuz - Habibi (Piano Cover) [HQ Official Audio]");
        assert_eq!(n.text, "fairuz habibi");
    }

    #[test]
    fn strips_unbracketed_stop_phrases() {
        let n = normalize("Tamally Maak Piano Cover HD Official Lyrics");
        assert_eq!(n.text, "tamally maak");
        assert_eq!(n.artist, None);
    }

    #[test]
    fn preserves_arabic_title() {
        let n = normalize("اغنية حب (Piano Cover) HD");
        assert_eq!(n.text, "اغنية حب");
        assert!(n.artist.is_none());
    }

    #[test]
    fn arabic_stop_words_removed() {
        let n = normalize("عزف بيانو - تملي معاك");
        assert_eq!(n.text, "تملي معاك");
        // Left side normalizes to nothing, so no artist.
        assert!(n.artist.is_none());
    }

    #[test]
    fn noise_only_title_normalizes_to_empty() {
        let n = normalize("(Piano Cover) 🎹 HD | Official");
        assert_eq!(n.text, "");
        assert!(n.is_empty());
        assert!(n.artist.is_none());
    }

    #[test]
    fn hyphenated_names_are_not_artist_separators() {
        let n = normalize("Jay-Z Empire State of Mind");
        assert!(n.artist.is_none());
        assert_eq!(n.text, "jay z empire state of mind");
    }

    #[test]
    fn artist_requires_text_on_both_sides() {
        let n = normalize("Habibi - Piano Cover");
        assert_eq!(n.text, "habibi");
        assert!(n.artist.is_none());
    }

    #[test]
    fn idempotent_on_sample_titles() {
        let titles = [
            "Amr Diab - Tamally Maak (Piano Cover by X)",
            "اغنية حب (Piano Cover) HD",
            "solo cover piano ballad",
            "Fairuz – Kifak Inta | عزف بيانو 🎹",
            "   ",
            "Feat. Someone — ft Other",
            "Amr Diab - Tamally Maak (Sad Piano Cover) by UserX",
            "Stand by Me (Piano Cover) by X",
        ];
        for raw in titles {
            let once = normalize(raw);
            let twice = normalize(&once.text);
            assert_eq!(once.text, twice.text, "not a fixed point for {raw:?}");
        }
    }

    #[test]
    fn stop_phrase_fixed_point_with_custom_list() {
        let config = NormalizerConfig {
            stop_phrases: vec!["solo piano".into(), "cover".into()],
            cut_markers: vec![],
            attribution_markers: vec![],
        };
        let normalizer = Normalizer::new(&config);
        // Removing "cover" joins "solo" and "piano" into a stop phrase.
        assert_eq!(normalizer.normalize_text("solo cover piano ballad"), "ballad");
    }

    #[test]
    fn cut_markers_truncate() {
        let config = NormalizerConfig {
            stop_phrases: vec!["cover".into()],
            cut_markers: vec!["By".into()],
            attribution_markers: vec![],
        };
        let normalizer = Normalizer::new(&config);
        assert_eq!(
            normalizer.normalize_text("Tamally Maak cover by Some Pianist"),
            "tamally maak"
        );
        assert_eq!(normalizer.normalize_text("Stand by Me"), "stand");
    }

    #[test]
    fn config_phrases_are_normalized() {
        let config = NormalizerConfig {
            stop_phrases: vec!["Feat.".into(), "  ".into()],
            cut_markers: vec![],
            attribution_markers: vec![],
        };
        let normalizer = Normalizer::new(&config);
        assert_eq!(normalizer.normalize_text("Song feat. Guest"), "song guest");
    }

    #[test]
    fn uploader_after_bracketed_cover_is_dropped() {
        let n = normalize("Amr Diab - Tamally Maak (Sad Piano Cover) by UserX");
        assert_eq!(n.text, "amr diab tamally maak");
        assert_eq!(n.artist.as_deref(), Some("amr diab"));
    }

    #[test]
    fn uploader_after_cover_phrase_is_dropped() {
        assert_eq!(
            normalize("Tamally Maak Piano Cover by Some Pianist").text,
            "tamally maak"
        );
    }

    #[test]
    fn by_inside_song_title_is_kept() {
        assert_eq!(normalize("Stand by Me (Piano Cover)").text, "stand by me");
        assert_eq!(normalize("By the River - Piano").text, "by the river");
        assert_eq!(normalize("Stand by Me").text, "stand by me");
    }

    #[test]
    fn raw_tokens_keep_brackets() {
        assert_eq!(
            raw_tokens("Habibi (Piano Cover) [HQ]"),
            vec!["habibi", "piano", "cover", "hq"]
        );
    }

    #[test]
    fn tokens_iterates_words() {
        let n = normalize("Amr Diab - Tamally Maak");
        let tokens: Vec<&str> = n.tokens().collect();
        assert_eq!(tokens, vec!["amr", "diab", "tamally", "maak"]);
    }
}
