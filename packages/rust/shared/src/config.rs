//! Application configuration for Maqam.
//!
//! User config lives at `~/.maqam/maqam.toml`.
//! CLI flags override config file values, which override defaults.
//! Every load path validates the result: an invalid file is a
//! [`MaqamError::Config`] at startup, never a per-record failure later.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MaqamError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "maqam.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".maqam";

/// Videos at or below this many seconds are Shorts.
pub const SHORT_MAX_DURATION_SECS: u32 = 60;

/// Tolerance used when checking that scoring weights sum to one.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Config structs (matching maqam.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// YouTube Data API settings.
    #[serde(default)]
    pub youtube: YouTubeConfig,

    /// Title normalization.
    #[serde(default)]
    pub normalizer: NormalizerConfig,

    /// Short/Full classification.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Candidate scoring.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Decision building.
    #[serde(default)]
    pub decision: DecisionConfig,

    /// Concurrent retrieval.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl AppConfig {
    /// Check every cross-field invariant of the configuration.
    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()?;
        self.decision.validate()?;
        self.retrieval.validate()?;
        self.youtube.validate()?;
        Ok(())
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Session database path.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Default CSV export path.
    #[serde(default = "default_export_path")]
    pub export_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            export_path: default_export_path(),
        }
    }
}

fn default_database_path() -> String {
    "data/maqam.db".into()
}
fn default_export_path() -> String {
    "data/dataset_output.csv".into()
}

/// `[youtube]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Data API base URL (overridable for tests and proxies).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of candidates requested per search.
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,

    /// Page size for playlist listing (API maximum is 50).
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            search_limit: default_search_limit(),
            page_size: default_page_size(),
        }
    }
}

impl YouTubeConfig {
    fn validate(&self) -> Result<()> {
        if self.search_limit == 0 {
            return Err(MaqamError::config("youtube.search_limit must be at least 1"));
        }
        if self.page_size == 0 || self.page_size > 50 {
            return Err(MaqamError::config(format!(
                "youtube.page_size must be between 1 and 50, got {}",
                self.page_size
            )));
        }
        Ok(())
    }
}

fn default_api_key_env() -> String {
    "YOUTUBE_API_KEY".into()
}
fn default_base_url() -> String {
    "https://www.googleapis.com/youtube/v3".into()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_search_limit() -> u32 {
    5
}
fn default_page_size() -> u32 {
    50
}

/// `[normalizer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Phrases removed from titles, matched as whole token sequences.
    #[serde(default = "default_stop_phrases")]
    pub stop_phrases: Vec<String>,

    /// Tokens that drop themselves and everything after them, wherever
    /// they appear.
    #[serde(default)]
    pub cut_markers: Vec<String>,

    /// Tokens that drop themselves and everything after them only when they
    /// directly follow removed noise, as in "(Piano Cover) by UserX" or
    /// "cover by UserX". "Stand by Me" keeps its "by".
    #[serde(default = "default_attribution_markers")]
    pub attribution_markers: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            stop_phrases: default_stop_phrases(),
            cut_markers: Vec::new(),
            attribution_markers: default_attribution_markers(),
        }
    }
}

fn default_attribution_markers() -> Vec<String> {
    vec!["by".into()]
}

fn default_stop_phrases() -> Vec<String> {
    [
        "piano cover",
        "solo piano",
        "cover",
        "piano",
        "performance",
        "instrumental",
        "arabic",
        "hq",
        "hd",
        "official",
        "lyrics",
        "audio",
        "video",
        "music",
        "live",
        "karaoke",
        "synthesia",
        "tutorial",
        "version",
        "arrangement",
        "feat",
        "ft",
        "بيانو",
        "عزف",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[classifier]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Inclusive upper bound, in seconds, for a Short.
    #[serde(default = "default_short_max_secs")]
    pub short_max_secs: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            short_max_secs: default_short_max_secs(),
        }
    }
}

fn default_short_max_secs() -> u32 {
    SHORT_MAX_DURATION_SECS
}

/// `[scoring]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Signal weights; must sum to 1.0.
    #[serde(default)]
    pub weights: ScoringWeights,

    /// Candidates shorter than this are implausible originals for Full covers.
    #[serde(default = "default_min_full_song_secs")]
    pub min_full_song_secs: u32,

    /// Scores closer than this are ties, broken by source rank.
    #[serde(default = "default_tie_epsilon")]
    pub tie_epsilon: f64,

    /// Tokens marking a candidate as itself a cover.
    #[serde(default = "default_cover_markers")]
    pub cover_markers: Vec<String>,

    /// Fraction of the total removed when a cover marker is present.
    #[serde(default = "default_cover_penalty")]
    pub cover_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            min_full_song_secs: default_min_full_song_secs(),
            tie_epsilon: default_tie_epsilon(),
            cover_markers: default_cover_markers(),
            cover_penalty: default_cover_penalty(),
        }
    }
}

impl ScoringConfig {
    /// Reject weights that are negative, non-finite, or do not sum to 1.0.
    ///
    /// Weights are never silently renormalized.
    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        for (name, value) in [
            ("lexical", w.lexical),
            ("artist", w.artist),
            ("duration", w.duration),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MaqamError::config(format!(
                    "scoring.weights.{name} must be a non-negative number, got {value}"
                )));
            }
        }

        let sum = w.lexical + w.artist + w.duration;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(MaqamError::config(format!(
                "scoring weights must sum to 1.0, got {sum} \
                 (lexical {}, artist {}, duration {})",
                w.lexical, w.artist, w.duration
            )));
        }

        if !self.tie_epsilon.is_finite() || self.tie_epsilon < 0.0 {
            return Err(MaqamError::config(format!(
                "scoring.tie_epsilon must be a non-negative number, got {}",
                self.tie_epsilon
            )));
        }

        if !(0.0..=1.0).contains(&self.cover_penalty) {
            return Err(MaqamError::config(format!(
                "scoring.cover_penalty must be within [0, 1], got {}",
                self.cover_penalty
            )));
        }

        Ok(())
    }
}

/// `[scoring.weights]` section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_lexical_weight")]
    pub lexical: f64,
    #[serde(default = "default_artist_weight")]
    pub artist: f64,
    #[serde(default = "default_duration_weight")]
    pub duration: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            lexical: default_lexical_weight(),
            artist: default_artist_weight(),
            duration: default_duration_weight(),
        }
    }
}

fn default_lexical_weight() -> f64 {
    0.6
}
fn default_artist_weight() -> f64 {
    0.25
}
fn default_duration_weight() -> f64 {
    0.15
}
fn default_min_full_song_secs() -> u32 {
    30
}
fn default_tie_epsilon() -> f64 {
    1e-6
}
fn default_cover_markers() -> Vec<String> {
    [
        "cover",
        "piano",
        "tutorial",
        "synthesia",
        "karaoke",
        "instrumental",
        "بيانو",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_cover_penalty() -> f64 {
    0.5
}

/// `[decision]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Records below this confidence are flagged for priority review.
    #[serde(default = "default_flag_below")]
    pub flag_below: f64,

    /// Normalized queries shorter than this (in characters) are not searched.
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            flag_below: default_flag_below(),
            min_query_chars: default_min_query_chars(),
        }
    }
}

impl DecisionConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.flag_below) {
            return Err(MaqamError::config(format!(
                "decision.flag_below must be within [0, 1], got {}",
                self.flag_below
            )));
        }
        Ok(())
    }
}

fn default_flag_below() -> f64 {
    0.35
}
fn default_min_query_chars() -> usize {
    3
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum searches in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl RetrievalConfig {
    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(MaqamError::config("retrieval.concurrency must be at least 1"));
        }
        Ok(())
    }
}

fn default_concurrency() -> u32 {
    5
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.maqam/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| MaqamError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.maqam/maqam.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        let config = AppConfig::default();
        config.validate()?;
        return Ok(config);
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MaqamError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| MaqamError::config(format!("failed to parse {}: {e}", path.display())))?;

    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MaqamError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MaqamError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MaqamError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the YouTube API key env var is set and non-empty, returning it.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.youtube.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(MaqamError::config(format!(
            "YouTube API key not found. Set the {var_name} environment variable.\n\
             Create a key at https://console.cloud.google.com/apis/credentials"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("stop_phrases"));
        assert!(toml_str.contains("YOUTUBE_API_KEY"));
    }

    #[test]
    fn default_config_is_valid() {
        AppConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.classifier.short_max_secs, 60);
        assert_eq!(parsed.youtube.api_key_env, "YOUTUBE_API_KEY");
        assert!((parsed.scoring.weights.lexical - 0.6).abs() < 1e-12);
    }

    #[test]
    fn partial_weights_fall_back_to_defaults() {
        let toml_str = r#"
[scoring.weights]
lexical = 0.6
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        config.validate().expect("valid");
        assert!((config.scoring.weights.artist - 0.25).abs() < 1e-12);
    }

    #[test]
    fn weights_not_summing_to_one_are_rejected() {
        let toml_str = r#"
[scoring.weights]
lexical = 0.5
artist = 0.3
duration = 0.1
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, MaqamError::Config { .. }));
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut config = AppConfig::default();
        config.scoring.weights = ScoringWeights {
            lexical: 1.2,
            artist: -0.2,
            duration: 0.0,
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("artist"));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = AppConfig::default();
        config.retrieval.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn flag_threshold_out_of_range_is_rejected() {
        let mut config = AppConfig::default();
        config.decision.flag_below = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_file_validates() {
        let dir = std::env::temp_dir().join(format!("maqam-config-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("maqam.toml");
        std::fs::write(
            &path,
            "[scoring.weights]\nlexical = 0.5\nartist = 0.3\nduration = 0.1\n",
        )
        .unwrap();

        let result = load_config_from(&path);
        assert!(matches!(result, Err(MaqamError::Config { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.youtube.api_key_env = "MAQAM_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
