//! Short/Full classification by duration.

use maqam_shared::{
    Classification, ClassifierConfig, MaqamError, Result, SHORT_MAX_DURATION_SECS,
};

/// Classifies videos as Shorts or full songs.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    short_max_secs: u32,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            short_max_secs: SHORT_MAX_DURATION_SECS,
        }
    }
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            short_max_secs: config.short_max_secs,
        }
    }

    /// `Short` when `duration_secs` is at most the threshold (inclusive).
    pub fn classify(&self, duration_secs: i64) -> Result<Classification> {
        if duration_secs < 0 {
            return Err(MaqamError::InvalidDuration {
                seconds: duration_secs,
            });
        }
        if duration_secs <= i64::from(self.short_max_secs) {
            Ok(Classification::Short)
        } else {
            Ok(Classification::Full)
        }
    }
}

/// Classify with the default 60-second threshold.
pub fn classify(duration_secs: i64) -> Result<Classification> {
    Classifier::default().classify(duration_secs)
}
