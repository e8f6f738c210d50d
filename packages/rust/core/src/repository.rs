//! In-memory store of one curation session's records.

use std::collections::HashMap;

use maqam_shared::{Classification, MaqamError, MatchRecord, RecordId, Result, ReviewStatus};

use crate::review::{ReviewAction, transition};

/// Record counts by review status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub included: usize,
    pub excluded: usize,
    /// Records flagged for priority review.
    pub needs_attention: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.included + self.excluded
    }
}

/// Which records a review listing shows. Empty criteria match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Only records flagged for priority review.
    pub flagged_only: bool,
    pub status: Option<ReviewStatus>,
    /// Shorts only or full-length videos only.
    pub classification: Option<Classification>,
}

impl RecordFilter {
    pub fn matches(&self, record: &MatchRecord) -> bool {
        (!self.flagged_only || record.needs_attention)
            && self.status.is_none_or(|s| record.review_status == s)
            && self
                .classification
                .is_none_or(|c| record.classification == c)
    }
}

/// Insertion-ordered records, addressable by record id or cover video id.
#[derive(Debug, Clone, Default)]
pub struct RecordRepository {
    records: Vec<MatchRecord>,
    by_id: HashMap<RecordId, usize>,
    by_video: HashMap<String, usize>,
}

impl RecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository from records, preserving their order.
    pub fn from_records(records: Vec<MatchRecord>) -> Result<Self> {
        let mut repo = Self::new();
        for record in records {
            repo.insert(record)?;
        }
        Ok(repo)
    }

    /// Add a record. A second record for the same id or cover is rejected.
    pub fn insert(&mut self, record: MatchRecord) -> Result<()> {
        if self.by_id.contains_key(&record.id) {
            return Err(MaqamError::validation(format!(
                "duplicate record id {}",
                record.id
            )));
        }
        if self.by_video.contains_key(&record.cover.id) {
            return Err(MaqamError::validation(format!(
                "cover video {} already has a record",
                record.cover.id
            )));
        }

        let index = self.records.len();
        self.by_id.insert(record.id, index);
        self.by_video.insert(record.cover.id.clone(), index);
        self.records.push(record);
        Ok(())
    }

    pub fn get(&self, id: &RecordId) -> Option<&MatchRecord> {
        self.by_id.get(id).map(|&i| &self.records[i])
    }

    pub fn find_by_video(&self, video_id: &str) -> Option<&MatchRecord> {
        self.by_video.get(video_id).map(|&i| &self.records[i])
    }

    /// Apply a review action. The stored record is replaced only when the
    /// transition succeeds.
    pub fn apply(&mut self, id: &RecordId, action: &ReviewAction) -> Result<&MatchRecord> {
        let index = *self
            .by_id
            .get(id)
            .ok_or_else(|| MaqamError::NotFound(format!("record {id}")))?;

        let next = transition(&self.records[index], action)?;
        self.records[index] = next;
        Ok(&self.records[index])
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &MatchRecord> {
        self.records.iter()
    }

    /// Records accepted into the dataset, in insertion order.
    pub fn included(&self) -> impl Iterator<Item = &MatchRecord> {
        self.records
            .iter()
            .filter(|r| r.review_status == ReviewStatus::Included)
    }

    /// Records passing `filter`, in insertion order.
    pub fn filtered<'a>(
        &'a self,
        filter: &'a RecordFilter,
    ) -> impl Iterator<Item = &'a MatchRecord> + 'a {
        self.records.iter().filter(move |r| filter.matches(r))
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in &self.records {
            match record.review_status {
                ReviewStatus::Pending => counts.pending += 1,
                ReviewStatus::Included => counts.included += 1,
                ReviewStatus::Excluded => counts.excluded += 1,
            }
            if record.needs_attention {
                counts.needs_attention += 1;
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<MatchRecord> {
        self.records
    }
}
