//! Dataset export for reviewed sessions.
//!
//! Writes INCLUDED records as CSV rows pairing each cover with its effective
//! original. Files are UTF-8 with a byte-order mark so spreadsheet tools
//! detect the encoding, and titles are written verbatim.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use maqam_shared::{MaqamError, MatchRecord, Result, ReviewStatus, watch_url};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Column order of the exported file.
pub const HEADER: [&str; 9] = [
    "cover_video_id",
    "cover_url",
    "cover_title",
    "classification",
    "original_video_id",
    "original_url",
    "original_title",
    "confidence_score",
    "decision_source",
];

/// One exported cover/original pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub cover_video_id: String,
    pub cover_url: String,
    pub cover_title: String,
    pub classification: &'static str,
    pub original_video_id: String,
    pub original_url: String,
    pub original_title: String,
    pub confidence_score: String,
    pub decision_source: &'static str,
}

impl ExportRow {
    /// Row for an INCLUDED record, or `None` for anything else.
    pub fn from_record(record: &MatchRecord) -> Option<Self> {
        if record.review_status != ReviewStatus::Included {
            return None;
        }
        let original = record.effective_candidate()?;

        Some(Self {
            cover_video_id: record.cover.id.clone(),
            cover_url: watch_url(&record.cover.id),
            cover_title: record.cover.title.clone(),
            classification: record.classification.as_str(),
            original_video_id: original.id.clone(),
            original_url: watch_url(&original.id),
            original_title: original.title.clone(),
            confidence_score: format!("{:.4}", record.confidence),
            decision_source: record.decision_source.as_str(),
        })
    }
}

/// What an export wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows_written: usize,
    /// Records that were not INCLUDED.
    pub records_skipped: usize,
    /// Hex SHA-256 of the written file.
    pub sha256: String,
}

/// Render records to CSV bytes, BOM included.
pub fn render<'a, I>(records: I) -> Result<(Vec<u8>, usize, usize)>
where
    I: IntoIterator<Item = &'a MatchRecord>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(UTF8_BOM.to_vec());
    writer.write_record(HEADER).map_err(csv_error)?;

    let mut written = 0;
    let mut skipped = 0;
    for record in records {
        match ExportRow::from_record(record) {
            Some(row) => {
                writer.serialize(&row).map_err(csv_error)?;
                written += 1;
            }
            None => {
                if record.review_status == ReviewStatus::Included {
                    warn!(record = %record.id, "included record has no original, skipping");
                }
                skipped += 1;
            }
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| MaqamError::Export(format!("failed to flush CSV: {e}")))?;
    Ok((bytes, written, skipped))
}

/// Write the dataset CSV to `path`.
///
/// The file is written to a temp sibling and renamed into place, so an
/// existing export is never left half-written.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn export_csv<'a, I>(records: I, path: &Path) -> Result<ExportSummary>
where
    I: IntoIterator<Item = &'a MatchRecord>,
{
    let (bytes, rows_written, records_skipped) = render(records)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| MaqamError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| MaqamError::Export(format!("not a file path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

    std::fs::write(&temp, &bytes).map_err(|e| MaqamError::io(&temp, e))?;
    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(MaqamError::io(path, e));
    }

    let sha256 = format!("{:x}", Sha256::digest(&bytes));
    debug!(size = bytes.len(), "wrote export");
    info!(rows = rows_written, skipped = records_skipped, "export complete");

    Ok(ExportSummary {
        path: path.to_path_buf(),
        rows_written,
        records_skipped,
        sha256,
    })
}

fn csv_error(e: csv::Error) -> MaqamError {
    MaqamError::Export(format!("failed to write CSV: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use maqam_shared::{
        Candidate, Classification, DecisionSource, RecordId, ScoreBreakdown, VideoMetadata,
    };

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("maqam-export-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn record(cover_id: &str, title: &str, status: ReviewStatus) -> MatchRecord {
        let now = Utc::now();
        MatchRecord {
            id: RecordId::new(),
            cover: VideoMetadata {
                id: cover_id.into(),
                title: title.into(),
                duration_secs: 180,
                channel: "Keys".into(),
                published_at: None,
            },
            classification: Classification::Full,
            normalized_query: "q".into(),
            best_candidate: Some(Candidate {
                id: format!("orig-{cover_id}"),
                title: "اغنية حب - Official".into(),
                channel: "Label".into(),
                duration_secs: Some(200),
                rank: 0,
            }),
            confidence: 0.81234,
            breakdown: ScoreBreakdown::default(),
            decision_source: DecisionSource::Automatic,
            review_status: status,
            override_candidate: None,
            needs_attention: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn only_included_records_are_written() {
        let records = vec![
            record("a", "A (Piano Cover)", ReviewStatus::Included),
            record("b", "B (Piano Cover)", ReviewStatus::Pending),
            record("c", "C (Piano Cover)", ReviewStatus::Excluded),
        ];
        let tmp = temp_dir();
        let path = tmp.join("dataset.csv");

        let summary = export_csv(&records, &path).unwrap();
        assert_eq!(summary.rows_written, 1);
        assert_eq!(summary.records_skipped, 2);
        assert_eq!(summary.sha256.len(), 64);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.trim_start_matches('\u{feff}').lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], HEADER.join(","));
        assert!(lines[1].starts_with("a,https://www.youtube.com/watch?v=a,"));
        assert!(lines[1].ends_with(",0.8123,AUTOMATIC"));
    }

    #[test]
    fn arabic_text_is_preserved_byte_for_byte() {
        let title = "اغنية حب (Piano Cover) عزف بيانو";
        let records = vec![record("ar", title, ReviewStatus::Included)];
        let tmp = temp_dir();
        let path = tmp.join("ar.csv");

        export_csv(&records, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();

        assert!(bytes.starts_with(UTF8_BOM));
        let haystack = &bytes[..];
        for needle in [title.as_bytes(), "اغنية حب - Official".as_bytes()] {
            assert!(haystack.windows(needle.len()).any(|w| w == needle));
        }
    }

    #[test]
    fn override_is_exported_as_original() {
        let mut r = record("a", "A", ReviewStatus::Included);
        r.override_candidate = Some(Candidate {
            id: "manual1".into(),
            title: "(manual)".into(),
            channel: String::new(),
            duration_secs: None,
            rank: 0,
        });
        r.decision_source = DecisionSource::HumanOverride;

        let row = ExportRow::from_record(&r).unwrap();
        assert_eq!(row.original_video_id, "manual1");
        assert_eq!(row.original_url, "https://www.youtube.com/watch?v=manual1");
        assert_eq!(row.decision_source, "HUMAN_OVERRIDE");
    }

    #[test]
    fn titles_with_commas_and_quotes_are_quoted() {
        let records = vec![record("q", "Hello, \"World\"", ReviewStatus::Included)];
        let (bytes, written, _) = render(&records).unwrap();
        assert_eq!(written, 1);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"Hello, \"\"World\"\"\""));
    }

    #[test]
    fn empty_export_still_has_header() {
        let tmp = temp_dir();
        let path = tmp.join("nested/dir/empty.csv");
        let summary = export_csv(std::iter::empty::<&MatchRecord>(), &path).unwrap();
        assert_eq!(summary.rows_written, 0);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim_start_matches('\u{feff}').trim_end(), HEADER.join(","));
    }

    #[test]
    fn export_leaves_no_temp_files() {
        let records = vec![record("a", "A", ReviewStatus::Included)];
        let tmp = temp_dir();
        let path = tmp.join("dataset.csv");
        export_csv(&records, &path).unwrap();
        export_csv(&records, &path).unwrap();

        let names: Vec<String> = std::fs::read_dir(&tmp)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["dataset.csv".to_string()]);
    }
}
