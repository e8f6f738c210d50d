//! SQL migration definitions for the Maqam session database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: sessions, match_records",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One curation run over a playlist/channel/video URL
CREATE TABLE IF NOT EXISTS sessions (
    id          TEXT PRIMARY KEY,
    source_url  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- Match records; the full record lives in record_json, the other columns
-- are denormalized for listing and filtering.
CREATE TABLE IF NOT EXISTS match_records (
    id               TEXT PRIMARY KEY,
    session_id       TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    cover_video_id   TEXT NOT NULL,
    position         INTEGER NOT NULL,
    record_json      TEXT NOT NULL,
    review_status    TEXT NOT NULL,
    decision_source  TEXT NOT NULL,
    confidence       REAL NOT NULL,
    updated_at       TEXT NOT NULL,
    UNIQUE(session_id, cover_video_id)
);

CREATE INDEX IF NOT EXISTS idx_records_session ON match_records(session_id, position);
CREATE INDEX IF NOT EXISTS idx_records_status ON match_records(session_id, review_status);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
