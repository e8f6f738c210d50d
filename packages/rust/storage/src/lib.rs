//! libSQL storage for curation sessions.
//!
//! The [`Storage`] struct wraps an embedded libSQL database holding curation
//! sessions and their match records. A session's records are written in one
//! transaction, so a session is never persisted half-decided; review actions
//! then update records one at a time.
//!
//! **Access rules:**
//! - `maqam match` / `maqam review`: read-write via [`Storage::open`]
//! - `maqam export` / listings: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};

use maqam_shared::{MaqamError, MatchRecord, Result, SessionId};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// A stored curation session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of match records in the session.
    pub record_count: usize,
}

fn storage_err(e: impl std::fmt::Display) -> MaqamError {
    MaqamError::Storage(e.to_string())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| MaqamError::Storage(format!("bad timestamp '{s}': {e}")))
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| MaqamError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MaqamError::NotFound(format!(
                "session database {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        MaqamError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(MaqamError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Session operations
    // -----------------------------------------------------------------------

    /// Insert a new, empty session.
    pub async fn insert_session(&self, id: &SessionId, source_url: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO sessions (id, source_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), source_url, now.as_str(), now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Get a session by id.
    pub async fn get_session(&self, id: &SessionId) -> Result<Option<SessionSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT s.id, s.source_url, s.created_at, s.updated_at, COUNT(r.id)
                 FROM sessions s LEFT JOIN match_records r ON r.session_id = s.id
                 WHERE s.id = ?1
                 GROUP BY s.id",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(session_from_row(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// List all sessions, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT s.id, s.source_url, s.created_at, s.updated_at, COUNT(r.id)
                 FROM sessions s LEFT JOIN match_records r ON r.session_id = s.id
                 GROUP BY s.id
                 ORDER BY s.created_at DESC, s.id DESC",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(session_from_row(&row)?);
        }
        Ok(results)
    }

    /// The most recently created session, if any.
    pub async fn latest_session(&self) -> Result<Option<SessionSummary>> {
        Ok(self.list_sessions().await?.into_iter().next())
    }

    // -----------------------------------------------------------------------
    // Record operations
    // -----------------------------------------------------------------------

    /// Persist a session and all of its records in a single transaction.
    ///
    /// Either the whole session is stored or nothing is.
    pub async fn save_session_records(
        &self,
        id: &SessionId,
        source_url: &str,
        records: &[MatchRecord],
    ) -> Result<()> {
        self.check_writable()?;
        for record in records {
            record.validate()?;
        }

        let now = Utc::now().to_rfc3339();
        let session_id = id.to_string();

        let tx = self.conn.transaction().await.map_err(storage_err)?;

        let written = async {
            tx.execute(
                "INSERT INTO sessions (id, source_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
                params![session_id.as_str(), source_url, now.as_str(), now.as_str()],
            )
            .await
            .map_err(storage_err)?;

            for (position, record) in records.iter().enumerate() {
                let json = serde_json::to_string(record).map_err(storage_err)?;
                tx.execute(
                    "INSERT INTO match_records
                       (id, session_id, cover_video_id, position, record_json,
                        review_status, decision_source, confidence, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        record.id.to_string(),
                        session_id.as_str(),
                        record.cover.id.as_str(),
                        position as i64,
                        json,
                        record.review_status.as_str(),
                        record.decision_source.as_str(),
                        record.confidence,
                        record.updated_at.to_rfc3339(),
                    ],
                )
                .await
                .map_err(storage_err)?;
            }
            Ok::<(), MaqamError>(())
        }
        .await;

        if let Err(e) = written {
            let _ = tx.rollback().await;
            return Err(e);
        }
        tx.commit().await.map_err(storage_err)?;

        tracing::debug!(session = %id, records = records.len(), "saved session records");
        Ok(())
    }

    /// Replace a stored record after a review action.
    pub async fn update_record(&self, session_id: &SessionId, record: &MatchRecord) -> Result<()> {
        self.check_writable()?;
        record.validate()?;

        let json = serde_json::to_string(record).map_err(storage_err)?;
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction().await.map_err(storage_err)?;

        let changed = tx
            .execute(
                "UPDATE match_records
                 SET record_json = ?1, review_status = ?2, decision_source = ?3,
                     confidence = ?4, updated_at = ?5
                 WHERE id = ?6 AND session_id = ?7",
                params![
                    json,
                    record.review_status.as_str(),
                    record.decision_source.as_str(),
                    record.confidence,
                    record.updated_at.to_rfc3339(),
                    record.id.to_string(),
                    session_id.to_string(),
                ],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            let _ = tx.rollback().await;
            return Err(MaqamError::NotFound(format!(
                "record {} in session {session_id}",
                record.id
            )));
        }

        tx.execute(
            "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
            params![now.as_str(), session_id.to_string()],
        )
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    /// Load a session's records in their original order.
    ///
    /// Every record is checked against the [`MatchRecord`] invariants; a
    /// record that fails is a storage error, not silently dropped.
    pub async fn load_records(&self, session_id: &SessionId) -> Result<Vec<MatchRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT record_json FROM match_records
                 WHERE session_id = ?1
                 ORDER BY position",
                params![session_id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let json = row.get::<String>(0).map_err(storage_err)?;
            let record: MatchRecord = serde_json::from_str(&json)
                .map_err(|e| MaqamError::Storage(format!("corrupt record JSON: {e}")))?;
            record.validate().map_err(|e| {
                MaqamError::Storage(format!("stored record failed validation: {e}"))
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

fn session_from_row(row: &libsql::Row) -> Result<SessionSummary> {
    let id = row.get::<String>(0).map_err(storage_err)?;
    let created_at = row.get::<String>(2).map_err(storage_err)?;
    let updated_at = row.get::<String>(3).map_err(storage_err)?;

    Ok(SessionSummary {
        id: id
            .parse()
            .map_err(|e| MaqamError::Storage(format!("bad session id '{id}': {e}")))?,
        source_url: row.get::<String>(1).map_err(storage_err)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        record_count: usize::try_from(row.get::<i64>(4).map_err(storage_err)?).unwrap_or(0),
    })
}
