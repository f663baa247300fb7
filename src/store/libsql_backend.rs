//! libSQL backend. Async `RecordStore` implementation over a local file
//! or in-memory database.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use secrecy::SecretString;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::types::Category;
use crate::store::migrations;
use crate::store::traits::{Candidate, CategoryTally, EmailRecord, RecordOutcome, RecordStore};

/// libSQL store.
///
/// Holds a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(store.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(store.conn()).await?;
        Ok(store)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn get_candidate_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Candidate>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE external_id = ?1"),
                params![external_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_candidate_by_external_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let candidate = row_to_candidate(&row).map_err(|e| {
                    DatabaseError::Query(format!("get_candidate_by_external_id row parse: {e}"))
                })?;
                Ok(Some(candidate))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!(
                "get_candidate_by_external_id: {e}"
            ))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // SQLite datetime() output, with or without fractional seconds
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    tracing::warn!(value = %s, "Unparseable stored timestamp, substituting the epoch minimum");
    DateTime::<Utc>::MIN_UTC
}

/// Parse a stored category name; unknown strings fall back to `Other`.
fn parse_category(s: &str) -> Category {
    Category::parse(s).unwrap_or(Category::Other)
}

/// Convert `Option<&str>` to a libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to a Candidate.
///
/// Column order matches CANDIDATE_COLUMNS:
/// 0:id, 1:external_id, 2:email, 3:name, 4:access_token, 5:created_at, 6:updated_at
fn row_to_candidate(row: &libsql::Row) -> Result<Candidate, libsql::Error> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(5)?;
    let updated_str: String = row.get(6)?;

    Ok(Candidate {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        external_id: row.get(1)?,
        email: row.get(2)?,
        name: row.get(3).ok(),
        access_token: row.get::<String>(4).ok().map(SecretString::from),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to an EmailRecord.
///
/// Column order matches RECORD_COLUMNS:
/// 0:id, 1:candidate_id, 2:email_id, 3:subject, 4:sender, 5:category,
/// 6:draft_present, 7:received_at, 8:processed_at
fn row_to_record(row: &libsql::Row) -> Result<EmailRecord, libsql::Error> {
    let id_str: String = row.get(0)?;
    let candidate_str: String = row.get(1)?;
    let category_str: String = row.get(5)?;
    let draft_present: i64 = row.get(6)?;
    let received_str: String = row.get(7)?;
    let processed_str: String = row.get(8)?;

    Ok(EmailRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        candidate_id: Uuid::parse_str(&candidate_str).unwrap_or_else(|_| Uuid::nil()),
        email_id: row.get(2)?,
        subject: row.get(3)?,
        sender: row.get(4)?,
        category: parse_category(&category_str),
        draft_present: draft_present != 0,
        received_at: parse_datetime(&received_str),
        processed_at: parse_datetime(&processed_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const CANDIDATE_COLUMNS: &str =
    "id, external_id, email, name, access_token, created_at, updated_at";

const RECORD_COLUMNS: &str =
    "id, candidate_id, email_id, subject, sender, category, draft_present, received_at, processed_at";

#[async_trait]
impl RecordStore for LibSqlStore {
    // ── Candidates ──────────────────────────────────────────────────

    async fn upsert_candidate(
        &self,
        external_id: &str,
        email: &str,
        name: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<Candidate, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO candidates (id, external_id, email, name, access_token, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT (external_id) DO UPDATE SET
                 email = excluded.email,
                 name = COALESCE(excluded.name, candidates.name),
                 access_token = COALESCE(excluded.access_token, candidates.access_token),
                 updated_at = excluded.updated_at",
            params![
                Uuid::new_v4().to_string(),
                external_id,
                email,
                opt_text(name),
                opt_text(access_token),
                now,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("upsert_candidate: {e}")))?;

        // On conflict the stored id is the original one, so read the row back.
        self.get_candidate_by_external_id(external_id)
            .await?
            .ok_or_else(|| {
                DatabaseError::Query(format!(
                    "upsert_candidate: row for {external_id} missing after upsert"
                ))
            })
    }

    async fn get_candidate_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Candidate>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE email = ?1"),
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_candidate_by_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let candidate = row_to_candidate(&row).map_err(|e| {
                    DatabaseError::Query(format!("get_candidate_by_email row parse: {e}"))
                })?;
                Ok(Some(candidate))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_candidate_by_email: {e}"))),
        }
    }

    async fn list_candidates(&self) -> Result<Vec<Candidate>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CANDIDATE_COLUMNS} FROM candidates ORDER BY created_at ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_candidates: {e}")))?;

        let mut candidates = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_candidate(&row) {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => {
                    tracing::warn!("Skipping candidate row: {e}");
                }
            }
        }
        Ok(candidates)
    }

    // ── Records ─────────────────────────────────────────────────────

    async fn has_record(
        &self,
        candidate_id: Uuid,
        email_id: &str,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM email_records WHERE candidate_id = ?1 AND email_id = ?2",
                params![candidate_id.to_string(), email_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("has_record: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("has_record: {e}")))?;

        match row {
            Some(row) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count > 0)
            }
            None => Ok(false),
        }
    }

    async fn record_email(
        &self,
        candidate_id: Uuid,
        email_id: &str,
        subject: &str,
        sender: &str,
        category: Category,
        draft_present: bool,
        received_at: DateTime<Utc>,
    ) -> Result<RecordOutcome, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO email_records
                 (id, candidate_id, email_id, subject, sender, category, draft_present, received_at, processed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    Uuid::new_v4().to_string(),
                    candidate_id.to_string(),
                    email_id,
                    subject,
                    sender,
                    category.name(),
                    draft_present as i64,
                    received_at.to_rfc3339(),
                    now.clone(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_email: {e}")))?;

        if inserted == 0 {
            debug!(email_id = %email_id, "Record already present, tally untouched");
            return Ok(RecordOutcome::AlreadyRecorded);
        }

        // Two statements on one connection. A crash between them leaves the
        // tally one short until rebuild_tallies runs at the next startup.
        conn.execute(
            "INSERT INTO label_tallies (candidate_id, category, count, updated_at)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT (candidate_id, category) DO UPDATE SET
                 count = count + 1,
                 updated_at = excluded.updated_at",
            params![candidate_id.to_string(), category.name(), now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("record_email tally: {e}")))?;

        debug!(email_id = %email_id, category = %category, "Email recorded");
        Ok(RecordOutcome::Recorded)
    }

    async fn list_records(
        &self,
        candidate_id: Uuid,
        limit: usize,
    ) -> Result<Vec<EmailRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM email_records
                     WHERE candidate_id = ?1 ORDER BY processed_at DESC LIMIT ?2"
                ),
                params![candidate_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_records: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_record(&row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("Skipping record row: {e}");
                }
            }
        }
        Ok(records)
    }

    // ── Tallies ─────────────────────────────────────────────────────

    async fn category_tallies(
        &self,
        candidate_id: Uuid,
    ) -> Result<Vec<CategoryTally>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT category, count FROM label_tallies
                 WHERE candidate_id = ?1 ORDER BY category ASC",
                params![candidate_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("category_tallies: {e}")))?;

        let mut tallies = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let category_str: String = match row.get(0) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("Skipping tally row: {e}");
                    continue;
                }
            };
            let count: i64 = row.get(1).unwrap_or(0);
            tallies.push(CategoryTally {
                category: parse_category(&category_str),
                count,
            });
        }
        Ok(tallies)
    }

    async fn rebuild_tallies(&self) -> Result<(), DatabaseError> {
        self.conn()
            .execute_batch(
                "DELETE FROM label_tallies;
                 INSERT INTO label_tallies (candidate_id, category, count, updated_at)
                 SELECT candidate_id, category, COUNT(*), datetime('now')
                 FROM email_records
                 GROUP BY candidate_id, category;",
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("rebuild_tallies: {e}")))?;

        debug!("Category tallies rebuilt from records");
        Ok(())
    }
}
