//! `RecordStore` trait. Single async interface for all persistence.
//!
//! Covers the candidate roster, per-email processing records, and the
//! per-category tallies derived from them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::types::Category;

/// A monitored account whose mailbox the pipeline processes.
///
/// Rows come from two places: the bootstrap account configured in the
/// environment, and contacts pulled from the CRM. Only rows with an
/// access token are processable.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: Uuid,
    /// Stable id from the originating system (CRM contact id, or the
    /// address itself for the bootstrap account).
    pub external_id: String,
    pub email: String,
    pub name: Option<String>,
    /// Mailbox access token. Absent for roster-only rows.
    pub access_token: Option<SecretString>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted processing outcome for one email.
///
/// Append-only; at most one row per (candidate, email id).
#[derive(Debug, Clone)]
pub struct EmailRecord {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub email_id: String,
    pub subject: String,
    pub sender: String,
    pub category: Category,
    pub draft_present: bool,
    pub received_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
}

/// Running count of records in one category for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryTally {
    pub category: Category,
    pub count: i64,
}

/// Result of a `record_email` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First time this (candidate, email id) pair was seen; the tally
    /// was incremented.
    Recorded,
    /// A row already existed; nothing changed.
    AlreadyRecorded,
}

/// Backend-agnostic store covering candidates, records, and tallies.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ── Candidates ──────────────────────────────────────────────────

    /// Insert a candidate or update the existing row with the same
    /// external id. A `None` name or token never clobbers a stored one.
    async fn upsert_candidate(
        &self,
        external_id: &str,
        email: &str,
        name: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<Candidate, DatabaseError>;

    /// Look up a candidate by mailbox address.
    async fn get_candidate_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Candidate>, DatabaseError>;

    /// All candidates, oldest first.
    async fn list_candidates(&self) -> Result<Vec<Candidate>, DatabaseError>;

    // ── Records ─────────────────────────────────────────────────────

    /// Whether a record already exists for this (candidate, email id).
    async fn has_record(&self, candidate_id: Uuid, email_id: &str)
        -> Result<bool, DatabaseError>;

    /// Append a processing record and bump the matching tally.
    ///
    /// Re-recording the same (candidate, email id) is a detected no-op
    /// and returns `AlreadyRecorded` without touching the tally.
    async fn record_email(
        &self,
        candidate_id: Uuid,
        email_id: &str,
        subject: &str,
        sender: &str,
        category: Category,
        draft_present: bool,
        received_at: DateTime<Utc>,
    ) -> Result<RecordOutcome, DatabaseError>;

    /// Most recent records for a candidate, newest first.
    async fn list_records(
        &self,
        candidate_id: Uuid,
        limit: usize,
    ) -> Result<Vec<EmailRecord>, DatabaseError>;

    // ── Tallies ─────────────────────────────────────────────────────

    /// Per-category counts for one candidate.
    async fn category_tallies(
        &self,
        candidate_id: Uuid,
    ) -> Result<Vec<CategoryTally>, DatabaseError>;

    /// Recompute every tally from the records table.
    ///
    /// Run at startup only. Repairs the window where a record landed
    /// but the process died before the tally bump.
    async fn rebuild_tallies(&self) -> Result<(), DatabaseError>;
}
