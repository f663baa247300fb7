//! Mail provider integration.
//!
//! The pipeline reaches the mailbox through the `Mailbox` trait; `gmail`
//! holds the Gmail REST implementation.

pub mod gmail;

pub use gmail::GmailMailbox;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::MailError;
use crate::pipeline::types::{EmailMessage, ResponseDraft};

// ── Query ───────────────────────────────────────────────────────────

/// Time window one run covers, from the entry-point argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Today,
    Yesterday,
    LastWeek,
}

impl TimeRange {
    /// Parse the entry-point argument.
    pub fn parse(s: &str) -> Option<TimeRange> {
        match s.trim().to_lowercase().as_str() {
            "today" => Some(TimeRange::Today),
            "yesterday" => Some(TimeRange::Yesterday),
            "last_week" | "last-week" => Some(TimeRange::LastWeek),
            _ => None,
        }
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            TimeRange::Today => "today",
            TimeRange::Yesterday => "yesterday",
            TimeRange::LastWeek => "last_week",
        }
    }

    /// Date window as (start inclusive, end exclusive). A `None` end
    /// means "up to now".
    pub fn bounds(&self, now: DateTime<Utc>) -> (NaiveDate, Option<NaiveDate>) {
        let today = now.date_naive();
        match self {
            TimeRange::Today => (today, None),
            TimeRange::Yesterday => (today - chrono::Duration::days(1), Some(today)),
            TimeRange::LastWeek => (today - chrono::Duration::days(7), None),
        }
    }
}

/// Which messages one run asks the provider for.
#[derive(Debug, Clone, Copy)]
pub struct MailQuery {
    pub range: TimeRange,
    pub unread_only: bool,
}

/// A provider-side label.
#[derive(Debug, Clone)]
pub struct MailLabel {
    pub id: String,
    pub name: String,
}

// ── Mailbox trait ───────────────────────────────────────────────────

/// The mail provider boundary: pure I/O, no triage logic.
///
/// One instance represents one authenticated account session.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// List ids of messages matching the query.
    async fn list_message_ids(&self, query: &MailQuery) -> Result<Vec<String>, MailError>;

    /// Fetch one full message. Messages missing required headers
    /// (Subject, From) are a `MailError::MalformedMessage`.
    async fn fetch_message(&self, id: &str) -> Result<EmailMessage, MailError>;

    /// All labels visible to the account.
    async fn list_labels(&self) -> Result<Vec<MailLabel>, MailError>;

    /// Create a label, returning it with the provider-assigned id.
    async fn create_label(&self, name: &str) -> Result<MailLabel, MailError>;

    /// Add and remove labels on a message.
    async fn modify_labels(
        &self,
        message_id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), MailError>;

    /// Store an unsent reply draft with the provider; returns the draft
    /// id. `thread_id` attaches the draft to an existing conversation.
    async fn create_draft(
        &self,
        draft: &ResponseDraft,
        thread_id: Option<&str>,
    ) -> Result<String, MailError>;
}
