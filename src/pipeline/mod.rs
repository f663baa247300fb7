//! Email triage pipeline.
//!
//! Every email from a listed account flows through:
//! 1. `Mailbox::fetch_message()` for provider I/O
//! 2. `Classifier::classify()` for keyword rules or delegated categorization
//! 3. `Router::route()` for the label apply plus optional reply draft
//! 4. `RecordStore::record_email()` for the idempotent record and tally bump
//!
//! Drafts are stored unsent. Nothing in the pipeline sends mail.

pub mod classifier;
pub mod processor;
pub mod router;
pub mod templates;
pub mod types;

pub use classifier::{Classifier, KeywordClassifier, LlmClassifier, MatchMode};
pub use processor::{AccountSummary, EmailProcessor, RunSummary};
pub use router::Router;
pub use templates::TemplateSet;
pub use types::{Category, Classification, EmailMessage, ResponseDraft};
