//! Per-account batch processing.
//!
//! Drives each listed email through the full pipeline:
//! 1. Idempotency check against the record store (before any side effect)
//! 2. `fetch_message()` from the mailbox
//! 3. `classify()` (rules or delegated)
//! 4. `route()` (label apply + optional reply draft)
//! 5. `record_email()` (persistent record + tally bump)
//!
//! One email's failure never aborts the batch: the error is logged, the
//! email stays unrecorded, and the next run picks it up again.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::error::PipelineError;
use crate::mail::{MailQuery, Mailbox};
use crate::pipeline::classifier::Classifier;
use crate::pipeline::router::Router;
use crate::pipeline::types::{Category, LabelOutcome, ProcessedEmail};
use crate::store::{Candidate, RecordStore};

/// Per-account batch results.
#[derive(Debug, Default, Clone)]
pub struct AccountSummary {
    /// Emails fully processed and recorded this run.
    pub processed: usize,
    /// Emails skipped because a record already existed.
    pub skipped_duplicates: usize,
    /// Emails that stalled at the label step. Not recorded, so the next
    /// run retries them.
    pub label_failures: usize,
    /// Reply drafts stored with the provider.
    pub drafts_created: usize,
    /// Emails that failed at any stage this run.
    pub failed: usize,
    /// Processed counts by category, this run only.
    pub by_category: BTreeMap<Category, usize>,
}

impl AccountSummary {
    /// Per-category counts as a compact log field, e.g. `Interview=2 Offer=1`.
    pub fn categories_label(&self) -> String {
        format_categories(&self.by_category)
    }
}

/// Whole-run totals across accounts.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub accounts: usize,
    pub processed: usize,
    pub skipped_duplicates: usize,
    pub label_failures: usize,
    pub drafts_created: usize,
    pub failed: usize,
    pub by_category: BTreeMap<Category, usize>,
}

impl RunSummary {
    /// Fold one account's results into the run totals.
    pub fn absorb(&mut self, account: &AccountSummary) {
        self.accounts += 1;
        self.processed += account.processed;
        self.skipped_duplicates += account.skipped_duplicates;
        self.label_failures += account.label_failures;
        self.drafts_created += account.drafts_created;
        self.failed += account.failed;
        for (category, count) in &account.by_category {
            *self.by_category.entry(*category).or_insert(0) += count;
        }
    }

    /// Per-category counts as a compact log field, e.g. `Interview=2 Offer=1`.
    pub fn categories_label(&self) -> String {
        format_categories(&self.by_category)
    }
}

fn format_categories(by_category: &BTreeMap<Category, usize>) -> String {
    by_category
        .iter()
        .map(|(category, count)| format!("{category}={count}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs the triage pipeline for one account's mailbox.
///
/// Built per account: the router's label-id cache is scoped to a single
/// provider session.
pub struct EmailProcessor {
    mailbox: Arc<dyn Mailbox>,
    classifier: Arc<dyn Classifier>,
    router: Router,
    store: Arc<dyn RecordStore>,
}

impl EmailProcessor {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        classifier: Arc<dyn Classifier>,
        router: Router,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            mailbox,
            classifier,
            router,
            store,
        }
    }

    /// Process every message the query matches, one at a time.
    pub async fn process_account(
        &mut self,
        candidate: &Candidate,
        query: &MailQuery,
    ) -> AccountSummary {
        let mut summary = AccountSummary::default();

        let ids = match self.mailbox.list_message_ids(query).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(account = %candidate.email, error = %e, "Failed to list messages");
                return summary;
            }
        };

        if ids.is_empty() {
            info!(account = %candidate.email, "No messages in range");
            return summary;
        }

        info!(
            account = %candidate.email,
            count = ids.len(),
            classifier = self.classifier.name(),
            "Processing message batch"
        );

        for id in ids {
            match self.process_email(candidate, &id).await {
                Ok(Some(processed)) => {
                    summary.processed += 1;
                    if processed.draft.drafted() {
                        summary.drafts_created += 1;
                    }
                    *summary.by_category.entry(processed.category).or_insert(0) += 1;
                    debug!(
                        id = %id,
                        category = %processed.category,
                        draft = processed.draft.label(),
                        "Email processed"
                    );
                }
                Ok(None) => {
                    summary.skipped_duplicates += 1;
                    debug!(id = %id, "Already recorded, skipping");
                }
                Err(e) => {
                    if matches!(e, PipelineError::Label(_)) {
                        summary.label_failures += 1;
                    }
                    summary.failed += 1;
                    // Not recorded; picked up again on the next run.
                    error!(id = %id, error = %e, "Failed to process email");
                }
            }
        }

        info!(
            account = %candidate.email,
            processed = summary.processed,
            skipped = summary.skipped_duplicates,
            label_failures = summary.label_failures,
            drafts = summary.drafts_created,
            failed = summary.failed,
            categories = %summary.categories_label(),
            "Account batch complete"
        );

        summary
    }

    /// Run one email through the pipeline.
    ///
    /// Returns `Ok(None)` when a record already exists; the check runs
    /// before any side effect so reprocessing is a true no-op.
    async fn process_email(
        &mut self,
        candidate: &Candidate,
        email_id: &str,
    ) -> Result<Option<ProcessedEmail>, PipelineError> {
        let seen = self
            .store
            .has_record(candidate.id, email_id)
            .await
            .map_err(|e| PipelineError::Record(format!("idempotency check: {e}")))?;
        if seen {
            return Ok(None);
        }

        let email = self
            .mailbox
            .fetch_message(email_id)
            .await
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;

        let classification = self.classifier.classify(&email.subject, &email.body).await;
        let category = classification.category;

        let outcome = self.router.route(&email, category).await;

        // A label failure leaves the email unrecorded so the next run
        // retries it from the start. A draft stored before the failure
        // is not rolled back.
        if let LabelOutcome::Failed { reason } = &outcome.label {
            return Err(PipelineError::Label(reason.clone()));
        }

        self.store
            .record_email(
                candidate.id,
                email_id,
                &email.subject,
                &email.sender,
                category,
                outcome.draft.drafted(),
                email.received_at,
            )
            .await
            .map_err(|e| PipelineError::Record(e.to_string()))?;

        Ok(Some(ProcessedEmail {
            email,
            category,
            label: outcome.label,
            draft: outcome.draft,
            processed_at: Utc::now(),
        }))
    }
}
