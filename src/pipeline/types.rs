//! Shared types for the email triage pipeline.

use chrono::{DateTime, Utc};

// ── Email message ───────────────────────────────────────────────────

/// A single email as fetched from the mail provider.
///
/// Immutable once fetched; the pipeline only reads it. The body may be
/// a snippet if the provider truncates long messages.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    /// Provider-assigned unique id.
    pub id: String,
    /// Provider thread id, when the provider groups messages into threads.
    pub thread_id: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Sender address: "recruiter@example.com" or "Name <addr>".
    pub sender: String,
    /// Plain-text body.
    pub body: String,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
}

// ── Category ────────────────────────────────────────────────────────

/// Closed set of triage categories.
///
/// Exactly one category is assigned per email. `Other` is the fallback
/// for emails no rule matches and for delegated answers that are not a
/// recognized category name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Application,
    Interview,
    Offer,
    Rejection,
    Networking,
    Other,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 6] = [
        Category::Application,
        Category::Interview,
        Category::Offer,
        Category::Rejection,
        Category::Networking,
        Category::Other,
    ];

    /// Display name, also used as the provider label name.
    pub fn name(&self) -> &'static str {
        match self {
            Category::Application => "Application",
            Category::Interview => "Interview",
            Category::Offer => "Offer",
            Category::Rejection => "Rejection",
            Category::Networking => "Networking",
            Category::Other => "Other",
        }
    }

    /// Parse a category from its exact name, ignoring surrounding
    /// whitespace. Anything else (including case variations) is `None`,
    /// so unrecognized model answers fall back to `Other` at the caller.
    pub fn parse(s: &str) -> Option<Category> {
        let s = s.trim();
        Category::ALL.iter().copied().find(|c| c.name() == s)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Classifier verdict for one email. Transient; lives only within a
/// single processing pass.
#[derive(Debug, Clone)]
pub struct Classification {
    /// The assigned category.
    pub category: Category,
    /// Raw model output, when a delegated classifier produced the verdict.
    pub raw_output: Option<String>,
}

impl Classification {
    /// Verdict from the rule-based strategy (no model output).
    pub fn rule(category: Category) -> Self {
        Self {
            category,
            raw_output: None,
        }
    }

    /// Verdict from the delegated strategy, keeping the raw answer.
    pub fn delegated(category: Category, raw: impl Into<String>) -> Self {
        Self {
            category,
            raw_output: Some(raw.into()),
        }
    }
}

// ── Response draft ──────────────────────────────────────────────────

/// An unsent reply prepared for a classified email.
#[derive(Debug, Clone)]
pub struct ResponseDraft {
    /// Recipient address (the original sender).
    pub recipient: String,
    /// Reply subject.
    pub subject: String,
    /// Draft body, as returned by the completion service and trimmed.
    pub body: String,
}

impl ResponseDraft {
    /// Build a reply addressed to the email's sender with a `Re:` subject.
    pub fn reply_to(email: &EmailMessage, body: String) -> Self {
        Self {
            recipient: email.sender.clone(),
            subject: format!("Re: {}", email.subject),
            body,
        }
    }
}

// ── Route outcomes ──────────────────────────────────────────────────

/// Result of the label-apply side effect.
#[derive(Debug, Clone)]
pub enum LabelOutcome {
    /// Label applied; carries the provider's label id.
    Applied { label_id: String },
    /// Label could not be resolved or applied.
    Failed { reason: String },
}

/// Result of the draft side effect.
#[derive(Debug, Clone)]
pub enum DraftOutcome {
    /// A draft was generated and stored with the provider.
    Drafted(ResponseDraft),
    /// Category is `Other`, so drafting is never attempted.
    NotNeeded,
    /// No template is configured for this category.
    NoTemplate,
    /// Generation or draft creation failed; treated as "no draft".
    Failed { reason: String },
}

impl DraftOutcome {
    /// Whether a draft actually exists with the provider.
    pub fn drafted(&self) -> bool {
        matches!(self, DraftOutcome::Drafted(_))
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            DraftOutcome::Drafted(_) => "drafted",
            DraftOutcome::NotNeeded => "not_needed",
            DraftOutcome::NoTemplate => "no_template",
            DraftOutcome::Failed { .. } => "failed",
        }
    }
}

/// Combined result of routing one classified email. Label and draft are
/// independent side effects, so both outcomes are reported.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub label: LabelOutcome,
    pub draft: DraftOutcome,
}

// ── Processed email ─────────────────────────────────────────────────

/// Result of running one email through the full pipeline.
#[derive(Debug, Clone)]
pub struct ProcessedEmail {
    /// The original email.
    pub email: EmailMessage,
    /// The assigned category.
    pub category: Category,
    /// Outcome of the label side effect.
    pub label: LabelOutcome,
    /// Outcome of the draft side effect.
    pub draft: DraftOutcome,
    /// When processing completed.
    pub processed_at: DateTime<Utc>,
}
