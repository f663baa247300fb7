//! Email classifiers: keyword rules and completion-service delegation.
//!
//! Two interchangeable strategies behind the `Classifier` trait:
//! - `KeywordClassifier`: ordered category rules, first match wins
//! - `LlmClassifier`: asks the completion service for a bare category name
//!
//! Classification never fails. Remote errors and unrecognized answers
//! fall back to `Category::Other` at this boundary.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::llm::{CompletionProvider, CompletionRequest};
use crate::pipeline::types::{Category, Classification};

/// Temperature for the categorization call (kept low for stable answers).
pub const CATEGORIZE_TEMPERATURE: f32 = 0.3;

/// Max tokens for the categorization call; the answer is one word.
pub const CATEGORIZE_MAX_TOKENS: u32 = 50;

/// How many body characters the categorization prompt includes.
const CATEGORIZE_BODY_CHARS: usize = 1000;

/// A strategy that assigns a category to an email's text.
///
/// Strategies are pure with respect to their inputs; the delegated one
/// has only the remote-call side channel.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Strategy name for logging.
    fn name(&self) -> &str;

    /// Assign a category to the given subject and body.
    async fn classify(&self, subject: &str, body: &str) -> Classification;
}

// ── Rule-based strategy ─────────────────────────────────────────────

/// How keywords are matched against the email text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Keyword must appear with word boundaries on both sides.
    WholeWord,
    /// Keyword may appear anywhere, including inside another word.
    Substring,
}

impl MatchMode {
    /// Parse a configuration value ("whole_word" or "substring").
    pub fn parse(s: &str) -> Option<MatchMode> {
        match s.trim().to_lowercase().as_str() {
            "whole_word" | "whole-word" | "word" => Some(MatchMode::WholeWord),
            "substring" => Some(MatchMode::Substring),
            _ => None,
        }
    }
}

/// One category's trigger keywords, with per-keyword compiled patterns.
#[derive(Debug, Clone)]
struct CategoryRule {
    category: Category,
    /// Lower-cased keywords, checked individually.
    keywords: Vec<String>,
    /// Whole-word pattern per keyword, same order as `keywords`.
    patterns: Vec<Regex>,
}

impl CategoryRule {
    fn new(category: Category, keywords: &[&str]) -> Self {
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        let patterns = keywords
            .iter()
            .map(|k| {
                // regex::escape produces a literal, so the pattern is always valid.
                Regex::new(&format!(r"\b{}\b", regex::escape(k))).unwrap()
            })
            .collect();
        Self {
            category,
            keywords,
            patterns,
        }
    }

    fn matches(&self, text: &str, mode: MatchMode) -> bool {
        match mode {
            MatchMode::WholeWord => self.patterns.iter().any(|p| p.is_match(text)),
            MatchMode::Substring => self.keywords.iter().any(|k| text.contains(k.as_str())),
        }
    }
}

/// Deterministic keyword classifier.
///
/// Holds an ordered list of (category, keywords) rules. The email's
/// subject and body are lower-cased and concatenated; rules are checked
/// in order and the first category with any matching keyword wins. The
/// order is therefore the tie-break when several categories' keywords
/// appear in one email.
pub struct KeywordClassifier {
    rules: Vec<CategoryRule>,
    mode: MatchMode,
}

impl KeywordClassifier {
    /// Classifier with the default recruiting rule set.
    ///
    /// Priority order: Offer, Rejection, Interview, Application,
    /// Networking. Rejection before Interview means "unfortunately ...
    /// after your interview" resolves to Rejection.
    pub fn default_rules(mode: MatchMode) -> Self {
        let rules = vec![
            CategoryRule::new(
                Category::Offer,
                &["offer", "compensation", "salary", "pleased to extend"],
            ),
            CategoryRule::new(
                Category::Rejection,
                &[
                    "unfortunately",
                    "regret to inform",
                    "not selected",
                    "other candidates",
                    "not moving forward",
                ],
            ),
            CategoryRule::new(
                Category::Interview,
                &[
                    "interview",
                    "schedule a call",
                    "phone screen",
                    "availability",
                ],
            ),
            CategoryRule::new(
                Category::Application,
                &[
                    "thank you for applying",
                    "application received",
                    "we received your application",
                    "your application",
                ],
            ),
            CategoryRule::new(
                Category::Networking,
                &["coffee chat", "networking", "introduction", "referral"],
            ),
        ];
        Self { rules, mode }
    }

    /// Classifier with no rules (everything becomes `Other`).
    pub fn empty(mode: MatchMode) -> Self {
        Self {
            rules: Vec::new(),
            mode,
        }
    }

    /// Append a rule. Later rules lose ties against earlier ones.
    pub fn add_rule(&mut self, category: Category, keywords: &[&str]) {
        self.rules.push(CategoryRule::new(category, keywords));
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn classify(&self, subject: &str, body: &str) -> Classification {
        let text = format!("{} {}", subject, body).to_lowercase();

        for rule in &self.rules {
            if rule.matches(&text, self.mode) {
                debug!(category = %rule.category, "Keyword rule matched");
                return Classification::rule(rule.category);
            }
        }

        Classification::rule(Category::Other)
    }
}

// ── Delegated strategy ──────────────────────────────────────────────

/// Classifier that delegates to a text-completion service.
///
/// The prompt constrains the answer to a bare category name. Anything
/// else, and any remote failure, becomes `Other` here rather than
/// propagating.
pub struct LlmClassifier {
    completions: Arc<dyn CompletionProvider>,
}

impl LlmClassifier {
    pub fn new(completions: Arc<dyn CompletionProvider>) -> Self {
        Self { completions }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    fn name(&self) -> &str {
        "delegated"
    }

    async fn classify(&self, subject: &str, body: &str) -> Classification {
        let request = CompletionRequest::new(
            build_categorize_system_prompt(),
            build_categorize_user_prompt(subject, body),
        )
        .with_temperature(CATEGORIZE_TEMPERATURE)
        .with_max_tokens(CATEGORIZE_MAX_TOKENS);

        let answer = match self.completions.complete(request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    model = self.completions.model_name(),
                    error = %e,
                    "Categorization call failed, falling back to Other"
                );
                return Classification::rule(Category::Other);
            }
        };

        let trimmed = answer.trim();
        match Category::parse(trimmed) {
            Some(category) => Classification::delegated(category, trimmed),
            None => {
                warn!(
                    raw_answer = %trimmed,
                    "Answer is not a category name, falling back to Other"
                );
                Classification::delegated(Category::Other, trimmed)
            }
        }
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// Build the categorization system prompt.
fn build_categorize_system_prompt() -> String {
    let names: Vec<&str> = Category::ALL.iter().map(|c| c.name()).collect();
    format!(
        "You are a recruiting email triage engine. Categorize the email into \
         exactly one of: {}.\n\
         Respond with only the category name.",
        names.join(", ")
    )
}

/// Build the categorization user prompt (body truncated for token economy).
fn build_categorize_user_prompt(subject: &str, body: &str) -> String {
    let body_preview: String = body.chars().take(CATEGORIZE_BODY_CHARS).collect();
    format!("Subject: {}\n\nBody:\n{}", subject, body_preview)
}
