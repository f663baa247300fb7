//! Category routing. Applies the provider-side label for every email and,
//! for categories with a response template, generates and stores a reply
//! draft. The two side effects are independent: a label failure never
//! blocks the draft attempt and vice versa.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::MailError;
use crate::llm::{CompletionProvider, CompletionRequest};
use crate::mail::Mailbox;
use crate::pipeline::templates::TemplateSet;
use crate::pipeline::types::{
    Category, DraftOutcome, EmailMessage, LabelOutcome, ResponseDraft, RouteOutcome,
};

/// Response generation runs warmer than categorization.
pub const RESPONSE_TEMPERATURE: f32 = 0.7;
pub const RESPONSE_MAX_TOKENS: u32 = 500;

/// Gmail's system inbox label, removed under move semantics.
const INBOX_LABEL_ID: &str = "INBOX";

/// Routes a classified email to its side effects.
pub struct Router {
    mailbox: Arc<dyn Mailbox>,
    completions: Option<Arc<dyn CompletionProvider>>,
    templates: TemplateSet,
    /// Label name to provider id, resolved at most once per account session.
    label_ids: HashMap<String, String>,
    remove_from_inbox: bool,
}

impl Router {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        completions: Option<Arc<dyn CompletionProvider>>,
        templates: TemplateSet,
    ) -> Self {
        Self {
            mailbox,
            completions,
            templates,
            label_ids: HashMap::new(),
            remove_from_inbox: false,
        }
    }

    /// Also remove the inbox label when filing an email under its category.
    pub fn with_move_semantics(mut self, enabled: bool) -> Self {
        self.remove_from_inbox = enabled;
        self
    }

    /// Apply the category label and, when a template exists, draft a reply.
    pub async fn route(&mut self, email: &EmailMessage, category: Category) -> RouteOutcome {
        let label = self.apply_label(email, category).await;
        let draft = self.draft_response(email, category).await;
        RouteOutcome { label, draft }
    }

    async fn apply_label(&mut self, email: &EmailMessage, category: Category) -> LabelOutcome {
        let label_id = match self.resolve_label_id(category).await {
            Ok(id) => id,
            Err(e) => {
                warn!(id = %email.id, category = %category, error = %e, "Label lookup failed");
                return LabelOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let add = [label_id.clone()];
        let remove: Vec<String> = if self.remove_from_inbox {
            vec![INBOX_LABEL_ID.to_string()]
        } else {
            Vec::new()
        };

        match self.mailbox.modify_labels(&email.id, &add, &remove).await {
            Ok(()) => {
                debug!(id = %email.id, label_id = %label_id, "Label applied");
                LabelOutcome::Applied { label_id }
            }
            Err(e) => {
                warn!(id = %email.id, error = %e, "Label apply failed");
                LabelOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Resolve a category to its provider label id, creating the label on
    /// first use. Hits the provider at most once per name per session.
    async fn resolve_label_id(&mut self, category: Category) -> Result<String, MailError> {
        let name = category.name();
        if let Some(id) = self.label_ids.get(name) {
            return Ok(id.clone());
        }

        // Cache miss: refresh the full list first, the label may already
        // exist from a previous run.
        let labels = self.mailbox.list_labels().await?;
        for label in labels {
            self.label_ids.insert(label.name, label.id);
        }
        if let Some(id) = self.label_ids.get(name) {
            return Ok(id.clone());
        }

        let created = self.mailbox.create_label(name).await?;
        info!(label = name, label_id = %created.id, "Created mailbox label");
        let id = created.id.clone();
        self.label_ids.insert(created.name, created.id);
        Ok(id)
    }

    async fn draft_response(&self, email: &EmailMessage, category: Category) -> DraftOutcome {
        if category == Category::Other {
            return DraftOutcome::NotNeeded;
        }

        let Some(instruction) = self.templates.get(category) else {
            return DraftOutcome::NoTemplate;
        };

        let Some(completions) = self.completions.as_ref() else {
            warn!(id = %email.id, category = %category, "Template configured but no completion provider");
            return DraftOutcome::Failed {
                reason: "no completion provider configured".to_string(),
            };
        };

        let request = CompletionRequest::new(
            build_response_system_prompt(),
            build_response_user_prompt(instruction, &email.body),
        )
        .with_temperature(RESPONSE_TEMPERATURE)
        .with_max_tokens(RESPONSE_MAX_TOKENS);

        let body = match completions.complete(request).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(id = %email.id, category = %category, error = %e, "Response generation failed");
                return DraftOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        if body.is_empty() {
            warn!(id = %email.id, "Model returned an empty response body");
            return DraftOutcome::Failed {
                reason: "empty response body".to_string(),
            };
        }

        let draft = ResponseDraft::reply_to(email, body);
        match self
            .mailbox
            .create_draft(&draft, email.thread_id.as_deref())
            .await
        {
            Ok(draft_id) => {
                debug!(id = %email.id, draft_id = %draft_id, "Reply draft created");
                DraftOutcome::Drafted(draft)
            }
            Err(e) => {
                warn!(id = %email.id, error = %e, "Draft create failed");
                DraftOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

// ── Prompt building ─────────────────────────────────────────────────

/// System prompt for reply drafting.
pub fn build_response_system_prompt() -> String {
    "You are an email response assistant.".to_string()
}

/// User prompt: the per-category instruction plus the email content.
pub fn build_response_user_prompt(instruction: &str, body: &str) -> String {
    format!("{instruction}\n\nEmail content:\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionError;
    use crate::mail::{MailLabel, MailQuery};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    // ── Mocks ───────────────────────────────────────────────────────

    #[derive(Default)]
    struct MockMailbox {
        existing_labels: Vec<MailLabel>,
        fail_modify: bool,
        fail_drafts: bool,
        list_calls: Mutex<u32>,
        created_labels: Mutex<Vec<String>>,
        modified: Mutex<Vec<(String, Vec<String>, Vec<String>)>>,
        drafts: Mutex<Vec<ResponseDraft>>,
    }

    #[async_trait]
    impl Mailbox for MockMailbox {
        async fn list_message_ids(&self, _query: &MailQuery) -> Result<Vec<String>, MailError> {
            Ok(Vec::new())
        }

        async fn fetch_message(&self, id: &str) -> Result<EmailMessage, MailError> {
            Err(MailError::NotFound(id.to_string()))
        }

        async fn list_labels(&self) -> Result<Vec<MailLabel>, MailError> {
            *self.list_calls.lock().unwrap() += 1;
            Ok(self.existing_labels.clone())
        }

        async fn create_label(&self, name: &str) -> Result<MailLabel, MailError> {
            self.created_labels.lock().unwrap().push(name.to_string());
            Ok(MailLabel {
                id: format!("Label_{name}"),
                name: name.to_string(),
            })
        }

        async fn modify_labels(
            &self,
            message_id: &str,
            add: &[String],
            remove: &[String],
        ) -> Result<(), MailError> {
            if self.fail_modify {
                return Err(MailError::RequestFailed {
                    reason: "boom".to_string(),
                });
            }
            self.modified.lock().unwrap().push((
                message_id.to_string(),
                add.to_vec(),
                remove.to_vec(),
            ));
            Ok(())
        }

        async fn create_draft(
            &self,
            draft: &ResponseDraft,
            _thread_id: Option<&str>,
        ) -> Result<String, MailError> {
            if self.fail_drafts {
                return Err(MailError::RequestFailed {
                    reason: "draft boom".to_string(),
                });
            }
            self.drafts.lock().unwrap().push(draft.clone());
            Ok("draft-1".to_string())
        }
    }

    struct MockCompletions {
        answer: String,
        calls: Mutex<u32>,
    }

    impl MockCompletions {
        fn answering(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: answer.to_string(),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for MockCompletions {
        fn model_name(&self) -> &str {
            "mock"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.answer.clone())
        }
    }

    fn make_email(id: &str) -> EmailMessage {
        EmailMessage {
            id: id.to_string(),
            thread_id: Some("t-1".to_string()),
            subject: "Interview next week".to_string(),
            sender: "recruiter@acme.com".to_string(),
            body: "We would like to invite you for an interview next Tuesday".to_string(),
            received_at: Utc::now(),
        }
    }

    fn make_router(mailbox: Arc<MockMailbox>, completions: Arc<MockCompletions>) -> Router {
        Router::new(mailbox, Some(completions), TemplateSet::defaults())
    }

    // ── Labeling ────────────────────────────────────────────────────

    #[tokio::test]
    async fn other_is_labeled_but_never_drafted() {
        let mailbox = Arc::new(MockMailbox::default());
        let completions = MockCompletions::answering("should not be called");
        let mut router = make_router(mailbox.clone(), completions.clone());

        let outcome = router.route(&make_email("m-1"), Category::Other).await;

        assert!(matches!(outcome.label, LabelOutcome::Applied { .. }));
        assert!(matches!(outcome.draft, DraftOutcome::NotNeeded));
        assert_eq!(*completions.calls.lock().unwrap(), 0);
        assert!(mailbox.drafts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn label_failure_still_attempts_the_draft() {
        let mailbox = Arc::new(MockMailbox {
            fail_modify: true,
            ..Default::default()
        });
        let completions = MockCompletions::answering("Tuesday works for me.");
        let mut router = make_router(mailbox.clone(), completions);

        let outcome = router.route(&make_email("m-1"), Category::Interview).await;

        assert!(matches!(outcome.label, LabelOutcome::Failed { .. }));
        assert!(matches!(outcome.draft, DraftOutcome::Drafted(_)));
        assert_eq!(mailbox.drafts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn label_cache_avoids_repeat_lookups() {
        let mailbox = Arc::new(MockMailbox::default());
        let completions = MockCompletions::answering("ok");
        let mut router = make_router(mailbox.clone(), completions);

        router.route(&make_email("m-1"), Category::Interview).await;
        router.route(&make_email("m-2"), Category::Interview).await;

        assert_eq!(*mailbox.list_calls.lock().unwrap(), 1);
        assert_eq!(mailbox.created_labels.lock().unwrap().len(), 1);
        assert_eq!(mailbox.modified.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn existing_label_is_reused_not_recreated() {
        let mailbox = Arc::new(MockMailbox {
            existing_labels: vec![MailLabel {
                id: "Label_7".to_string(),
                name: "Interview".to_string(),
            }],
            ..Default::default()
        });
        let completions = MockCompletions::answering("ok");
        let mut router = make_router(mailbox.clone(), completions);

        let outcome = router.route(&make_email("m-1"), Category::Interview).await;

        assert!(mailbox.created_labels.lock().unwrap().is_empty());
        match outcome.label {
            LabelOutcome::Applied { label_id } => assert_eq!(label_id, "Label_7"),
            other => panic!("Expected Applied, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn move_semantics_removes_the_inbox_label() {
        let mailbox = Arc::new(MockMailbox::default());
        let completions = MockCompletions::answering("ok");
        let mut router =
            make_router(mailbox.clone(), completions).with_move_semantics(true);

        router.route(&make_email("m-1"), Category::Offer).await;

        let modified = mailbox.modified.lock().unwrap();
        let (_, _, remove) = &modified[0];
        assert_eq!(remove, &vec!["INBOX".to_string()]);
    }

    // ── Drafting ────────────────────────────────────────────────────

    #[tokio::test]
    async fn draft_replies_to_the_sender() {
        let mailbox = Arc::new(MockMailbox::default());
        let completions = MockCompletions::answering("  Tuesday works for me.  ");
        let mut router = make_router(mailbox.clone(), completions);

        let outcome = router.route(&make_email("m-1"), Category::Interview).await;

        match outcome.draft {
            DraftOutcome::Drafted(draft) => {
                assert_eq!(draft.recipient, "recruiter@acme.com");
                assert_eq!(draft.subject, "Re: Interview next week");
                assert_eq!(draft.body, "Tuesday works for me.");
            }
            other => panic!("Expected Drafted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn category_without_template_yields_no_template() {
        let mailbox = Arc::new(MockMailbox::default());
        let completions = MockCompletions::answering("should not be called");
        let mut router = make_router(mailbox.clone(), completions.clone());

        let outcome = router.route(&make_email("m-1"), Category::Application).await;

        assert!(matches!(outcome.draft, DraftOutcome::NoTemplate));
        assert_eq!(*completions.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn draft_create_failure_degrades_to_failed() {
        let mailbox = Arc::new(MockMailbox {
            fail_drafts: true,
            ..Default::default()
        });
        let completions = MockCompletions::answering("ok");
        let mut router = make_router(mailbox.clone(), completions);

        let outcome = router.route(&make_email("m-1"), Category::Interview).await;

        assert!(matches!(outcome.label, LabelOutcome::Applied { .. }));
        assert!(matches!(outcome.draft, DraftOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn empty_model_output_yields_failed() {
        let mailbox = Arc::new(MockMailbox::default());
        let completions = MockCompletions::answering("   ");
        let mut router = make_router(mailbox.clone(), completions);

        let outcome = router.route(&make_email("m-1"), Category::Offer).await;

        assert!(matches!(outcome.draft, DraftOutcome::Failed { .. }));
        assert!(mailbox.drafts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn template_without_provider_reports_failure() {
        let mailbox = Arc::new(MockMailbox::default());
        let mut router = Router::new(mailbox.clone(), None, TemplateSet::defaults());

        let outcome = router.route(&make_email("m-1"), Category::Interview).await;

        assert!(matches!(outcome.draft, DraftOutcome::Failed { .. }));
    }

    #[test]
    fn response_prompt_carries_instruction_and_body() {
        let prompt = build_response_user_prompt("Draft a reply.", "See you Tuesday");
        assert!(prompt.starts_with("Draft a reply."));
        assert!(prompt.contains("Email content:\nSee you Tuesday"));
    }
}
