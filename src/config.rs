//! Configuration types.
//!
//! Everything comes from environment variables; `AppConfig::from_env()`
//! is the single entry point. Optional collaborators (completion
//! service, primary account, CRM sync) gate on a lead variable: lead
//! absent means the collaborator is `None` and the feature is off, lead
//! present with a missing follower is a hard `ConfigError`.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::crm::DEFAULT_SYNC_LIMIT;
use crate::error::ConfigError;
use crate::llm::CompletionConfig;
use crate::pipeline::classifier::MatchMode;

/// Which classification strategy a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierStrategy {
    /// Deterministic keyword rules. No remote calls.
    Rules,
    /// Delegate categorization to the completion service.
    Delegated,
}

impl ClassifierStrategy {
    /// Parse a configuration value ("rules" or "llm").
    pub fn parse(s: &str) -> Option<ClassifierStrategy> {
        match s.trim().to_lowercase().as_str() {
            "rules" | "keyword" => Some(ClassifierStrategy::Rules),
            "llm" | "delegated" => Some(ClassifierStrategy::Delegated),
            _ => None,
        }
    }
}

/// Primary monitored account, upserted into the roster at startup so a
/// fresh database processes immediately.
#[derive(Debug, Clone)]
pub struct BootstrapAccount {
    pub address: String,
    pub access_token: SecretString,
}

impl BootstrapAccount {
    /// Returns `None` if `GMAIL_ADDRESS` is not set (no bootstrap
    /// account; the roster must come from the database or CRM sync).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(address) = std::env::var("GMAIL_ADDRESS") else {
            return Ok(None);
        };
        let access_token = std::env::var("GMAIL_ACCESS_TOKEN")
            .map(SecretString::from)
            .map_err(|_| ConfigError::MissingEnvVar("GMAIL_ACCESS_TOKEN".to_string()))?;
        Ok(Some(Self {
            address,
            access_token,
        }))
    }
}

/// CRM sync settings.
#[derive(Debug, Clone)]
pub struct CrmConfig {
    pub base_url: String,
    pub api_token: SecretString,
    /// Max contacts fetched per sync.
    pub sync_limit: usize,
}

impl CrmConfig {
    /// Returns `None` if `CRM_BASE_URL` is not set (sync disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(base_url) = std::env::var("CRM_BASE_URL") else {
            return Ok(None);
        };
        let api_token = std::env::var("CRM_API_TOKEN")
            .map(SecretString::from)
            .map_err(|_| ConfigError::MissingEnvVar("CRM_API_TOKEN".to_string()))?;
        let sync_limit: usize = std::env::var("CRM_SYNC_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SYNC_LIMIT);
        Ok(Some(Self {
            base_url,
            api_token,
            sync_limit,
        }))
    }
}

/// Full application configuration for one run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database path.
    pub db_path: PathBuf,
    /// Classification strategy for this run.
    pub strategy: ClassifierStrategy,
    /// Keyword matching mode for the rule-based classifier.
    pub match_mode: MatchMode,
    /// Restrict listing to unread messages.
    pub unread_only: bool,
    /// Remove the inbox label after applying the category label.
    pub remove_from_inbox: bool,
    /// Per-call HTTP timeout for remote collaborators.
    pub request_timeout: Duration,
    /// Completion service. `None` means rules-only classification and
    /// no reply drafts.
    pub completions: Option<CompletionConfig>,
    /// Primary monitored account.
    pub bootstrap: Option<BootstrapAccount>,
    /// CRM sync. `None` disables the sync step.
    pub crm: Option<CrmConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = std::env::var("RECRUIT_ASSIST_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/recruit-assist.db"));

        let strategy = match std::env::var("RECRUIT_ASSIST_CLASSIFIER") {
            Ok(s) => {
                ClassifierStrategy::parse(&s).ok_or_else(|| ConfigError::InvalidValue {
                    key: "RECRUIT_ASSIST_CLASSIFIER".to_string(),
                    message: format!("expected 'rules' or 'llm', got '{s}'"),
                })?
            }
            Err(_) => ClassifierStrategy::Rules,
        };

        let match_mode = match std::env::var("RECRUIT_ASSIST_MATCH_MODE") {
            Ok(s) => MatchMode::parse(&s).ok_or_else(|| ConfigError::InvalidValue {
                key: "RECRUIT_ASSIST_MATCH_MODE".to_string(),
                message: format!("expected 'whole_word' or 'substring', got '{s}'"),
            })?,
            Err(_) => MatchMode::WholeWord,
        };

        let unread_only = env_flag("RECRUIT_ASSIST_UNREAD_ONLY", false);
        let remove_from_inbox = env_flag("RECRUIT_ASSIST_MOVE_TO_LABEL", false);

        let timeout_secs: u64 = std::env::var("RECRUIT_ASSIST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);
        let request_timeout = Duration::from_secs(timeout_secs);

        let completions = completion_from_env(request_timeout);

        // Delegated classification cannot run without the service.
        if strategy == ClassifierStrategy::Delegated && completions.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "OPENAI_API_KEY".to_string(),
                hint: "RECRUIT_ASSIST_CLASSIFIER=llm requires a completion service".to_string(),
            });
        }

        let bootstrap = BootstrapAccount::from_env()?;
        let crm = CrmConfig::from_env()?;

        Ok(Self {
            db_path,
            strategy,
            match_mode,
            unread_only,
            remove_from_inbox,
            request_timeout,
            completions,
            bootstrap,
            crm,
        })
    }
}

/// Returns `None` if `OPENAI_API_KEY` is not set.
fn completion_from_env(timeout: Duration) -> Option<CompletionConfig> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4".to_string());
    let base_url = std::env::var("OPENAI_BASE_URL").ok();
    Some(CompletionConfig {
        api_key: SecretString::from(api_key),
        model,
        base_url,
        timeout,
    })
}

fn flag_is_set(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => flag_is_set(&v),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parse_accepts_both_names() {
        assert_eq!(
            ClassifierStrategy::parse("rules"),
            Some(ClassifierStrategy::Rules)
        );
        assert_eq!(
            ClassifierStrategy::parse("keyword"),
            Some(ClassifierStrategy::Rules)
        );
        assert_eq!(
            ClassifierStrategy::parse("LLM"),
            Some(ClassifierStrategy::Delegated)
        );
        assert_eq!(
            ClassifierStrategy::parse(" delegated "),
            Some(ClassifierStrategy::Delegated)
        );
        assert_eq!(ClassifierStrategy::parse("bayesian"), None);
    }

    #[test]
    fn flag_values() {
        assert!(flag_is_set("1"));
        assert!(flag_is_set("true"));
        assert!(flag_is_set("YES"));
        assert!(flag_is_set(" on "));
        assert!(!flag_is_set("0"));
        assert!(!flag_is_set("false"));
        assert!(!flag_is_set(""));
    }
}
