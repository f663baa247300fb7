//! Error types for Recruit Assist.

use std::time::Duration;

/// Top-level error type for the triage pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("CRM error: {0}")]
    Crm(#[from] CrmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Mail provider errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Mail authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Mail provider rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Malformed message {id}: {reason}")]
    MalformedMessage { id: String, reason: String },

    #[error("Failed to build draft: {0}")]
    DraftBuild(String),
}

/// Completion provider errors.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Candidate roster (CRM) errors.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("CRM request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Invalid CRM response: {reason}")]
    InvalidResponse { reason: String },

    #[error("CRM authentication failed")]
    AuthFailed,
}

/// Pipeline stage errors. Each variant names the stage an email stalled
/// at; the batch loop logs these and moves on, so the email is picked up
/// again on the next run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Labeling failed: {0}")]
    Label(String),

    #[error("Record failed: {0}")]
    Record(String),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
