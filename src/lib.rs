//! Recruit Assist: recruiting-email triage pipeline.

pub mod config;
pub mod crm;
pub mod error;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod store;
