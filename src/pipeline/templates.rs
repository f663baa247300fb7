//! Per-category response templates.
//!
//! A template is the instruction handed to the completion service along
//! with the email body when drafting a reply. Interview, Offer, and
//! Rejection acknowledgments ship by default. Application and Networking
//! have no template unless one is configured, so those categories get a
//! label but no draft out of the box.

use std::collections::HashMap;

use crate::pipeline::types::Category;

/// Instruction templates keyed by category.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: HashMap<Category, String>,
}

impl TemplateSet {
    /// The default acknowledgment templates.
    pub fn defaults() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            Category::Interview,
            "Write a brief, professional reply accepting the interview \
             invitation. Thank the sender, confirm interest, and propose \
             availability in the next few business days. Ask for any \
             missing logistics (format, length, who you will meet)."
                .to_string(),
        );
        templates.insert(
            Category::Offer,
            "Write a brief, appreciative reply acknowledging the offer. \
             Thank the sender, express enthusiasm, and say you will review \
             the details and follow up within a few days. Do not accept or \
             decline yet."
                .to_string(),
        );
        templates.insert(
            Category::Rejection,
            "Write a brief, gracious reply thanking the sender for the \
             update and their time, and asking to be kept in mind for \
             future roles."
                .to_string(),
        );
        Self { templates }
    }

    /// No templates at all.
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Set or replace the template for a category.
    pub fn with_template(mut self, category: Category, template: impl Into<String>) -> Self {
        self.templates.insert(category, template.into());
        self
    }

    /// Template for a category, if one is configured.
    pub fn get(&self, category: Category) -> Option<&str> {
        self.templates.get(&category).map(|s| s.as_str())
    }
}
