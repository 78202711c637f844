//! Deterministic content redaction.
//!
//! Two-tier rule for Redact: prefer the classifier's safe rewrite, else
//! substitute violating spans by regex. Redaction is idempotent — the
//! placeholder strings match none of the patterns.

use regex::Regex;

use super::decision::{Decision, ThreatCategory};
use crate::classifier::ClassifierResult;

/// Substitute for redacted phone numbers.
pub const PHONE_PLACEHOLDER: &str = "[PHONE REMOVED]";

/// Substitute for redacted email addresses.
pub const EMAIL_PLACEHOLDER: &str = "[EMAIL REMOVED]";

/// Regex substitution set shared by message and bid-field redaction.
pub struct Redactor {
    phone: Regex,
    email: Regex,
}

impl Redactor {
    pub fn new() -> Self {
        Self {
            phone: Regex::new(r"\(?\b\d{3}\)?[-.\s]\d{3}[-.\s]?\d{4}\b").unwrap(),
            email: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap(),
        }
    }

    /// Produce delivered content for a whole-message decision.
    pub fn apply(&self, original: &str, decision: Decision, result: &ClassifierResult) -> String {
        match decision {
            Decision::Allow => original.to_string(),
            Decision::Block => String::new(),
            Decision::Redact => match result.alternative_safe_text {
                Some(ref safe) => safe.clone(),
                None => self.substitute(original),
            },
        }
    }

    /// Regex substitution tier: strip phone numbers and email addresses.
    pub fn substitute(&self, content: &str) -> String {
        let content = self.phone.replace_all(content, PHONE_PLACEHOLDER);
        self.email.replace_all(&content, EMAIL_PLACEHOLDER).into_owned()
    }

    /// Produce the delivered value for one bid text field.
    ///
    /// A blocked field becomes an explicit placeholder naming the threat —
    /// never silently dropped. Redacted fields use the same two-tier rule
    /// as message content.
    pub fn apply_to_field(
        &self,
        original: &str,
        decision: Decision,
        result: &ClassifierResult,
        threats: &std::collections::BTreeSet<ThreatCategory>,
    ) -> String {
        match decision {
            Decision::Allow => original.to_string(),
            Decision::Block => {
                let reason = threats
                    .iter()
                    .next()
                    .map(|t| t.describe())
                    .unwrap_or("a policy violation");
                format!("[BLOCKED - {reason} detected]")
            }
            Decision::Redact => match result.alternative_safe_text {
                Some(ref safe) => safe.clone(),
                None => self.substitute(original),
            },
        }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}
