//! Deterministic pattern fallback — engaged only when every model variant
//! is unavailable.
//!
//! Intentionally coarser than the live decision table: any detected threat
//! recommends Block. Degraded-mode conservatism, confirmed with the platform
//! owners — do not "fix" this to mirror the primary table.

use regex::Regex;

use super::provider::{ClassifierResult, ClassifierSource, RecommendedAction};

/// Confidence reported for every fallback result.
const FALLBACK_CONFIDENCE: f32 = 0.8;

/// Regex-based analyzer with a fixed pattern set.
///
/// Same input and pattern set ⇒ same output, always. The fail-closed tests
/// depend on this determinism.
pub struct FallbackAnalyzer {
    phone: Regex,
    email: Regex,
    meeting: Regex,
    street_address: Regex,
}

impl FallbackAnalyzer {
    pub fn new() -> Self {
        Self {
            phone: Regex::new(r"\(?\b\d{3}\)?[-.\s]\d{3}[-.\s]?\d{4}\b").unwrap(),
            email: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap(),
            meeting: Regex::new(
                r"(?i)\b(meet(ing)?|coffee|lunch|dinner|come by|stop by|swing by|visit|in person)\b",
            )
            .unwrap(),
            street_address: Regex::new(
                r"(?i)\b\d{1,5}\s+[A-Za-z][A-Za-z0-9\s]{1,30}\s(street|st|avenue|ave|road|rd|boulevard|blvd|drive|dr|lane|ln|court|ct|way|place|pl)\.?\b",
            )
            .unwrap(),
        }
    }

    /// Run the fixed pattern set over the content.
    pub fn analyze(&self, content: &str) -> ClassifierResult {
        let mut labels = Vec::new();

        if self.phone.is_match(content) {
            labels.push("contact information - phone number".to_string());
        }
        if self.email.is_match(content) {
            labels.push("contact information - email address".to_string());
        }
        if self.meeting.is_match(content) {
            labels.push("external meeting proposal".to_string());
        }
        if self.street_address.is_match(content) {
            labels.push("contact information - street address".to_string());
        }

        let recommended = if labels.is_empty() {
            RecommendedAction::Allow
        } else {
            RecommendedAction::Block
        };

        ClassifierResult {
            explanation: if labels.is_empty() {
                "pattern fallback: no violations matched".to_string()
            } else {
                format!("pattern fallback matched: {}", labels.join(", "))
            },
            threat_labels: labels,
            confidence: FALLBACK_CONFIDENCE,
            recommended_action: Some(recommended),
            alternative_safe_text: None,
            scope_change_labels: Vec::new(),
            scope_change_details: serde_json::Value::Null,
            source: ClassifierSource::Fallback,
        }
    }
}

impl Default for FallbackAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
