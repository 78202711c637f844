//! Classifier model trait and result types.
//!
//! Backends implement `ClassifierModel`; the rest of the pipeline only sees
//! this seam, so tests swap in mocks and the failover chain composes freely.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;
use crate::message::{ConversationTurn, SenderRole};

/// Action the classifier itself suggests.
///
/// Advisory on the primary path — the decision table is authoritative there.
/// On the fallback path a `Block` recommendation is binding (degraded-mode
/// conservatism, see the fallback analyzer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    Allow,
    Redact,
    Block,
}

/// Which path produced a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierSource {
    /// A live model variant, by name.
    Model(String),
    /// The deterministic pattern fallback.
    Fallback,
}

/// Transaction context handed to the classifier for grounding.
#[derive(Debug, Clone, Default)]
pub struct TransactionContext {
    pub category: Option<String>,
    pub budget: Option<String>,
}

/// One text-classification request.
#[derive(Debug, Clone)]
pub struct TextClassifyRequest {
    pub content: String,
    pub sender_role: SenderRole,
    pub transaction: TransactionContext,
    /// Up to three prior turns, oldest first.
    pub recent_history: Vec<ConversationTurn>,
}

/// Output of one classification pass over a text unit.
#[derive(Debug, Clone)]
pub struct ClassifierResult {
    /// Open-vocabulary threat labels; mapped to the closed taxonomy downstream.
    pub threat_labels: Vec<String>,
    /// Confidence in [0, 1]. Always present, fixed at 0.8 on fallback.
    pub confidence: f32,
    pub explanation: String,
    pub recommended_action: Option<RecommendedAction>,
    /// Model-suggested rewrite with the violating spans removed.
    pub alternative_safe_text: Option<String>,
    /// Open-vocabulary scope-change labels.
    pub scope_change_labels: Vec<String>,
    /// Free-form detail about the scope change, passed through to the report.
    pub scope_change_details: serde_json::Value,
    pub source: ClassifierSource,
}

impl ClassifierResult {
    /// A clean, no-threat result from the given model.
    pub fn clean(model: &str, confidence: f32) -> Self {
        Self {
            threat_labels: Vec::new(),
            confidence,
            explanation: String::new(),
            recommended_action: Some(RecommendedAction::Allow),
            alternative_safe_text: None,
            scope_change_labels: Vec::new(),
            scope_change_details: serde_json::Value::Null,
            source: ClassifierSource::Model(model.to_string()),
        }
    }
}

/// Fixed-schema result of image analysis.
///
/// Callers never defensively parse this: every field is always present,
/// empty vectors when nothing was found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub contact_info_detected: bool,
    pub confidence: f32,
    pub explanation: String,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub social_handles: Vec<String>,
}

impl ImageAnalysis {
    /// Fail-closed analysis: treat the image as carrying contact info.
    pub fn fail_closed(reason: &str) -> Self {
        Self {
            contact_info_detected: true,
            confidence: 0.5,
            explanation: format!("analysis failed, treating as unsafe: {reason}"),
            phones: Vec::new(),
            emails: Vec::new(),
            addresses: Vec::new(),
            social_handles: Vec::new(),
        }
    }
}

/// A classification backend — one model variant.
#[async_trait]
pub trait ClassifierModel: Send + Sync {
    /// Model identifier for logging and result attribution.
    fn model_name(&self) -> &str;

    /// Classify a text unit against the threat + scope-change taxonomy.
    async fn classify_text(
        &self,
        request: &TextClassifyRequest,
    ) -> Result<ClassifierResult, ClassifierError>;

    /// Analyze an image for embedded contact information.
    async fn classify_image(
        &self,
        bytes: &[u8],
        format: &str,
    ) -> Result<ImageAnalysis, ClassifierError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_result_has_no_threats() {
        let result = ClassifierResult::clean("test-model", 0.95);
        assert!(result.threat_labels.is_empty());
        assert!(result.scope_change_labels.is_empty());
        assert_eq!(result.recommended_action, Some(RecommendedAction::Allow));
        assert_eq!(result.source, ClassifierSource::Model("test-model".into()));
    }

    #[test]
    fn fail_closed_image_analysis() {
        let analysis = ImageAnalysis::fail_closed("decode error");
        assert!(analysis.contact_info_detected);
        assert!(analysis.confidence <= 0.5);
        assert!(analysis.explanation.contains("decode error"));
    }

    #[test]
    fn image_analysis_deserializes_with_missing_lists() {
        // Backends may omit empty arrays; the schema stays fixed for callers.
        let json = r#"{"contact_info_detected": false, "confidence": 0.9, "explanation": "clean"}"#;
        let analysis: ImageAnalysis = serde_json::from_str(json).unwrap();
        assert!(!analysis.contact_info_detected);
        assert!(analysis.phones.is_empty());
        assert!(analysis.social_handles.is_empty());
    }
}
