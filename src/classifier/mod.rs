//! Security/policy classification.
//!
//! `SecurityClassifier` fronts an ordered list of model variants (first
//! success wins, attempts are strictly sequential) with a per-call timeout.
//! When every variant is exhausted, the deterministic pattern fallback takes
//! over for text; images and documents fail closed. Callers never see an
//! error from this layer — classification always produces a result.

pub mod document;
pub mod fallback;
pub mod llm;
pub mod provider;

pub use fallback::FallbackAnalyzer;
pub use llm::AnthropicClassifier;
pub use provider::{
    ClassifierModel, ClassifierResult, ClassifierSource, ImageAnalysis, RecommendedAction,
    TextClassifyRequest, TransactionContext,
};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use crate::message::SenderRole;

/// Result of analyzing a document attachment.
///
/// Carries the same fixed detection schema as `ImageAnalysis`, plus the
/// text-classifier labels from the extracted prose and a short sample
/// retained for audit.
#[derive(Debug, Clone)]
pub struct DocumentAnalysis {
    pub contact_info_detected: bool,
    pub confidence: f32,
    pub explanation: String,
    /// Threat labels from classifying the extracted text.
    pub threat_labels: Vec<String>,
    /// First ~200 chars of extracted text, for the audit trail.
    pub text_sample: Option<String>,
}

impl DocumentAnalysis {
    /// Fail-closed analysis, mirroring the image path.
    pub fn fail_closed(reason: &str) -> Self {
        Self {
            contact_info_detected: true,
            confidence: 0.5,
            explanation: format!("extraction failed, treating as unsafe: {reason}"),
            threat_labels: vec!["contact information - unverifiable attachment".to_string()],
            text_sample: None,
        }
    }
}

/// Length of the audit text sample kept from document extraction.
const TEXT_SAMPLE_CHARS: usize = 200;

/// Classifier front — ordered variants, timeout, deterministic fallback.
pub struct SecurityClassifier {
    variants: Vec<Arc<dyn ClassifierModel>>,
    fallback: FallbackAnalyzer,
    request_timeout: Duration,
}

impl SecurityClassifier {
    /// Build from an explicit variant list (tests inject mocks here).
    pub fn new(variants: Vec<Arc<dyn ClassifierModel>>, request_timeout: Duration) -> Self {
        Self {
            variants,
            fallback: FallbackAnalyzer::new(),
            request_timeout,
        }
    }

    /// Build Anthropic-backed variants from configuration.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let mut variants: Vec<Arc<dyn ClassifierModel>> =
            Vec::with_capacity(config.model_variants.len());
        for model in &config.model_variants {
            variants.push(Arc::new(AnthropicClassifier::new(
                config.api_key.clone(),
                model,
            )?));
        }
        Ok(Self::new(variants, config.request_timeout))
    }

    /// Classify text, trying variants in order and falling back to the
    /// deterministic analyzer when all are unavailable.
    pub async fn classify_text(&self, request: &TextClassifyRequest) -> ClassifierResult {
        for model in &self.variants {
            match tokio::time::timeout(self.request_timeout, model.classify_text(request)).await {
                Ok(Ok(result)) => {
                    debug!(model = model.model_name(), "Classifier variant succeeded");
                    return result;
                }
                Ok(Err(e)) => {
                    warn!(
                        model = model.model_name(),
                        error = %e,
                        "Classifier variant failed, trying next"
                    );
                }
                Err(_) => {
                    warn!(
                        model = model.model_name(),
                        timeout = ?self.request_timeout,
                        "Classifier variant timed out, trying next"
                    );
                }
            }
        }

        warn!(
            attempts = self.variants.len(),
            "All classifier variants exhausted, engaging pattern fallback"
        );
        self.fallback.analyze(&request.content)
    }

    /// Analyze an image, failing closed on any error or timeout.
    pub async fn classify_image(&self, bytes: &[u8], format: &str) -> ImageAnalysis {
        for model in &self.variants {
            match tokio::time::timeout(self.request_timeout, model.classify_image(bytes, format))
                .await
            {
                Ok(Ok(analysis)) => return analysis,
                Ok(Err(e)) => {
                    warn!(
                        model = model.model_name(),
                        error = %e,
                        "Image analysis failed, trying next variant"
                    );
                }
                Err(_) => {
                    warn!(
                        model = model.model_name(),
                        "Image analysis timed out, trying next variant"
                    );
                }
            }
        }

        warn!("Image analysis unavailable, failing closed");
        ImageAnalysis::fail_closed("no classifier variant produced an analysis")
    }

    /// Analyze a document: extract text, then classify it as prose.
    ///
    /// Zero-length extraction or extraction error fails closed identically
    /// to the image path.
    pub async fn classify_document(
        &self,
        bytes: &[u8],
        filename: &str,
        sender_role: SenderRole,
    ) -> DocumentAnalysis {
        let text = match document::extract_text(bytes, filename) {
            Ok(text) => text,
            Err(e) => {
                warn!(filename, error = %e, "Document extraction failed, failing closed");
                return DocumentAnalysis::fail_closed(&e.to_string());
            }
        };

        let sample: String = text.chars().take(TEXT_SAMPLE_CHARS).collect();
        let request = TextClassifyRequest {
            content: text,
            sender_role,
            transaction: TransactionContext::default(),
            recent_history: Vec::new(),
        };
        let result = self.classify_text(&request).await;

        DocumentAnalysis {
            contact_info_detected: !result.threat_labels.is_empty(),
            confidence: result.confidence,
            explanation: result.explanation,
            threat_labels: result.threat_labels,
            text_sample: Some(sample),
        }
    }
}
