//! Anthropic-backed classifier model.
//!
//! Text classification goes through rig-core's Anthropic client with a
//! closed-taxonomy preamble and strict-JSON output. Image analysis posts the
//! bytes straight to the Messages API via reqwest — rig's completion surface
//! is text-first, and the fixed `ImageAnalysis` schema is parsed from the
//! vision response here so callers never touch raw model output.

use base64::prelude::*;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::anthropic;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use super::provider::{
    ClassifierModel, ClassifierResult, ClassifierSource, ImageAnalysis, RecommendedAction,
    TextClassifyRequest,
};
use crate::error::ClassifierError;
use crate::message::SenderRole;

/// Messages API endpoint for the vision path.
const MESSAGES_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Output budget for one classification call.
const CLASSIFY_MAX_TOKENS: u64 = 1024;

/// Anthropic classifier for one model variant.
pub struct AnthropicClassifier {
    client: rig::client::Client<anthropic::client::AnthropicExt>,
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl AnthropicClassifier {
    /// Create a classifier bound to one model variant.
    pub fn new(api_key: SecretString, model: &str) -> Result<Self, ClassifierError> {
        let client: rig::client::Client<anthropic::client::AnthropicExt> =
            anthropic::Client::new(api_key.expose_secret()).map_err(|e| {
                ClassifierError::RequestFailed {
                    model: model.to_string(),
                    reason: format!("failed to create Anthropic client: {e}"),
                }
            })?;

        Ok(Self {
            client,
            http: reqwest::Client::new(),
            api_key,
            model: model.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ClassifierModel for AnthropicClassifier {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn classify_text(
        &self,
        request: &TextClassifyRequest,
    ) -> Result<ClassifierResult, ClassifierError> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(&build_classify_preamble())
            .temperature(0.0)
            .max_tokens(CLASSIFY_MAX_TOKENS)
            .build();

        let user_prompt = build_classify_prompt(request);
        let raw = agent
            .prompt(user_prompt)
            .await
            .map_err(|e| ClassifierError::RequestFailed {
                model: self.model.clone(),
                reason: format!("{e}"),
            })?;

        let result = parse_classify_response(&raw, &self.model)?;
        debug!(
            model = %self.model,
            threats = result.threat_labels.len(),
            confidence = result.confidence,
            "Text classification complete"
        );
        Ok(result)
    }

    async fn classify_image(
        &self,
        bytes: &[u8],
        format: &str,
    ) -> Result<ImageAnalysis, ClassifierError> {
        let media_type = match format {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            other => {
                return Err(ClassifierError::ImageAnalysis(format!(
                    "unsupported image format: {other}"
                )));
            }
        };

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": CLASSIFY_MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": media_type,
                            "data": BASE64_STANDARD.encode(bytes),
                        },
                    },
                    { "type": "text", "text": IMAGE_ANALYSIS_PROMPT },
                ],
            }],
        });

        let response = self
            .http
            .post(MESSAGES_API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::ImageAnalysis(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ClassifierError::ImageAnalysis(format!(
                "API returned status {}",
                response.status()
            )));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ClassifierError::ImageAnalysis(format!("invalid response body: {e}")))?;

        let text = value["content"][0]["text"].as_str().ok_or_else(|| {
            ClassifierError::ImageAnalysis("response has no text content".to_string())
        })?;

        let analysis: ImageAnalysis = serde_json::from_str(&extract_json_object(text))
            .map_err(|e| {
                warn!(model = %self.model, error = %e, "Unparseable image analysis");
                ClassifierError::ImageAnalysis(format!("unparseable analysis: {e}"))
            })?;

        Ok(analysis)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// Closed instruction set for text classification.
///
/// The taxonomy here is the only one the decision engine understands —
/// keep the two in lockstep.
fn build_classify_preamble() -> String {
    "You are a trust-and-safety classifier for a two-sided home-improvement marketplace. \
     Participants must never exchange off-platform contact information, arrange external \
     meetings, or bypass in-platform payment.\n\n\
     Detect ONLY these threat categories:\n\
     - \"contact information\": phone numbers, email addresses, street addresses\n\
     - \"social media\": handles, profile links, app usernames (Instagram, WhatsApp, etc.)\n\
     - \"external meeting\": proposals to meet in person outside the platform (coffee, lunch, site visit arrangements that route around the platform)\n\
     - \"payment bypass\": cash, Venmo, PayPal, Zelle, checks, any off-platform payment\n\
     - \"platform bypass\": any other attempt to take the relationship off-platform\n\n\
     Also detect ONLY these project scope changes (things the project owner is changing \
     about the work): \"material change\", \"size change\", \"feature addition\", \
     \"feature removal\", \"timeline change\", \"budget change\".\n\n\
     Respond with ONLY a JSON object:\n\
     {\"threats\": [\"...\"], \"confidence\": 0.0, \"explanation\": \"...\", \
     \"recommended_action\": \"allow|redact|block\", \"safe_alternative\": \"...\", \
     \"scope_changes\": [\"...\"], \"scope_change_details\": {}}\n\n\
     Rules:\n\
     - threats and scope_changes use the category names above, nothing else\n\
     - confidence is your overall certainty in [0, 1]\n\
     - safe_alternative: the message rewritten with violating spans removed, only when a \
     faithful rewrite exists; omit otherwise\n\
     - normal project talk (prices, timelines, materials, preferences) is NOT a threat\n\
     - scope_change_details: short free-form notes on what changed"
        .to_string()
}

/// Build the user prompt from the request.
fn build_classify_prompt(request: &TextClassifyRequest) -> String {
    let mut prompt = String::with_capacity(512);

    let role = match request.sender_role {
        SenderRole::Owner => "project owner",
        SenderRole::Provider => "service provider",
    };
    prompt.push_str(&format!("Sender: {role}\n"));

    if let Some(ref category) = request.transaction.category {
        prompt.push_str(&format!("Project category: {category}\n"));
    }
    if let Some(ref budget) = request.transaction.budget {
        prompt.push_str(&format!("Project budget: {budget}\n"));
    }

    if !request.recent_history.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        for (i, turn) in request.recent_history.iter().take(3).enumerate() {
            let preview: String = turn.content.chars().take(200).collect();
            prompt.push_str(&format!(
                "  [{}] {}: {}\n",
                i + 1,
                turn.sender_role.as_str(),
                preview
            ));
        }
    }

    prompt.push_str(&format!("\nMessage:\n{}", request.content));
    prompt
}

/// Instruction block for the vision call.
const IMAGE_ANALYSIS_PROMPT: &str = "You are a trust-and-safety analyzer for a marketplace \
that forbids exchanging contact information. Examine this image for embedded contact \
details: phone numbers, email addresses, street addresses, social media handles (including \
in signage, business cards, vehicle wraps, watermarks, or handwriting).\n\
Respond with ONLY a JSON object:\n\
{\"contact_info_detected\": false, \"confidence\": 0.0, \"explanation\": \"...\", \
\"phones\": [], \"emails\": [], \"addresses\": [], \"social_handles\": []}";

// ── Response parsing ────────────────────────────────────────────────

/// Raw classification response shape.
#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    threats: Vec<String>,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    recommended_action: String,
    #[serde(default)]
    safe_alternative: String,
    #[serde(default)]
    scope_changes: Vec<String>,
    #[serde(default)]
    scope_change_details: serde_json::Value,
}

/// Parse a model response into a `ClassifierResult`.
fn parse_classify_response(raw: &str, model: &str) -> Result<ClassifierResult, ClassifierError> {
    let json_str = extract_json_object(raw);
    let parsed: RawClassification =
        serde_json::from_str(&json_str).map_err(|e| ClassifierError::InvalidResponse {
            model: model.to_string(),
            reason: format!("JSON parse error: {e}"),
        })?;

    let recommended_action = match parsed.recommended_action.as_str() {
        "allow" => Some(RecommendedAction::Allow),
        "redact" => Some(RecommendedAction::Redact),
        "block" => Some(RecommendedAction::Block),
        _ => None,
    };

    Ok(ClassifierResult {
        threat_labels: parsed.threats,
        confidence: parsed.confidence.clamp(0.0, 1.0),
        explanation: parsed.explanation,
        recommended_action,
        alternative_safe_text: if parsed.safe_alternative.is_empty() {
            None
        } else {
            Some(parsed.safe_alternative)
        },
        scope_change_labels: parsed.scope_changes,
        scope_change_details: parsed.scope_change_details,
        source: ClassifierSource::Model(model.to_string()),
    })
}

/// Extract a JSON object from model output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::provider::TransactionContext;
    use crate::message::ConversationTurn;

    // ── Prompt construction ─────────────────────────────────────────

    #[test]
    fn preamble_enumerates_full_taxonomy() {
        let preamble = build_classify_preamble();
        for category in [
            "contact information",
            "social media",
            "external meeting",
            "payment bypass",
            "platform bypass",
        ] {
            assert!(preamble.contains(category), "missing {category}");
        }
        for change in [
            "material change",
            "size change",
            "feature addition",
            "feature removal",
            "timeline change",
            "budget change",
        ] {
            assert!(preamble.contains(change), "missing {change}");
        }
    }

    #[test]
    fn prompt_includes_role_context_and_history() {
        let request = TextClassifyRequest {
            content: "let's do mulch instead of rocks".into(),
            sender_role: SenderRole::Owner,
            transaction: TransactionContext {
                category: Some("landscaping".into()),
                budget: Some("$8,000".into()),
            },
            recent_history: vec![ConversationTurn {
                sender_id: "pro-1".into(),
                sender_role: SenderRole::Provider,
                content: "Rocks would run about $2k more".into(),
            }],
        };

        let prompt = build_classify_prompt(&request);
        assert!(prompt.contains("project owner"));
        assert!(prompt.contains("landscaping"));
        assert!(prompt.contains("$8,000"));
        assert!(prompt.contains("Rocks would run"));
        assert!(prompt.contains("mulch instead of rocks"));
    }

    #[test]
    fn prompt_caps_history_at_three_turns() {
        let turn = |content: &str| ConversationTurn {
            sender_id: "pro-1".into(),
            sender_role: SenderRole::Provider,
            content: content.into(),
        };
        let request = TextClassifyRequest {
            content: "ok".into(),
            sender_role: SenderRole::Provider,
            transaction: TransactionContext::default(),
            recent_history: vec![turn("one"), turn("two"), turn("three"), turn("four")],
        };

        let prompt = build_classify_prompt(&request);
        assert!(prompt.contains("[3]"));
        assert!(!prompt.contains("[4]"));
    }

    // ── Response parsing ────────────────────────────────────────────

    #[test]
    fn parse_threat_response() {
        let raw = r#"{"threats": ["contact information"], "confidence": 0.93,
            "explanation": "phone number present", "recommended_action": "redact",
            "safe_alternative": "Call me to discuss"}"#;
        let result = parse_classify_response(raw, "test-model").unwrap();
        assert_eq!(result.threat_labels, vec!["contact information"]);
        assert!((result.confidence - 0.93).abs() < 0.001);
        assert_eq!(result.recommended_action, Some(RecommendedAction::Redact));
        assert_eq!(
            result.alternative_safe_text.as_deref(),
            Some("Call me to discuss")
        );
        assert_eq!(result.source, ClassifierSource::Model("test-model".into()));
    }

    #[test]
    fn parse_clean_response() {
        let raw = r#"{"threats": [], "confidence": 0.97, "explanation": "normal project talk",
            "recommended_action": "allow"}"#;
        let result = parse_classify_response(raw, "m").unwrap();
        assert!(result.threat_labels.is_empty());
        assert!(result.alternative_safe_text.is_none());
        assert_eq!(result.recommended_action, Some(RecommendedAction::Allow));
    }

    #[test]
    fn parse_scope_change_response() {
        let raw = r#"{"threats": [], "confidence": 0.9, "scope_changes": ["material change"],
            "scope_change_details": {"from": "rocks", "to": "mulch"}}"#;
        let result = parse_classify_response(raw, "m").unwrap();
        assert_eq!(result.scope_change_labels, vec!["material change"]);
        assert_eq!(result.scope_change_details["to"], "mulch");
    }

    #[test]
    fn parse_markdown_wrapped_response() {
        let raw = "Here you go:\n```json\n{\"threats\": [\"payment bypass\"], \"confidence\": 0.88}\n```";
        let result = parse_classify_response(raw, "m").unwrap();
        assert_eq!(result.threat_labels, vec!["payment bypass"]);
    }

    #[test]
    fn parse_response_with_surrounding_text() {
        let raw = "Assessment: {\"threats\": [], \"confidence\": 0.8} as requested.";
        let result = parse_classify_response(raw, "m").unwrap();
        assert!(result.threat_labels.is_empty());
    }

    #[test]
    fn parse_garbage_fails() {
        assert!(parse_classify_response("not json at all", "m").is_err());
    }

    #[test]
    fn parse_confidence_clamped() {
        let raw = r#"{"threats": [], "confidence": 1.7}"#;
        let result = parse_classify_response(raw, "m").unwrap();
        assert!((result.confidence - 1.0).abs() < 0.001);
    }

    #[test]
    fn parse_unknown_recommended_action_becomes_none() {
        let raw = r#"{"threats": [], "confidence": 0.5, "recommended_action": "escalate"}"#;
        let result = parse_classify_response(raw, "m").unwrap();
        assert!(result.recommended_action.is_none());
    }

    // ── JSON extraction ─────────────────────────────────────────────

    #[test]
    fn extract_json_direct_object() {
        let input = r#"{"threats": []}"#;
        assert_eq!(extract_json_object(input), input);
    }

    #[test]
    fn extract_json_from_bare_code_block() {
        let input = "```\n{\"threats\": []}\n```";
        assert!(extract_json_object(input).starts_with('{'));
    }
}
