//! The message pipeline — classify, decide, redact, annotate, persist.
//!
//! Flow per message (strictly ordered, never reordered):
//! 1. Ingestion → immutable `MessageUnit`
//! 2. Context reads (transaction registry, last conversation turns)
//! 3. Classification (ordered variants → deterministic fallback)
//! 4. Attachment analysis, one attachment at a time
//! 5. Decision table
//! 6. Scope-change detection (owner messages only)
//! 7. Redaction
//! 8. Annotations
//! 9. Persistence (live store or blocked audit log, plus bid records)
//!
//! Every stage failure past ingestion converts to a conservative default —
//! `submit` always reaches a terminal decision. There is no cancellation.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::annotator::{self, Annotation};
use super::decision::{Decision, ThreatCategory, decide, map_threat_labels};
use super::ingest::{IngestedUnit, ingest};
use super::redactor::Redactor;
use super::scope::{self, ScopeChangeCategory, ScopeChangeReport};
use crate::classifier::{
    ClassifierResult, ClassifierSource, SecurityClassifier, TextClassifyRequest,
    TransactionContext,
};
use crate::config::{PIPELINE_VERSION, PipelineConfig};
use crate::error::PipelineError;
use crate::message::{
    AttachmentKind, BidFields, ConversationTurn, MessageKind, MessageUnit, SenderRole,
    SubmitRequest,
};
use crate::stats::PipelineStats;
use crate::store::{BidRecord, BlockedAudit, Database, DeliveredMessage};

/// The filtered form of a message, ready for persistence.
#[derive(Debug, Clone)]
pub struct FilteredMessage {
    pub filtered_content: String,
    pub decision: Decision,
    pub threats_detected: Vec<ThreatCategory>,
    pub confidence_score: f32,
    pub approved_for_delivery: bool,
}

/// Structured result of one submission. Always returned, even under
/// classifier outage or persistence failure.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub approved: bool,
    pub filtered_content: String,
    pub decision: Decision,
    pub threats_detected: Vec<ThreatCategory>,
    pub confidence_score: f32,
    pub annotations: Vec<Annotation>,
    pub scope_changes: Vec<ScopeChangeCategory>,
    pub other_participants_to_notify: Vec<String>,
    /// Structured record for the external notification dispatcher.
    pub scope_report: Option<ScopeChangeReport>,
    /// True only when the live-store write was confirmed. An approved
    /// message with `delivery_confirmed == false` means the write failed
    /// and the caller must not report success.
    pub delivery_confirmed: bool,
    pub message_id: Option<String>,
    pub bid_saved: Option<bool>,
    pub bid_id: Option<String>,
    pub bid_summary: Option<String>,
}

/// The mediation pipeline. One instance serves many concurrent messages;
/// each submission flows through its own sequential stage chain.
pub struct MessagePipeline {
    classifier: Arc<SecurityClassifier>,
    store: Arc<dyn Database>,
    stats: Arc<PipelineStats>,
    redactor: Redactor,
    config: PipelineConfig,
}

impl MessagePipeline {
    pub fn new(
        classifier: Arc<SecurityClassifier>,
        store: Arc<dyn Database>,
        stats: Arc<PipelineStats>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            classifier,
            store,
            stats,
            redactor: Redactor::new(),
            config,
        }
    }

    /// Run one submission through the full pipeline.
    ///
    /// The only error path is ingestion validation; past that boundary every
    /// failure degrades to a conservative default inside the returned outcome.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome, PipelineError> {
        let IngestedUnit {
            unit,
            classification_text,
        } = ingest(request)?;
        self.stats.record_processed();

        info!(
            id = %unit.id,
            transaction = %unit.transaction_id,
            kind = unit.kind.as_str(),
            sender_role = unit.sender_role.as_str(),
            "Processing inbound message"
        );

        // Stage 2: context reads — failures degrade to empty context.
        let transaction = self.read_transaction_context(&unit).await;
        let history = self.read_recent_turns(&unit).await;

        // Stage 3: classify the combined text unit.
        let classify_request = TextClassifyRequest {
            content: classification_text,
            sender_role: unit.sender_role,
            transaction,
            recent_history: history,
        };
        let result = self.classifier.classify_text(&classify_request).await;
        let degraded = result.source == ClassifierSource::Fallback;
        if degraded {
            self.stats.record_classifier_fallback();
        }

        // Stage 4: attachments, strictly one at a time.
        let mut labels = result.threat_labels.clone();
        let mut detection_confidences: Vec<f32> = Vec::new();
        if !result.threat_labels.is_empty() {
            detection_confidences.push(result.confidence);
        }
        self.analyze_attachments(&unit, &mut labels, &mut detection_confidences)
            .await;

        // Stage 5: decide.
        let threats = map_threat_labels(&labels);
        let decision = if degraded && !threats.is_empty() {
            // Degraded-mode conservatism: the fallback collapses every
            // detected threat to Block.
            Decision::Block
        } else {
            decide(&threats)
        };
        // When anything was detected, report the strongest evidence backing
        // the decision; otherwise the text classifier's own certainty.
        let confidence = if detection_confidences.is_empty() {
            result.confidence
        } else {
            detection_confidences.iter().copied().fold(0.0_f32, f32::max)
        };

        match decision {
            Decision::Allow => self.stats.record_allowed(),
            Decision::Redact => self.stats.record_redacted(),
            Decision::Block => self.stats.record_blocked(),
        }
        info!(
            id = %unit.id,
            decision = decision.label(),
            threats = threats.len(),
            confidence,
            "Decision reached"
        );

        // Stage 6: scope-change detection, owner messages only.
        let (scope_report, scope_annotation) = self.detect_scope_change(&unit, &result).await;

        // Stage 7: redact.
        let filtered = FilteredMessage {
            filtered_content: self
                .redactor
                .apply(&unit.original_content, decision, &result),
            decision,
            threats_detected: threats.iter().copied().collect(),
            confidence_score: confidence,
            approved_for_delivery: decision != Decision::Block,
        };

        // Stage 8: annotations.
        let mut annotations = annotator::decision_annotations(
            decision,
            &threats,
            unit.sender_role,
            &unit.sender_id,
            unit.recipient_id.as_deref(),
        );
        if let Some(annotation) = scope_annotation {
            annotations.push(annotation);
        }

        // Stage 9: persist message, bid, and annotations.
        let (delivery_confirmed, message_id) = self.persist_message(&unit, &filtered).await;

        let (bid_saved, bid_id, bid_summary) =
            self.persist_bid(&unit, decision, &mut annotations).await;

        self.persist_annotations(&unit, &annotations).await;

        let (scope_changes, other_participants_to_notify) = match &scope_report {
            Some(report) => (
                report.categories.clone(),
                report.other_participant_ids.clone(),
            ),
            None => (Vec::new(), Vec::new()),
        };

        Ok(SubmitOutcome {
            approved: filtered.approved_for_delivery,
            filtered_content: filtered.filtered_content,
            decision,
            threats_detected: filtered.threats_detected,
            confidence_score: filtered.confidence_score,
            annotations,
            scope_changes,
            other_participants_to_notify,
            scope_report,
            delivery_confirmed,
            message_id,
            bid_saved,
            bid_id,
            bid_summary,
        })
    }

    /// Current stats snapshot (observability only).
    pub fn stats(&self) -> crate::stats::StatsSnapshot {
        self.stats.snapshot()
    }

    // ── Context reads ───────────────────────────────────────────────

    async fn read_transaction_context(&self, unit: &MessageUnit) -> TransactionContext {
        match tokio::time::timeout(
            self.config.persist_timeout,
            self.store.transaction_context(&unit.transaction_id),
        )
        .await
        {
            Ok(Ok(context)) => context,
            Ok(Err(e)) => {
                warn!(error = %e, "Transaction context read failed, classifying without it");
                TransactionContext::default()
            }
            Err(_) => {
                warn!("Transaction context read timed out, classifying without it");
                TransactionContext::default()
            }
        }
    }

    async fn read_recent_turns(&self, unit: &MessageUnit) -> Vec<ConversationTurn> {
        match tokio::time::timeout(
            self.config.persist_timeout,
            self.store
                .recent_turns(&unit.transaction_id, self.config.max_context_turns),
        )
        .await
        {
            Ok(Ok(turns)) => turns,
            Ok(Err(e)) => {
                warn!(error = %e, "History read failed, classifying without context");
                Vec::new()
            }
            Err(_) => {
                warn!("History read timed out, classifying without context");
                Vec::new()
            }
        }
    }

    // ── Attachments ─────────────────────────────────────────────────

    /// Analyze attachments sequentially, merging detections into the label
    /// set. Fail-closed analyses count as attachment failures.
    async fn analyze_attachments(
        &self,
        unit: &MessageUnit,
        labels: &mut Vec<String>,
        detection_confidences: &mut Vec<f32>,
    ) {
        for attachment in &unit.attachments {
            match &attachment.kind {
                AttachmentKind::Image { format } => {
                    let analysis = self
                        .classifier
                        .classify_image(&attachment.bytes, format)
                        .await;
                    if analysis.contact_info_detected && analysis.confidence <= 0.5 {
                        self.stats.record_attachment_failure();
                    }
                    if analysis.contact_info_detected {
                        labels.push(format!(
                            "contact information detected in image attachment {}",
                            attachment.filename
                        ));
                        detection_confidences.push(analysis.confidence);
                    }
                    if !analysis.social_handles.is_empty() {
                        labels.push(format!(
                            "social media handle in image attachment {}",
                            attachment.filename
                        ));
                        detection_confidences.push(analysis.confidence);
                    }
                }
                AttachmentKind::Document => {
                    let analysis = self
                        .classifier
                        .classify_document(
                            &attachment.bytes,
                            &attachment.filename,
                            unit.sender_role,
                        )
                        .await;
                    if analysis.contact_info_detected && analysis.text_sample.is_none() {
                        self.stats.record_attachment_failure();
                    }
                    if analysis.contact_info_detected {
                        detection_confidences.push(analysis.confidence);
                    }
                    labels.extend(analysis.threat_labels);
                }
            }
        }
    }

    // ── Scope detection ─────────────────────────────────────────────

    async fn detect_scope_change(
        &self,
        unit: &MessageUnit,
        result: &ClassifierResult,
    ) -> (Option<ScopeChangeReport>, Option<Annotation>) {
        if unit.sender_role != SenderRole::Owner
            || unit.kind == MessageKind::System
            || result.scope_change_labels.is_empty()
        {
            return (None, None);
        }

        let others = match self
            .store
            .providers_on_transaction(&unit.transaction_id, &unit.sender_id)
            .await
        {
            Ok(others) => others,
            Err(e) => {
                warn!(error = %e, "Provider lookup failed, skipping scope question");
                return (None, None);
            }
        };

        match scope::build_report(
            &result.scope_change_labels,
            result.scope_change_details.clone(),
            others,
        ) {
            Some((report, question)) => {
                debug!(
                    categories = report.categories.len(),
                    providers = report.other_participant_ids.len(),
                    "Scope change detected"
                );
                let annotation = annotator::scope_question(&unit.sender_id, question);
                (Some(report), Some(annotation))
            }
            None => (None, None),
        }
    }

    // ── Persistence ─────────────────────────────────────────────────

    /// Write the message to the live store (approved) or the blocked audit
    /// log. Returns `(delivery_confirmed, message_id)`.
    async fn persist_message(
        &self,
        unit: &MessageUnit,
        filtered: &FilteredMessage,
    ) -> (bool, Option<String>) {
        if filtered.approved_for_delivery {
            let record = DeliveredMessage {
                id: unit.id.clone(),
                transaction_id: unit.transaction_id.clone(),
                conversation_id: unit.conversation_id.clone(),
                sender_id: unit.sender_id.clone(),
                sender_role: unit.sender_role,
                recipient_id: unit.recipient_id.clone(),
                kind: unit.kind,
                filtered_content: filtered.filtered_content.clone(),
                original_content: unit.original_content.clone(),
                threats: filtered.threats_detected.clone(),
                decision: filtered.decision,
                confidence: filtered.confidence_score,
                pipeline_version: PIPELINE_VERSION.to_string(),
                created_at: unit.received_at,
            };
            match tokio::time::timeout(
                self.config.persist_timeout,
                self.store.insert_delivered(&record),
            )
            .await
            {
                Ok(Ok(())) => (true, Some(unit.id.clone())),
                Ok(Err(e)) => {
                    error!(id = %unit.id, error = %e, "Live store write failed");
                    self.stats.record_persistence_failure();
                    (false, None)
                }
                Err(_) => {
                    error!(id = %unit.id, "Live store write timed out");
                    self.stats.record_persistence_failure();
                    (false, None)
                }
            }
        } else {
            // Every block is audited, even though it is never delivered.
            let audit = BlockedAudit {
                id: unit.id.clone(),
                transaction_id: unit.transaction_id.clone(),
                sender_id: unit.sender_id.clone(),
                sender_role: unit.sender_role,
                recipient_id: unit.recipient_id.clone(),
                original_content: unit.original_content.clone(),
                threats: filtered.threats_detected.clone(),
                confidence: filtered.confidence_score,
                created_at: unit.received_at,
            };
            match tokio::time::timeout(
                self.config.persist_timeout,
                self.store.insert_blocked(&audit),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(id = %unit.id, error = %e, "Blocked audit write failed");
                    self.stats.record_persistence_failure();
                }
                Err(_) => {
                    error!(id = %unit.id, "Blocked audit write timed out");
                    self.stats.record_persistence_failure();
                }
            }
            (false, None)
        }
    }

    /// Filter and persist bid fields. Only fully blocked submissions skip
    /// the bid record entirely.
    async fn persist_bid(
        &self,
        unit: &MessageUnit,
        decision: Decision,
        annotations: &mut Vec<Annotation>,
    ) -> (Option<bool>, Option<String>, Option<String>) {
        let Some(fields) = unit.bid.as_ref() else {
            return (None, None, None);
        };
        if unit.kind != MessageKind::BidSubmission {
            return (None, None, None);
        }
        if decision == Decision::Block {
            info!(id = %unit.id, "Bid submission fully blocked, skipping bid record");
            return (Some(false), None, None);
        }

        let (proposal, approach, warranty) = self.filter_bid_fields(unit, fields).await;

        let now = Utc::now();
        let record = BidRecord {
            id: Uuid::new_v4().to_string(),
            transaction_id: unit.transaction_id.clone(),
            provider_id: unit.sender_id.clone(),
            amount: fields.amount,
            timeline_start: fields.timeline_start,
            timeline_end: fields.timeline_end,
            proposal,
            approach,
            warranty,
            filtered_by_pipeline: true,
            created_at: now,
            updated_at: now,
        };

        let bid_id = match tokio::time::timeout(
            self.config.persist_timeout,
            self.store.upsert_bid(&record),
        )
        .await
        {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                // Recorded for operator remediation; the message outcome stands.
                error!(id = %unit.id, error = %e, "Bid record write failed");
                self.stats.record_bid_field_failure();
                return (Some(false), None, None);
            }
            Err(_) => {
                error!(id = %unit.id, "Bid record write timed out");
                self.stats.record_bid_field_failure();
                return (Some(false), None, None);
            }
        };

        // Conversation-visible summary, built from the numeric amount only —
        // it can never reintroduce unfiltered text.
        let summary = format!("Bid submitted: ${}", format_amount(fields.amount));
        self.persist_bid_summary(unit, &summary).await;

        // Best-effort interest hint for the owner.
        if let Some(owner_id) = unit.recipient_id.as_deref() {
            match self.store.bid_provider_count(&unit.transaction_id).await {
                Ok(count) if count >= 2 => {
                    annotations.push(annotator::bid_interest_suggestion(owner_id, count));
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Bid count read failed, skipping suggestion"),
            }
        }

        (Some(true), Some(bid_id), Some(summary))
    }

    /// Classify and redact each prose bid field on its own pass.
    ///
    /// Field-level decisions are independent: a Block on one field turns
    /// only that field into a placeholder. Amount and timeline never pass
    /// through here.
    async fn filter_bid_fields(
        &self,
        unit: &MessageUnit,
        fields: &BidFields,
    ) -> (String, String, String) {
        let mut filtered = Vec::with_capacity(3);
        for original in [&fields.proposal, &fields.approach, &fields.warranty] {
            if original.trim().is_empty() {
                filtered.push(original.clone());
                continue;
            }

            let request = TextClassifyRequest {
                content: original.clone(),
                sender_role: unit.sender_role,
                transaction: TransactionContext::default(),
                recent_history: Vec::new(),
            };
            let result = self.classifier.classify_text(&request).await;
            let threats = map_threat_labels(&result.threat_labels);
            let field_decision =
                if result.source == ClassifierSource::Fallback && !threats.is_empty() {
                    Decision::Block
                } else {
                    decide(&threats)
                };
            filtered.push(
                self.redactor
                    .apply_to_field(original, field_decision, &result, &threats),
            );
        }

        let mut iter = filtered.into_iter();
        (
            iter.next().unwrap_or_default(),
            iter.next().unwrap_or_default(),
            iter.next().unwrap_or_default(),
        )
    }

    /// Persist the bid summary as a System-kind conversation line.
    async fn persist_bid_summary(&self, unit: &MessageUnit, summary: &str) {
        let record = DeliveredMessage {
            id: Uuid::new_v4().to_string(),
            transaction_id: unit.transaction_id.clone(),
            conversation_id: unit.conversation_id.clone(),
            sender_id: unit.sender_id.clone(),
            sender_role: unit.sender_role,
            recipient_id: unit.recipient_id.clone(),
            kind: MessageKind::System,
            filtered_content: summary.to_string(),
            original_content: summary.to_string(),
            threats: Vec::new(),
            decision: Decision::Allow,
            confidence: 1.0,
            pipeline_version: PIPELINE_VERSION.to_string(),
            created_at: Utc::now(),
        };
        match tokio::time::timeout(
            self.config.persist_timeout,
            self.store.insert_delivered(&record),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Bid summary write failed"),
            Err(_) => warn!("Bid summary write timed out"),
        }
    }

    async fn persist_annotations(&self, unit: &MessageUnit, annotations: &[Annotation]) {
        for annotation in annotations {
            match tokio::time::timeout(
                self.config.persist_timeout,
                self.store
                    .insert_annotation(&unit.transaction_id, annotation),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Annotation write failed"),
                Err(_) => warn!("Annotation write timed out"),
            }
        }
    }
}

/// Format a bid amount with thousands separators ("15000" → "15,000").
fn format_amount(amount: Decimal) -> String {
    let s = amount.normalize().to_string();
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (s, None),
    };
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest.to_string()),
        None => ("", int_part),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use crate::classifier::provider::{ClassifierModel, ImageAnalysis};
    use crate::error::ClassifierError;
    use crate::message::{Attachment, AttachmentKind};
    use crate::store::LibSqlBackend;

    /// Deterministic stand-in for the live classifier: simple content rules
    /// instead of a model call.
    struct RuleMock;

    #[async_trait::async_trait]
    impl ClassifierModel for RuleMock {
        fn model_name(&self) -> &str {
            "rule-mock"
        }

        async fn classify_text(
            &self,
            request: &TextClassifyRequest,
        ) -> Result<ClassifierResult, ClassifierError> {
            let content = request.content.to_lowercase();
            let mut result = ClassifierResult::clean("rule-mock", 0.9);

            if content.contains("555-") {
                result
                    .threat_labels
                    .push("contact information - phone number".into());
            }
            if content.contains('@') {
                result
                    .threat_labels
                    .push("contact information - email address".into());
            }
            if content.contains("cash") || content.contains("venmo") {
                result.threat_labels.push("payment bypass".into());
            }
            if content.contains("mulch instead") {
                result.scope_change_labels.push("material change".into());
                result.scope_change_details = serde_json::json!({"to": "mulch"});
            }
            Ok(result)
        }

        async fn classify_image(
            &self,
            _bytes: &[u8],
            _format: &str,
        ) -> Result<ImageAnalysis, ClassifierError> {
            Err(ClassifierError::ImageAnalysis("no vision in mock".into()))
        }
    }

    /// Always-failing model to force the fallback path.
    struct DownMock;

    #[async_trait::async_trait]
    impl ClassifierModel for DownMock {
        fn model_name(&self) -> &str {
            "down"
        }

        async fn classify_text(
            &self,
            _request: &TextClassifyRequest,
        ) -> Result<ClassifierResult, ClassifierError> {
            Err(ClassifierError::RequestFailed {
                model: "down".into(),
                reason: "outage".into(),
            })
        }

        async fn classify_image(
            &self,
            _bytes: &[u8],
            _format: &str,
        ) -> Result<ImageAnalysis, ClassifierError> {
            Err(ClassifierError::ImageAnalysis("outage".into()))
        }
    }

    async fn pipeline_with(model: Arc<dyn ClassifierModel>) -> MessagePipeline {
        let classifier = Arc::new(SecurityClassifier::new(
            vec![model],
            Duration::from_secs(5),
        ));
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        MessagePipeline::new(
            classifier,
            store,
            Arc::new(PipelineStats::new()),
            PipelineConfig::default(),
        )
    }

    fn request(content: &str, role: SenderRole) -> SubmitRequest {
        SubmitRequest {
            content: content.into(),
            sender_role: role,
            sender_id: match role {
                SenderRole::Owner => "owner-1".into(),
                SenderRole::Provider => "pro-1".into(),
            },
            recipient_id: Some(match role {
                SenderRole::Owner => "pro-1".into(),
                SenderRole::Provider => "owner-1".into(),
            }),
            transaction_id: "txn-1".into(),
            conversation_id: None,
            kind: MessageKind::Text,
            attachments: vec![],
            bid: None,
        }
    }

    #[tokio::test]
    async fn clean_message_is_allowed_unchanged() {
        let pipeline = pipeline_with(Arc::new(RuleMock)).await;
        let content = "I can do the cabinets for $15,000, two week timeline. Any color preference?";
        let outcome = pipeline
            .submit(request(content, SenderRole::Provider))
            .await
            .unwrap();

        assert_eq!(outcome.decision, Decision::Allow);
        assert!(outcome.approved);
        assert!(outcome.delivery_confirmed);
        assert_eq!(outcome.filtered_content, content);
        assert!(outcome.threats_detected.is_empty());
        assert!(outcome.annotations.is_empty());
    }

    #[tokio::test]
    async fn phone_number_is_redacted_with_placeholder() {
        let pipeline = pipeline_with(Arc::new(RuleMock)).await;
        let outcome = pipeline
            .submit(request(
                "Call me at 555-123-4567 to discuss",
                SenderRole::Provider,
            ))
            .await
            .unwrap();

        assert_eq!(outcome.decision, Decision::Redact);
        assert!(outcome.approved);
        assert!(outcome.filtered_content.contains("[PHONE REMOVED]"));
        assert!(!outcome.filtered_content.contains("555-123-4567"));
        assert_eq!(outcome.threats_detected, vec![ThreatCategory::ContactInfo]);
        // One explanatory note to the sender only.
        assert_eq!(outcome.annotations.len(), 1);
        assert_eq!(outcome.annotations[0].visible_to_id, "pro-1");
    }

    #[tokio::test]
    async fn payment_bypass_blocks_despite_redactable_cooccurrence() {
        let pipeline = pipeline_with(Arc::new(RuleMock)).await;
        let outcome = pipeline
            .submit(request(
                "Pay me in cash and I'll knock off 10%, call 555-123-4567",
                SenderRole::Provider,
            ))
            .await
            .unwrap();

        assert_eq!(outcome.decision, Decision::Block);
        assert!(!outcome.approved);
        assert!(!outcome.delivery_confirmed);
        assert!(outcome.filtered_content.is_empty());
        assert!(outcome
            .threats_detected
            .contains(&ThreatCategory::PaymentBypass));
        // Sender warning + counterpart notice.
        assert_eq!(outcome.annotations.len(), 2);
    }

    #[tokio::test]
    async fn outage_plus_meeting_is_never_silently_allowed() {
        let pipeline = pipeline_with(Arc::new(DownMock)).await;
        let outcome = pipeline
            .submit(request("meet me at the coffee shop", SenderRole::Provider))
            .await
            .unwrap();

        // Fallback collapse: detected threat under outage → Block.
        assert_eq!(outcome.decision, Decision::Block);
        assert!(!outcome.approved);
        assert_eq!(outcome.confidence_score, 0.8);
        assert_eq!(pipeline.stats().classifier_fallbacks, 1);
    }

    #[tokio::test]
    async fn outage_plus_phone_number_blocks() {
        let pipeline = pipeline_with(Arc::new(DownMock)).await;
        let outcome = pipeline
            .submit(request("reach me on 555-867-5309", SenderRole::Provider))
            .await
            .unwrap();

        assert_eq!(outcome.decision, Decision::Block);
        assert!(outcome
            .threats_detected
            .contains(&ThreatCategory::ContactInfo));
    }

    #[tokio::test]
    async fn outage_with_clean_content_allows() {
        let pipeline = pipeline_with(Arc::new(DownMock)).await;
        let outcome = pipeline
            .submit(request(
                "The tile samples arrived, they look great",
                SenderRole::Provider,
            ))
            .await
            .unwrap();

        assert_eq!(outcome.decision, Decision::Allow);
        assert_eq!(outcome.confidence_score, 0.8);
    }

    #[tokio::test]
    async fn image_attachment_failure_fails_closed_to_redact() {
        let pipeline = pipeline_with(Arc::new(RuleMock)).await;
        let mut req = request("progress photo attached", SenderRole::Provider);
        req.attachments.push(Attachment {
            bytes: vec![0xFF, 0xD8, 0xFF],
            kind: AttachmentKind::Image {
                format: "jpeg".into(),
            },
            filename: "photo.jpg".into(),
        });

        let outcome = pipeline.submit(req).await.unwrap();
        // RuleMock has no vision → fail-closed → ContactInfo → Redact.
        assert_eq!(outcome.decision, Decision::Redact);
        assert!(outcome
            .threats_detected
            .contains(&ThreatCategory::ContactInfo));
        assert!(outcome.confidence_score <= 0.5);
        assert_eq!(pipeline.stats().attachment_failures, 1);
    }

    #[tokio::test]
    async fn bid_with_redactable_field_still_saves() {
        let pipeline = pipeline_with(Arc::new(RuleMock)).await;
        let mut req = request("Bid attached", SenderRole::Provider);
        req.kind = MessageKind::BidSubmission;
        req.bid = Some(BidFields {
            amount: dec!(15000),
            timeline_start: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            timeline_end: NaiveDate::from_ymd_opt(2026, 9, 15).unwrap(),
            proposal: "Questions? Write bob@example.com anytime".into(),
            approach: "Demo first, then install".into(),
            warranty: "Two years on labor".into(),
        });

        let outcome = pipeline.submit(req).await.unwrap();
        // Whole message redacts (email in combined pass), bid still saves.
        assert_eq!(outcome.decision, Decision::Redact);
        assert_eq!(outcome.bid_saved, Some(true));
        assert!(outcome.bid_id.is_some());
        assert_eq!(
            outcome.bid_summary.as_deref(),
            Some("Bid submitted: $15,000")
        );
    }

    #[tokio::test]
    async fn fully_blocked_bid_skips_bid_record() {
        let pipeline = pipeline_with(Arc::new(RuleMock)).await;
        let mut req = request("Pay cash and we skip the fees", SenderRole::Provider);
        req.kind = MessageKind::BidSubmission;
        req.bid = Some(BidFields {
            amount: dec!(9000),
            timeline_start: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            timeline_end: NaiveDate::from_ymd_opt(2026, 9, 10).unwrap(),
            proposal: "Cheap and fast".into(),
            approach: String::new(),
            warranty: String::new(),
        });

        let outcome = pipeline.submit(req).await.unwrap();
        assert_eq!(outcome.decision, Decision::Block);
        assert_eq!(outcome.bid_saved, Some(false));
        assert!(outcome.bid_id.is_none());
        assert!(outcome.bid_summary.is_none());
    }

    #[tokio::test]
    async fn empty_submission_is_rejected_at_ingestion() {
        let pipeline = pipeline_with(Arc::new(RuleMock)).await;
        let result = pipeline.submit(request("   ", SenderRole::Provider)).await;
        assert!(result.is_err());
    }

    #[test]
    fn amount_formatting() {
        assert_eq!(format_amount(dec!(15000)), "15,000");
        assert_eq!(format_amount(dec!(950)), "950");
        assert_eq!(format_amount(dec!(1234567)), "1,234,567");
        assert_eq!(format_amount(dec!(15000.50)), "15,000.5");
    }
}
