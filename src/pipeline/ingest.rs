//! Ingestion & normalization — raw request to immutable `MessageUnit`.

use chrono::Utc;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::message::{MessageKind, MessageUnit, SubmitRequest};

/// A normalized unit ready for classification.
#[derive(Debug)]
pub struct IngestedUnit {
    pub unit: MessageUnit,
    /// Text handed to the classifier as one pass — message content plus, for
    /// bid submissions, the three prose fields. Concatenating defeats
    /// fragment evasion: short, individually-innocuous pieces are read
    /// together.
    pub classification_text: String,
}

/// Assemble one immutable `MessageUnit` from a raw submission.
pub fn ingest(request: SubmitRequest) -> Result<IngestedUnit, PipelineError> {
    let SubmitRequest {
        content,
        sender_role,
        sender_id,
        recipient_id,
        transaction_id,
        conversation_id,
        kind,
        attachments,
        bid,
    } = request;

    if sender_id.is_empty() {
        return Err(PipelineError::Ingestion("sender_id is required".into()));
    }
    if transaction_id.is_empty() {
        return Err(PipelineError::Ingestion("transaction_id is required".into()));
    }
    if content.trim().is_empty() && attachments.is_empty() && bid.is_none() {
        return Err(PipelineError::Ingestion(
            "submission has no content, attachments, or bid".into(),
        ));
    }
    if kind == MessageKind::BidSubmission && bid.is_none() {
        return Err(PipelineError::Ingestion(
            "bid_submission kind requires a bid payload".into(),
        ));
    }

    let classification_text = match (&kind, &bid) {
        (MessageKind::BidSubmission, Some(fields)) => {
            let mut combined = String::with_capacity(
                content.len()
                    + fields.proposal.len()
                    + fields.approach.len()
                    + fields.warranty.len()
                    + 3,
            );
            combined.push_str(&content);
            for field in [&fields.proposal, &fields.approach, &fields.warranty] {
                if !field.is_empty() {
                    if !combined.is_empty() {
                        combined.push('\n');
                    }
                    combined.push_str(field);
                }
            }
            combined
        }
        _ => content.clone(),
    };

    let unit = MessageUnit {
        id: Uuid::new_v4().to_string(),
        original_content: content,
        sender_role,
        sender_id,
        recipient_id,
        transaction_id,
        conversation_id,
        kind,
        attachments,
        bid,
        received_at: Utc::now(),
    };

    Ok(IngestedUnit {
        unit,
        classification_text,
    })
}
