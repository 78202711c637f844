//! Core message types shared across the pipeline.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ── Participants ────────────────────────────────────────────────────

/// Which side of the marketplace sent the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    /// Project owner (homeowner).
    Owner,
    /// Service provider (contractor).
    Provider,
}

impl SenderRole {
    /// DB/wire string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Provider => "provider",
        }
    }
}

// ── Message kind ────────────────────────────────────────────────────

/// Closed set of message kinds.
///
/// Ingestion, redaction, and persistence all match on this exhaustively —
/// adding a kind is a compile-visible change everywhere it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Document,
    BidSubmission,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Document => "document",
            Self::BidSubmission => "bid_submission",
            Self::System => "system",
        }
    }
}

// ── Attachments ─────────────────────────────────────────────────────

/// What an attachment claims to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// Raster image; `format` is the media subtype ("jpeg", "png", "webp").
    Image { format: String },
    /// Document (PDF, text, word-processor export).
    Document,
}

/// An inbound attachment, raw bytes plus claimed type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    pub kind: AttachmentKind,
    pub filename: String,
}

// ── Bid submissions ─────────────────────────────────────────────────

/// Structured fields of a bid submission.
///
/// The three prose fields are each independently classified and redacted.
/// Amount and timeline are numeric/date data and are never filtered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidFields {
    pub amount: Decimal,
    pub timeline_start: NaiveDate,
    pub timeline_end: NaiveDate,
    pub proposal: String,
    pub approach: String,
    pub warranty: String,
}

// ── Submit request ──────────────────────────────────────────────────

/// Raw inbound submission — what the platform edge hands to the pipeline.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub content: String,
    pub sender_role: SenderRole,
    pub sender_id: String,
    pub recipient_id: Option<String>,
    pub transaction_id: String,
    pub conversation_id: Option<String>,
    pub kind: MessageKind,
    pub attachments: Vec<Attachment>,
    pub bid: Option<BidFields>,
}

// ── Message unit ────────────────────────────────────────────────────

/// One analyzable unit assembled by ingestion.
///
/// Immutable after construction: the pipeline reads it, never rewrites it.
/// Filtered output lives in `FilteredMessage`, not here.
#[derive(Debug, Clone)]
pub struct MessageUnit {
    /// Generated UUID for this unit.
    pub id: String,
    /// Exactly what the sender wrote, retained for audit.
    pub original_content: String,
    pub sender_role: SenderRole,
    pub sender_id: String,
    pub recipient_id: Option<String>,
    pub transaction_id: String,
    pub conversation_id: Option<String>,
    pub kind: MessageKind,
    pub attachments: Vec<Attachment>,
    pub bid: Option<BidFields>,
    pub received_at: DateTime<Utc>,
}

/// A prior conversation turn, supplied to the classifier as context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub sender_id: String,
    pub sender_role: SenderRole,
    pub content: String,
}
