//! Unified `Database` trait — single async interface for all persistence.
//!
//! Covers the live message store, the append-only blocked audit log,
//! per-target annotations, bid records, and the transaction-registry reads
//! the classifier uses for context.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::classifier::TransactionContext;
use crate::error::DatabaseError;
use crate::message::{ConversationTurn, MessageKind, SenderRole};
use crate::pipeline::annotator::Annotation;
use crate::pipeline::decision::{Decision, ThreatCategory};

/// A message accepted into the live store.
///
/// `original_content` is retained for audit only and is never re-exposed to
/// the counterpart.
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    pub id: String,
    pub transaction_id: String,
    pub conversation_id: Option<String>,
    pub sender_id: String,
    pub sender_role: SenderRole,
    pub recipient_id: Option<String>,
    pub kind: MessageKind,
    pub filtered_content: String,
    pub original_content: String,
    pub threats: Vec<ThreatCategory>,
    pub decision: Decision,
    pub confidence: f32,
    pub pipeline_version: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of a blocked message. Never enters the live store.
#[derive(Debug, Clone)]
pub struct BlockedAudit {
    pub id: String,
    pub transaction_id: String,
    pub sender_id: String,
    pub sender_role: SenderRole,
    pub recipient_id: Option<String>,
    pub original_content: String,
    pub threats: Vec<ThreatCategory>,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

/// A persisted bid, post-filtering.
#[derive(Debug, Clone)]
pub struct BidRecord {
    pub id: String,
    pub transaction_id: String,
    pub provider_id: String,
    pub amount: Decimal,
    pub timeline_start: NaiveDate,
    pub timeline_end: NaiveDate,
    pub proposal: String,
    pub approach: String,
    pub warranty: String,
    pub filtered_by_pipeline: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Backend-agnostic persistence trait for the mediation core.
///
/// Implementations must give single-row atomicity — concurrent inserts for
/// different messages never interfere. No cross-message locking is needed.
#[async_trait]
pub trait Database: Send + Sync {
    /// Create tables if they don't exist. Idempotent.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Live message store ──────────────────────────────────────────

    /// Insert a delivered (filtered) message.
    async fn insert_delivered(&self, message: &DeliveredMessage) -> Result<(), DatabaseError>;

    /// Messages on a transaction, oldest first.
    async fn messages_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<DeliveredMessage>, DatabaseError>;

    /// The most recent turns on a transaction, oldest first, capped at `limit`.
    async fn recent_turns(
        &self,
        transaction_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, DatabaseError>;

    /// Distinct provider ids that have exchanged messages on a transaction,
    /// excluding `exclude_id`.
    async fn providers_on_transaction(
        &self,
        transaction_id: &str,
        exclude_id: &str,
    ) -> Result<Vec<String>, DatabaseError>;

    // ── Blocked audit log ───────────────────────────────────────────

    /// Append a blocked-message audit record.
    async fn insert_blocked(&self, audit: &BlockedAudit) -> Result<(), DatabaseError>;

    /// Audit records for a transaction, oldest first.
    async fn blocked_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<BlockedAudit>, DatabaseError>;

    // ── Annotations ─────────────────────────────────────────────────

    /// Persist one single-target annotation.
    async fn insert_annotation(
        &self,
        transaction_id: &str,
        annotation: &Annotation,
    ) -> Result<(), DatabaseError>;

    /// Annotations on a transaction, oldest first.
    async fn annotations_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<Annotation>, DatabaseError>;

    // ── Bids ────────────────────────────────────────────────────────

    /// Insert or replace the bid for (transaction, provider).
    /// Returns the bid id.
    async fn upsert_bid(&self, bid: &BidRecord) -> Result<String, DatabaseError>;

    /// A provider's bid on a transaction, if any.
    async fn bid_for_provider(
        &self,
        transaction_id: &str,
        provider_id: &str,
    ) -> Result<Option<BidRecord>, DatabaseError>;

    /// Count of distinct providers with a bid on the transaction.
    async fn bid_provider_count(&self, transaction_id: &str) -> Result<u64, DatabaseError>;

    // ── Transaction registry ────────────────────────────────────────

    /// Seed a transaction's context. The registry itself is owned by the
    /// wider platform; this mirror exists for classifier grounding.
    async fn insert_transaction(
        &self,
        transaction_id: &str,
        category: Option<&str>,
        budget: Option<&str>,
    ) -> Result<(), DatabaseError>;

    /// Category/budget context for a transaction. Unknown transactions get
    /// an empty context, not an error.
    async fn transaction_context(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionContext, DatabaseError>;
}
