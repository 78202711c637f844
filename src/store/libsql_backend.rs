//! libSQL backend — async `Database` trait implementation.
//!
//! Local file or in-memory databases via libsql's native async API.
//! Timestamps are RFC 3339 text; threat lists are JSON arrays of the
//! category wire strings.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::classifier::TransactionContext;
use crate::error::DatabaseError;
use crate::message::{ConversationTurn, MessageKind, SenderRole};
use crate::pipeline::annotator::{Annotation, AnnotationKind};
use crate::pipeline::decision::{Decision, ThreatCategory};
use crate::store::traits::{BidRecord, BlockedAudit, Database, DeliveredMessage};

/// libSQL database backend.
///
/// Stores a single connection reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use;
/// single-row inserts are atomic, which is all the pipeline requires.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_default()
}

fn role_to_str(role: SenderRole) -> &'static str {
    role.as_str()
}

fn str_to_role(s: &str) -> SenderRole {
    match s {
        "owner" => SenderRole::Owner,
        _ => SenderRole::Provider,
    }
}

fn kind_to_str(kind: MessageKind) -> &'static str {
    kind.as_str()
}

fn str_to_kind(s: &str) -> MessageKind {
    match s {
        "image" => MessageKind::Image,
        "document" => MessageKind::Document,
        "bid_submission" => MessageKind::BidSubmission,
        "system" => MessageKind::System,
        _ => MessageKind::Text,
    }
}

fn str_to_decision(s: &str) -> Decision {
    match s {
        "redact" => Decision::Redact,
        "block" => Decision::Block,
        _ => Decision::Allow,
    }
}

fn str_to_annotation_kind(s: &str) -> AnnotationKind {
    match s {
        "warning" => AnnotationKind::Warning,
        "suggestion" => AnnotationKind::Suggestion,
        "scope_question" => AnnotationKind::ScopeQuestion,
        _ => AnnotationKind::Info,
    }
}

/// Serialize a threat list as a JSON array of wire strings.
fn threats_to_json(threats: &[ThreatCategory]) -> String {
    let strs: Vec<&str> = threats.iter().map(|t| t.as_str()).collect();
    serde_json::to_string(&strs).unwrap_or_else(|_| "[]".to_string())
}

/// Parse a JSON threat array; unknown strings drop.
fn json_to_threats(json: &str) -> Vec<ThreatCategory> {
    let strs: Vec<String> = serde_json::from_str(json).unwrap_or_default();
    strs.iter()
        .filter_map(|s| match s.as_str() {
            "contact_info" => Some(ThreatCategory::ContactInfo),
            "social_media" => Some(ThreatCategory::SocialMedia),
            "external_meeting" => Some(ThreatCategory::ExternalMeeting),
            "payment_bypass" => Some(ThreatCategory::PaymentBypass),
            "platform_bypass" => Some(ThreatCategory::PlatformBypass),
            _ => None,
        })
        .collect()
}

fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn row_to_delivered(row: &libsql::Row) -> Result<DeliveredMessage, libsql::Error> {
    let role_str: String = row.get(4)?;
    let kind_str: String = row.get(6)?;
    let threats_str: String = row.get(9)?;
    let decision_str: String = row.get(10)?;
    let confidence: f64 = row.get(11)?;
    let created_str: String = row.get(13)?;

    Ok(DeliveredMessage {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        conversation_id: row.get::<String>(2).ok(),
        sender_id: row.get(3)?,
        sender_role: str_to_role(&role_str),
        recipient_id: row.get::<String>(5).ok(),
        kind: str_to_kind(&kind_str),
        filtered_content: row.get(7)?,
        original_content: row.get(8)?,
        threats: json_to_threats(&threats_str),
        decision: str_to_decision(&decision_str),
        confidence: confidence as f32,
        pipeline_version: row.get(12)?,
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_blocked(row: &libsql::Row) -> Result<BlockedAudit, libsql::Error> {
    let role_str: String = row.get(3)?;
    let threats_str: String = row.get(6)?;
    let confidence: f64 = row.get(7)?;
    let created_str: String = row.get(8)?;

    Ok(BlockedAudit {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_role: str_to_role(&role_str),
        recipient_id: row.get::<String>(4).ok(),
        original_content: row.get(5)?,
        threats: json_to_threats(&threats_str),
        confidence: confidence as f32,
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_bid(row: &libsql::Row) -> Result<BidRecord, libsql::Error> {
    let amount_str: String = row.get(3)?;
    let start_str: String = row.get(4)?;
    let end_str: String = row.get(5)?;
    let filtered: i64 = row.get(9)?;
    let created_str: String = row.get(10)?;
    let updated_str: String = row.get(11)?;

    Ok(BidRecord {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        provider_id: row.get(2)?,
        amount: amount_str.parse::<Decimal>().unwrap_or_default(),
        timeline_start: parse_date(&start_str),
        timeline_end: parse_date(&end_str),
        proposal: row.get(6)?,
        approach: row.get(7)?,
        warranty: row.get(8)?,
        filtered_by_pipeline: filtered != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const MESSAGE_COLUMNS: &str = "id, transaction_id, conversation_id, sender_id, sender_role, \
     recipient_id, kind, filtered_content, original_content, threats, decision, confidence, \
     pipeline_version, created_at";

const BLOCKED_COLUMNS: &str = "id, transaction_id, sender_id, sender_role, recipient_id, \
     original_content, threats, confidence, created_at";

const BID_COLUMNS: &str = "id, transaction_id, provider_id, amount, timeline_start, \
     timeline_end, proposal, approach, warranty, filtered_by_pipeline, created_at, updated_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS messages (
                    id TEXT PRIMARY KEY,
                    transaction_id TEXT NOT NULL,
                    conversation_id TEXT,
                    sender_id TEXT NOT NULL,
                    sender_role TEXT NOT NULL,
                    recipient_id TEXT,
                    kind TEXT NOT NULL,
                    filtered_content TEXT NOT NULL,
                    original_content TEXT NOT NULL,
                    threats TEXT NOT NULL DEFAULT '[]',
                    decision TEXT NOT NULL,
                    confidence REAL NOT NULL,
                    pipeline_version TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_messages_transaction
                    ON messages(transaction_id);

                CREATE TABLE IF NOT EXISTS blocked_messages (
                    id TEXT PRIMARY KEY,
                    transaction_id TEXT NOT NULL,
                    sender_id TEXT NOT NULL,
                    sender_role TEXT NOT NULL,
                    recipient_id TEXT,
                    original_content TEXT NOT NULL,
                    threats TEXT NOT NULL DEFAULT '[]',
                    confidence REAL NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_blocked_transaction
                    ON blocked_messages(transaction_id);

                CREATE TABLE IF NOT EXISTS annotations (
                    id TEXT PRIMARY KEY,
                    transaction_id TEXT NOT NULL,
                    visible_to_role TEXT NOT NULL,
                    visible_to_id TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_annotations_transaction
                    ON annotations(transaction_id);

                CREATE TABLE IF NOT EXISTS bids (
                    id TEXT PRIMARY KEY,
                    transaction_id TEXT NOT NULL,
                    provider_id TEXT NOT NULL,
                    amount TEXT NOT NULL,
                    timeline_start TEXT NOT NULL,
                    timeline_end TEXT NOT NULL,
                    proposal TEXT NOT NULL,
                    approach TEXT NOT NULL,
                    warranty TEXT NOT NULL,
                    filtered_by_pipeline INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE(transaction_id, provider_id)
                );

                CREATE TABLE IF NOT EXISTS transactions (
                    id TEXT PRIMARY KEY,
                    category TEXT,
                    budget TEXT,
                    created_at TEXT NOT NULL
                );",
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("init_schema: {e}")))?;
        debug!("Schema initialized");
        Ok(())
    }

    // ── Live message store ──────────────────────────────────────────

    async fn insert_delivered(&self, message: &DeliveredMessage) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO messages ({MESSAGE_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    message.id.clone(),
                    message.transaction_id.clone(),
                    opt_text_owned(message.conversation_id.clone()),
                    message.sender_id.clone(),
                    role_to_str(message.sender_role),
                    opt_text_owned(message.recipient_id.clone()),
                    kind_to_str(message.kind),
                    message.filtered_content.clone(),
                    message.original_content.clone(),
                    threats_to_json(&message.threats),
                    message.decision.label(),
                    message.confidence as f64,
                    message.pipeline_version.clone(),
                    message.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_delivered: {e}")))?;
        debug!(id = %message.id, "Delivered message inserted");
        Ok(())
    }

    async fn messages_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<DeliveredMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages \
                     WHERE transaction_id = ?1 ORDER BY created_at ASC"
                ),
                params![transaction_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("messages_for_transaction: {e}")))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let message = row_to_delivered(&row)
                .map_err(|e| DatabaseError::Serialization(format!("{e}")))?;
            messages.push(message);
        }
        Ok(messages)
    }

    async fn recent_turns(
        &self,
        transaction_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT sender_id, sender_role, filtered_content FROM messages \
                 WHERE transaction_id = ?1 ORDER BY created_at DESC LIMIT ?2",
                params![transaction_id, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_turns: {e}")))?;

        let mut turns = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let sender_id: String = row
                .get(0)
                .map_err(|e| DatabaseError::Serialization(format!("{e}")))?;
            let role_str: String = row
                .get(1)
                .map_err(|e| DatabaseError::Serialization(format!("{e}")))?;
            let content: String = row
                .get(2)
                .map_err(|e| DatabaseError::Serialization(format!("{e}")))?;
            turns.push(ConversationTurn {
                sender_id,
                sender_role: str_to_role(&role_str),
                content,
            });
        }
        turns.reverse();
        Ok(turns)
    }

    async fn providers_on_transaction(
        &self,
        transaction_id: &str,
        exclude_id: &str,
    ) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT DISTINCT sender_id FROM messages \
                 WHERE transaction_id = ?1 AND sender_role = 'provider' \
                   AND sender_id != ?2 \
                 ORDER BY sender_id ASC",
                params![transaction_id, exclude_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("providers_on_transaction: {e}")))?;

        let mut providers = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::Serialization(format!("{e}")))?;
            providers.push(id);
        }
        Ok(providers)
    }

    // ── Blocked audit log ───────────────────────────────────────────

    async fn insert_blocked(&self, audit: &BlockedAudit) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO blocked_messages ({BLOCKED_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    audit.id.clone(),
                    audit.transaction_id.clone(),
                    audit.sender_id.clone(),
                    role_to_str(audit.sender_role),
                    opt_text_owned(audit.recipient_id.clone()),
                    audit.original_content.clone(),
                    threats_to_json(&audit.threats),
                    audit.confidence as f64,
                    audit.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_blocked: {e}")))?;
        debug!(id = %audit.id, "Blocked message audited");
        Ok(())
    }

    async fn blocked_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<BlockedAudit>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {BLOCKED_COLUMNS} FROM blocked_messages \
                     WHERE transaction_id = ?1 ORDER BY created_at ASC"
                ),
                params![transaction_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("blocked_for_transaction: {e}")))?;

        let mut audits = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let audit =
                row_to_blocked(&row).map_err(|e| DatabaseError::Serialization(format!("{e}")))?;
            audits.push(audit);
        }
        Ok(audits)
    }

    // ── Annotations ─────────────────────────────────────────────────

    async fn insert_annotation(
        &self,
        transaction_id: &str,
        annotation: &Annotation,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO annotations \
                 (id, transaction_id, visible_to_role, visible_to_id, kind, content, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    transaction_id,
                    role_to_str(annotation.visible_to_role),
                    annotation.visible_to_id.clone(),
                    annotation.kind.as_str(),
                    annotation.content.clone(),
                    annotation.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_annotation: {e}")))?;
        Ok(())
    }

    async fn annotations_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<Annotation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT visible_to_role, visible_to_id, kind, content, created_at \
                 FROM annotations WHERE transaction_id = ?1 ORDER BY created_at ASC",
                params![transaction_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("annotations_for_transaction: {e}")))?;

        let mut annotations = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let role_str: String = row
                .get(0)
                .map_err(|e| DatabaseError::Serialization(format!("{e}")))?;
            let visible_to_id: String = row
                .get(1)
                .map_err(|e| DatabaseError::Serialization(format!("{e}")))?;
            let kind_str: String = row
                .get(2)
                .map_err(|e| DatabaseError::Serialization(format!("{e}")))?;
            let content: String = row
                .get(3)
                .map_err(|e| DatabaseError::Serialization(format!("{e}")))?;
            let created_str: String = row
                .get(4)
                .map_err(|e| DatabaseError::Serialization(format!("{e}")))?;
            annotations.push(Annotation {
                visible_to_role: str_to_role(&role_str),
                visible_to_id,
                kind: str_to_annotation_kind(&kind_str),
                content,
                created_at: parse_datetime(&created_str),
            });
        }
        Ok(annotations)
    }

    // ── Bids ────────────────────────────────────────────────────────

    async fn upsert_bid(&self, bid: &BidRecord) -> Result<String, DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO bids ({BID_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
                     ON CONFLICT(transaction_id, provider_id) DO UPDATE SET \
                        amount = excluded.amount, \
                        timeline_start = excluded.timeline_start, \
                        timeline_end = excluded.timeline_end, \
                        proposal = excluded.proposal, \
                        approach = excluded.approach, \
                        warranty = excluded.warranty, \
                        filtered_by_pipeline = excluded.filtered_by_pipeline, \
                        updated_at = excluded.updated_at"
                ),
                params![
                    bid.id.clone(),
                    bid.transaction_id.clone(),
                    bid.provider_id.clone(),
                    bid.amount.to_string(),
                    bid.timeline_start.format("%Y-%m-%d").to_string(),
                    bid.timeline_end.format("%Y-%m-%d").to_string(),
                    bid.proposal.clone(),
                    bid.approach.clone(),
                    bid.warranty.clone(),
                    i64::from(bid.filtered_by_pipeline),
                    bid.created_at.to_rfc3339(),
                    bid.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_bid: {e}")))?;

        // The stored id survives an upsert; read it back.
        let mut rows = self
            .conn()
            .query(
                "SELECT id FROM bids WHERE transaction_id = ?1 AND provider_id = ?2",
                params![bid.transaction_id.clone(), bid.provider_id.clone()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_bid readback: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<String>(0)
                .map_err(|e| DatabaseError::Serialization(format!("{e}"))),
            _ => Err(DatabaseError::NotFound {
                entity: "bid".into(),
                id: format!("{}/{}", bid.transaction_id, bid.provider_id),
            }),
        }
    }

    async fn bid_for_provider(
        &self,
        transaction_id: &str,
        provider_id: &str,
    ) -> Result<Option<BidRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {BID_COLUMNS} FROM bids \
                     WHERE transaction_id = ?1 AND provider_id = ?2"
                ),
                params![transaction_id, provider_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("bid_for_provider: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let bid =
                    row_to_bid(&row).map_err(|e| DatabaseError::Serialization(format!("{e}")))?;
                Ok(Some(bid))
            }
            _ => Ok(None),
        }
    }

    async fn bid_provider_count(&self, transaction_id: &str) -> Result<u64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(DISTINCT provider_id) FROM bids WHERE transaction_id = ?1",
                params![transaction_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("bid_provider_count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Serialization(format!("{e}")))?;
                Ok(count.max(0) as u64)
            }
            _ => Ok(0),
        }
    }

    // ── Transaction registry ────────────────────────────────────────

    async fn insert_transaction(
        &self,
        transaction_id: &str,
        category: Option<&str>,
        budget: Option<&str>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO transactions (id, category, budget, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    transaction_id,
                    opt_text_owned(category.map(String::from)),
                    opt_text_owned(budget.map(String::from)),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_transaction: {e}")))?;
        Ok(())
    }

    async fn transaction_context(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionContext, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT category, budget FROM transactions WHERE id = ?1",
                params![transaction_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("transaction_context: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(TransactionContext {
                category: row.get::<String>(0).ok(),
                budget: row.get::<String>(1).ok(),
            }),
            _ => Ok(TransactionContext::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn delivered(id: &str, txn: &str, sender: &str, role: SenderRole) -> DeliveredMessage {
        DeliveredMessage {
            id: id.into(),
            transaction_id: txn.into(),
            conversation_id: None,
            sender_id: sender.into(),
            sender_role: role,
            recipient_id: Some("owner-1".into()),
            kind: MessageKind::Text,
            filtered_content: format!("message from {sender}"),
            original_content: format!("message from {sender}"),
            threats: vec![],
            decision: Decision::Allow,
            confidence: 0.95,
            pipeline_version: "test".into(),
            created_at: Utc::now(),
        }
    }

    fn bid(txn: &str, provider: &str) -> BidRecord {
        BidRecord {
            id: uuid::Uuid::new_v4().to_string(),
            transaction_id: txn.into(),
            provider_id: provider.into(),
            amount: dec!(15000),
            timeline_start: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            timeline_end: NaiveDate::from_ymd_opt(2026, 9, 15).unwrap(),
            proposal: "Full replacement".into(),
            approach: "Two phases".into(),
            warranty: "Two years".into(),
            filtered_by_pipeline: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn schema_init_is_idempotent() {
        let db = test_db().await;
        db.init_schema().await.unwrap();
    }

    #[tokio::test]
    async fn insert_and_read_delivered_message() {
        let db = test_db().await;
        let mut message = delivered("m1", "txn-1", "pro-1", SenderRole::Provider);
        message.threats = vec![ThreatCategory::ContactInfo];
        message.decision = Decision::Redact;
        db.insert_delivered(&message).await.unwrap();

        let messages = db.messages_for_transaction("txn-1").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "m1");
        assert_eq!(messages[0].threats, vec![ThreatCategory::ContactInfo]);
        assert_eq!(messages[0].decision, Decision::Redact);
        assert_eq!(messages[0].sender_role, SenderRole::Provider);
    }

    #[tokio::test]
    async fn duplicate_message_id_is_rejected() {
        let db = test_db().await;
        let message = delivered("m1", "txn-1", "pro-1", SenderRole::Provider);
        db.insert_delivered(&message).await.unwrap();
        assert!(db.insert_delivered(&message).await.is_err());
    }

    #[tokio::test]
    async fn recent_turns_caps_and_orders() {
        let db = test_db().await;
        for i in 0..5i64 {
            let mut m = delivered(&format!("m{i}"), "txn-1", "pro-1", SenderRole::Provider);
            m.filtered_content = format!("turn {i}");
            m.created_at = Utc::now() + chrono::Duration::seconds(i);
            db.insert_delivered(&m).await.unwrap();
        }

        let turns = db.recent_turns("txn-1", 3).await.unwrap();
        assert_eq!(turns.len(), 3);
        // Oldest-first within the capped window.
        assert_eq!(turns[0].content, "turn 2");
        assert_eq!(turns[2].content, "turn 4");
    }

    #[tokio::test]
    async fn providers_deduped_and_sender_excluded() {
        let db = test_db().await;
        db.insert_delivered(&delivered("m1", "txn-1", "pro-1", SenderRole::Provider))
            .await
            .unwrap();
        db.insert_delivered(&delivered("m2", "txn-1", "pro-2", SenderRole::Provider))
            .await
            .unwrap();
        db.insert_delivered(&delivered("m3", "txn-1", "pro-2", SenderRole::Provider))
            .await
            .unwrap();
        db.insert_delivered(&delivered("m4", "txn-1", "owner-1", SenderRole::Owner))
            .await
            .unwrap();

        let providers = db.providers_on_transaction("txn-1", "pro-1").await.unwrap();
        assert_eq!(providers, vec!["pro-2"]);
    }

    #[tokio::test]
    async fn blocked_audit_roundtrip() {
        let db = test_db().await;
        let audit = BlockedAudit {
            id: "b1".into(),
            transaction_id: "txn-1".into(),
            sender_id: "pro-1".into(),
            sender_role: SenderRole::Provider,
            recipient_id: None,
            original_content: "pay me in cash".into(),
            threats: vec![ThreatCategory::PaymentBypass],
            confidence: 0.92,
            created_at: Utc::now(),
        };
        db.insert_blocked(&audit).await.unwrap();

        let audits = db.blocked_for_transaction("txn-1").await.unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].original_content, "pay me in cash");
        assert_eq!(audits[0].threats, vec![ThreatCategory::PaymentBypass]);
    }

    #[tokio::test]
    async fn annotation_roundtrip() {
        let db = test_db().await;
        let annotation = Annotation {
            visible_to_role: SenderRole::Owner,
            visible_to_id: "owner-1".into(),
            kind: AnnotationKind::ScopeQuestion,
            content: "Notify the other providers?".into(),
            created_at: Utc::now(),
        };
        db.insert_annotation("txn-1", &annotation).await.unwrap();

        let annotations = db.annotations_for_transaction("txn-1").await.unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].kind, AnnotationKind::ScopeQuestion);
        assert_eq!(annotations[0].visible_to_id, "owner-1");
    }

    #[tokio::test]
    async fn bid_upsert_replaces_existing() {
        let db = test_db().await;
        let first = bid("txn-1", "pro-1");
        let first_id = db.upsert_bid(&first).await.unwrap();

        let mut second = bid("txn-1", "pro-1");
        second.amount = dec!(17500);
        let second_id = db.upsert_bid(&second).await.unwrap();

        // Same logical bid row, original id retained.
        assert_eq!(first_id, second_id);

        let stored = db.bid_for_provider("txn-1", "pro-1").await.unwrap().unwrap();
        assert_eq!(stored.amount, dec!(17500));
        assert!(stored.filtered_by_pipeline);
    }

    #[tokio::test]
    async fn bid_provider_count_distinct() {
        let db = test_db().await;
        db.upsert_bid(&bid("txn-1", "pro-1")).await.unwrap();
        db.upsert_bid(&bid("txn-1", "pro-2")).await.unwrap();
        db.upsert_bid(&bid("txn-1", "pro-2")).await.unwrap();
        db.upsert_bid(&bid("txn-2", "pro-3")).await.unwrap();

        assert_eq!(db.bid_provider_count("txn-1").await.unwrap(), 2);
        assert_eq!(db.bid_provider_count("txn-2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn transaction_context_roundtrip() {
        let db = test_db().await;
        db.insert_transaction("txn-1", Some("kitchen remodel"), Some("$20,000"))
            .await
            .unwrap();

        let context = db.transaction_context("txn-1").await.unwrap();
        assert_eq!(context.category.as_deref(), Some("kitchen remodel"));
        assert_eq!(context.budget.as_deref(), Some("$20,000"));

        // Unknown transaction degrades to empty context.
        let empty = db.transaction_context("nope").await.unwrap();
        assert!(empty.category.is_none());
    }

    #[tokio::test]
    async fn open_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("guard.db");
        let db = LibSqlBackend::new_local(&db_path).await.unwrap();
        assert!(db_path.exists());
        drop(db);
    }
}
