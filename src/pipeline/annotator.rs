//! Side-channel annotations.
//!
//! Every annotation has exactly one visibility target — a sender, a
//! recipient, or the owner. Nothing here is ever broadcast, and nothing
//! here feeds back into the decision engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::{Decision, ThreatCategory};
use crate::message::SenderRole;

/// Kind of private note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Warning,
    Info,
    Suggestion,
    ScopeQuestion,
}

impl AnnotationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Suggestion => "suggestion",
            Self::ScopeQuestion => "scope_question",
        }
    }
}

/// A private, single-target explanatory note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub visible_to_role: SenderRole,
    pub visible_to_id: String,
    pub kind: AnnotationKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Annotation {
    fn new(role: SenderRole, id: &str, kind: AnnotationKind, content: String) -> Self {
        Self {
            visible_to_role: role,
            visible_to_id: id.to_string(),
            kind,
            content,
            created_at: Utc::now(),
        }
    }
}

/// Build the decision-driven annotations for a message.
///
/// Block → Warning to the sender (no content echo) plus, when a recipient
/// exists, an Info note acknowledging the block without revealing anything.
/// Redact → Info to the sender. Allow → silence.
pub fn decision_annotations(
    decision: Decision,
    threats: &std::collections::BTreeSet<ThreatCategory>,
    sender_role: SenderRole,
    sender_id: &str,
    recipient_id: Option<&str>,
) -> Vec<Annotation> {
    let counterpart_role = match sender_role {
        SenderRole::Owner => SenderRole::Provider,
        SenderRole::Provider => SenderRole::Owner,
    };

    match decision {
        Decision::Allow => Vec::new(),
        Decision::Redact => {
            let removed = describe_threats(threats);
            vec![Annotation::new(
                sender_role,
                sender_id,
                AnnotationKind::Info,
                format!(
                    "Part of your message was removed before delivery because it \
                     contained {removed}. Keeping everything on the platform protects \
                     your payment and project history."
                ),
            )]
        }
        Decision::Block => {
            let reason = describe_threats(threats);
            let mut annotations = vec![Annotation::new(
                sender_role,
                sender_id,
                AnnotationKind::Warning,
                format!(
                    "Your message was not delivered because it contained {reason}. \
                     All communication and payment must stay on the platform."
                ),
            )];
            if let Some(recipient) = recipient_id {
                annotations.push(Annotation::new(
                    counterpart_role,
                    recipient,
                    AnnotationKind::Info,
                    "A message in this conversation was redirected for a platform \
                     safety review."
                        .to_string(),
                ));
            }
            annotations
        }
    }
}

/// Owner-only clarifying question about a detected scope change.
pub fn scope_question(owner_id: &str, question: String) -> Annotation {
    Annotation::new(SenderRole::Owner, owner_id, AnnotationKind::ScopeQuestion, question)
}

/// Best-effort bid-interest hint for the owner. UX only — callers must
/// never let this influence the decision.
pub fn bid_interest_suggestion(owner_id: &str, provider_count: u64) -> Annotation {
    Annotation::new(
        SenderRole::Owner,
        owner_id,
        AnnotationKind::Suggestion,
        format!(
            "You have {provider_count} providers interested in this project — \
             want help comparing their bids?"
        ),
    )
}

fn describe_threats(threats: &std::collections::BTreeSet<ThreatCategory>) -> String {
    let described: Vec<&str> = threats.iter().map(|t| t.describe()).collect();
    if described.is_empty() {
        "content our safety system flagged".to_string()
    } else {
        described.join(" and ")
    }
}
