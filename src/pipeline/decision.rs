//! Threat taxonomy mapping and the decision table.
//!
//! The classifier emits open-vocabulary labels; `map_threat_labels` is the
//! single place they become closed `ThreatCategory` values. Unmapped labels
//! are dropped and can never block a message on their own — new classifier
//! wording cannot silently widen or narrow blocking behavior.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ── Threat categories ───────────────────────────────────────────────

/// Closed set of policy violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    ContactInfo,
    SocialMedia,
    ExternalMeeting,
    PaymentBypass,
    PlatformBypass,
}

impl ThreatCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContactInfo => "contact_info",
            Self::SocialMedia => "social_media",
            Self::ExternalMeeting => "external_meeting",
            Self::PaymentBypass => "payment_bypass",
            Self::PlatformBypass => "platform_bypass",
        }
    }

    /// Human wording used in placeholders and annotations.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::ContactInfo => "contact information",
            Self::SocialMedia => "social media details",
            Self::ExternalMeeting => "an external meeting arrangement",
            Self::PaymentBypass => "an off-platform payment arrangement",
            Self::PlatformBypass => "an attempt to move off-platform",
        }
    }
}

// ── Decision ────────────────────────────────────────────────────────

/// Terminal action for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Redact,
    Block,
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Redact => "redact",
            Self::Block => "block",
        }
    }
}

// ── Label mapping ───────────────────────────────────────────────────

/// Map one free-text classifier label to a threat category.
///
/// Returns `None` for anything unrecognized — dropped, never blocks alone.
/// Payment wording is checked first so "off-platform payment" lands on
/// `PaymentBypass`, not `PlatformBypass`.
pub fn map_threat_label(label: &str) -> Option<ThreatCategory> {
    let label = label.to_lowercase();

    const PAYMENT: &[&str] = &["payment", "cash", "venmo", "paypal", "zelle", "check", "wire"];
    const SOCIAL: &[&str] = &[
        "social media",
        "instagram",
        "facebook",
        "whatsapp",
        "telegram",
        "tiktok",
        "handle",
    ];
    const MEETING: &[&str] = &["meeting", "meet", "coffee", "lunch", "dinner", "visit", "in person"];
    const CONTACT: &[&str] = &["contact", "email", "phone", "address", "number"];
    const BYPASS: &[&str] = &["off-platform", "off platform", "external", "outside", "bypass"];

    let matches = |words: &[&str]| words.iter().any(|w| label.contains(w));

    if matches(PAYMENT) {
        Some(ThreatCategory::PaymentBypass)
    } else if matches(SOCIAL) {
        Some(ThreatCategory::SocialMedia)
    } else if matches(MEETING) {
        Some(ThreatCategory::ExternalMeeting)
    } else if matches(CONTACT) {
        Some(ThreatCategory::ContactInfo)
    } else if matches(BYPASS) {
        Some(ThreatCategory::PlatformBypass)
    } else {
        None
    }
}

/// Map a batch of labels into a deduplicated category set.
pub fn map_threat_labels(labels: &[String]) -> BTreeSet<ThreatCategory> {
    labels
        .iter()
        .filter_map(|l| map_threat_label(l))
        .collect()
}

// ── Decision table ──────────────────────────────────────────────────

/// Pure decision function over the detected threat set.
///
/// Strict priority order:
/// 1. PaymentBypass → Block (zero tolerance, never redacted)
/// 2. ContactInfo → Redact
/// 3. PlatformBypass → Redact
/// 4. Any other recognized category → Redact
/// 5. Nothing detected → Allow
pub fn decide(threats: &BTreeSet<ThreatCategory>) -> Decision {
    if threats.contains(&ThreatCategory::PaymentBypass) {
        Decision::Block
    } else if threats.is_empty() {
        Decision::Allow
    } else {
        // Steps 2-4 of the table: every non-payment category redacts.
        Decision::Redact
    }
}
