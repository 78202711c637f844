//! Pipeline observability counters.
//!
//! Explicitly-owned state injected into the pipeline, never a process-wide
//! global — the pipeline stays unit-testable with a fresh collector per test.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for pipeline throughput and failure modes.
#[derive(Debug, Default)]
pub struct PipelineStats {
    processed: AtomicU64,
    allowed: AtomicU64,
    redacted: AtomicU64,
    blocked: AtomicU64,
    classifier_fallbacks: AtomicU64,
    attachment_failures: AtomicU64,
    persistence_failures: AtomicU64,
    bid_field_failures: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub allowed: u64,
    pub redacted: u64,
    pub blocked: u64,
    pub classifier_fallbacks: u64,
    pub attachment_failures: u64,
    pub persistence_failures: u64,
    pub bid_field_failures: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_allowed(&self) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_redacted(&self) {
        self.redacted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classifier_fallback(&self) {
        self.classifier_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attachment_failure(&self) {
        self.attachment_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bid_field_failure(&self) {
        self.bid_field_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            redacted: self.redacted.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            classifier_fallbacks: self.classifier_fallbacks.load(Ordering::Relaxed),
            attachment_failures: self.attachment_failures.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            bid_field_failures: self.bid_field_failures.load(Ordering::Relaxed),
        }
    }
}
