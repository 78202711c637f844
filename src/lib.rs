//! ConvoGuard — marketplace message mediation core.
//!
//! Every inbound message, attachment, and bid submission flows through one
//! pipeline: classify → decide → redact → annotate → persist. The platform
//! rule it enforces: no off-platform contact exchange, no external meetings,
//! no payment bypass.

pub mod classifier;
pub mod config;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod stats;
pub mod store;
