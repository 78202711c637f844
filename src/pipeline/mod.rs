//! The mediation pipeline: ingest → classify → decide → redact → annotate
//! → persist.

pub mod annotator;
pub mod decision;
pub mod ingest;
pub mod processor;
pub mod redactor;
pub mod scope;

pub use annotator::{Annotation, AnnotationKind};
pub use decision::{Decision, ThreatCategory};
pub use processor::{FilteredMessage, MessagePipeline, SubmitOutcome};
pub use scope::{ScopeChangeCategory, ScopeChangeReport};
