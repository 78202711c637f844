//! Error types for ConvoGuard.

use std::time::Duration;

/// Top-level error type for the mediation core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Classifier-backend errors.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Model {model} request failed: {reason}")]
    RequestFailed { model: String, reason: String },

    #[error("Model {model} timed out after {timeout:?}")]
    Timeout { model: String, timeout: Duration },

    #[error("Invalid response from {model}: {reason}")]
    InvalidResponse { model: String, reason: String },

    #[error("All {attempts} classifier model variants exhausted")]
    Unavailable { attempts: usize },

    #[error("Image analysis failed: {0}")]
    ImageAnalysis(String),

    #[error("Document text extraction failed: {0}")]
    DocumentExtraction(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pipeline-stage errors.
///
/// These are caught at stage boundaries and converted into conservative
/// defaults; they never escape `MessagePipeline::submit`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Ingestion rejected: {0}")]
    Ingestion(String),

    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type alias for the mediation core.
pub type Result<T> = std::result::Result<T, Error>;
