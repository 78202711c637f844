//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Version tag stamped on every persisted decision.
pub const PIPELINE_VERSION: &str = "convoguard/0.1";

/// Configuration for the external classifier backend.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Anthropic API key.
    pub api_key: SecretString,
    /// Ordered model variants — tried first to last, stop at first success.
    pub model_variants: Vec<String>,
    /// Per-call timeout for one model attempt.
    pub request_timeout: Duration,
}

impl ClassifierConfig {
    /// Build from environment.
    ///
    /// `CONVOGUARD_API_KEY` is required. `CONVOGUARD_MODELS` is a
    /// comma-separated ordered variant list.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("CONVOGUARD_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("CONVOGUARD_API_KEY".into()))?;

        let model_variants: Vec<String> = std::env::var("CONVOGUARD_MODELS")
            .unwrap_or_else(|_| "claude-sonnet-4-20250514,claude-3-5-haiku-latest".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if model_variants.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "CONVOGUARD_MODELS".into(),
                message: "at least one model variant is required".into(),
            });
        }

        let timeout_secs: u64 = std::env::var("CONVOGUARD_CLASSIFY_TIMEOUT_SECS")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "CONVOGUARD_CLASSIFY_TIMEOUT_SECS".into(),
                message: format!("{e}"),
            })?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            model_variants,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Prior conversation turns handed to the classifier as context.
    pub max_context_turns: usize,
    /// Timeout for each persistence write.
    pub persist_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_context_turns: 3,
            persist_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_context_turns, 3);
        assert_eq!(config.persist_timeout, Duration::from_secs(5));
    }
}
