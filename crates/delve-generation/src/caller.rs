//! Model caller collaborator
//!
//! The generation client treats whatever comes back from a model provider as
//! untrusted text. Providers plug in by implementing [`ModelCaller`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One request to a model provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCall {
    /// Provider model reference
    pub model: String,
    /// User prompt
    pub prompt: String,
    /// System instructions
    pub system: String,
    /// JSON Schema of the expected response
    pub schema: Value,
    /// Sampling temperature
    pub temperature: f32,
    /// Assistant-role prefill the response should continue from
    pub primer: Option<String>,
}

/// Model provider failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Network or provider-side failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Call exceeded its timeout
    #[error("model call timed out after {secs}s")]
    Timeout {
        /// Timeout that elapsed
        secs: u64,
    },

    /// Provider does not accept an assistant prefill
    #[error("provider does not support response primers")]
    PrimerUnsupported,

    /// Provider refused or produced no output
    #[error("model rejected the request: {0}")]
    Rejected(String),
}

impl ModelError {
    /// Whether retrying the same call could plausibly succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

/// Model provider interface
///
/// Implementations return the raw response text. A primed call's text may or
/// may not repeat the primer.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ModelCaller: Send + Sync {
    /// Issue one call
    async fn call(&self, call: &ModelCall) -> Result<String, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ModelError::Transport("reset".into()).is_transient());
        assert!(ModelError::Timeout { secs: 5 }.is_transient());
        assert!(!ModelError::PrimerUnsupported.is_transient());
        assert!(!ModelError::Rejected("policy".into()).is_transient());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            ModelError::Timeout { secs: 30 }.to_string(),
            "model call timed out after 30s"
        );
    }
}
