//! Error types for the pipeline
//!
//! Step and model failures never surface here; they degrade to fallback
//! content inside the run. Only setup failure and cancellation end a run
//! early.

use std::path::PathBuf;

/// Run-fatal error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// No plan could be formed at all
    #[error("setup failed: {0}")]
    Setup(String),

    /// Consumer stopped listening
    #[error("run cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Whether the consumer ended the run
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse or had wrong types
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid config value for {key}: {reason}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// Why it is invalid
        reason: String,
    },
}
