//! Pipeline configuration
//!
//! Loadable from TOML; every key is optional and falls back to the
//! defaults below.
//!
//! ```toml
//! model = "research-large"
//! channel_capacity = 32
//! basic_step_timeout_secs = 15
//! advanced_step_timeout_secs = 30
//! max_gap_steps = 3
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Research depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    /// Plan, searches, analyses, gap analysis
    #[default]
    Basic,
    /// Basic plus a gap-fill pass and a final synthesis
    Advanced,
}

impl std::fmt::Display for Depth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
        })
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model reference passed to the model caller
    pub model: String,
    /// Event channel capacity
    pub channel_capacity: usize,
    /// Per model call timeout in seconds
    pub model_timeout_secs: u64,
    /// Per step timeout at basic depth in seconds
    pub basic_step_timeout_secs: u64,
    /// Per step timeout at advanced depth in seconds
    pub advanced_step_timeout_secs: u64,
    /// Maximum planned steps executed
    pub max_plan_steps: usize,
    /// Maximum gap-fill searches
    pub max_gap_steps: usize,
    /// Maximum characters of step context in a prompt
    pub max_context_chars: usize,
    /// First-attempt temperature for analysis calls
    pub analysis_temperature: f32,
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and check a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded pipeline config");
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "channel_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_plan_steps == 0 {
            return Err(ConfigError::Invalid {
                key: "max_plan_steps",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.analysis_temperature) {
            return Err(ConfigError::Invalid {
                key: "analysis_temperature",
                reason: format!("{} is outside 0.0..=2.0", self.analysis_temperature),
            });
        }
        Ok(())
    }

    /// With model reference
    #[inline]
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// With event channel capacity
    #[inline]
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// With model call timeout
    #[inline]
    #[must_use]
    pub fn with_model_timeout_secs(mut self, secs: u64) -> Self {
        self.model_timeout_secs = secs;
        self
    }

    /// With step timeouts per depth
    #[inline]
    #[must_use]
    pub fn with_step_timeouts(mut self, basic_secs: u64, advanced_secs: u64) -> Self {
        self.basic_step_timeout_secs = basic_secs;
        self.advanced_step_timeout_secs = advanced_secs;
        self
    }

    /// With gap-fill cap
    #[inline]
    #[must_use]
    pub fn with_max_gap_steps(mut self, max: usize) -> Self {
        self.max_gap_steps = max;
        self
    }

    /// With planned step cap
    #[inline]
    #[must_use]
    pub fn with_max_plan_steps(mut self, max: usize) -> Self {
        self.max_plan_steps = max.max(1);
        self
    }

    /// With prompt context bound
    #[inline]
    #[must_use]
    pub fn with_max_context_chars(mut self, max: usize) -> Self {
        self.max_context_chars = max;
        self
    }

    /// Model call timeout
    #[inline]
    #[must_use]
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    /// Step timeout for a depth
    #[inline]
    #[must_use]
    pub fn step_timeout(&self, depth: Depth) -> Duration {
        Duration::from_secs(match depth {
            Depth::Basic => self.basic_step_timeout_secs,
            Depth::Advanced => self.advanced_step_timeout_secs,
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            channel_capacity: 64,
            model_timeout_secs: 60,
            basic_step_timeout_secs: 15,
            advanced_step_timeout_secs: 30,
            max_plan_steps: 4,
            max_gap_steps: 3,
            max_context_chars: 24_000,
            analysis_temperature: 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_parse_partial_config() {
        let config = PipelineConfig::from_toml_str(
            r#"
model = "research-large"
max_gap_steps = 5
"#,
        )
        .expect("valid config");
        assert_eq!(config.model, "research-large");
        assert_eq!(config.max_gap_steps, 5);
        assert_eq!(config.channel_capacity, 64);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = PipelineConfig::from_toml_str("").expect("valid config");
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = PipelineConfig::from_toml_str("channel_capacity = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "channel_capacity", .. }));
    }

    #[test]
    fn test_rejects_wrong_types() {
        let err = PipelineConfig::from_toml_str("max_gap_steps = \"three\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "basic_step_timeout_secs = 5\nadvanced_step_timeout_secs = 9").expect("write");
        let config = PipelineConfig::load(file.path()).expect("load");
        assert_eq!(config.step_timeout(Depth::Basic), Duration::from_secs(5));
        assert_eq!(config.step_timeout(Depth::Advanced), Duration::from_secs(9));
    }

    #[test]
    fn test_missing_file() {
        let err = PipelineConfig::load("/nonexistent/delve.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
