//! Generation requests

use crate::output::StructuredOutput;
use delve_schema::Shape;
use std::time::Duration;

/// Default per-call timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Lowest sampling temperature, used by every retry after the first attempt
pub const MIN_TEMPERATURE: f32 = 0.0;

/// Immutable description of one structured generation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Provider model reference
    pub model: String,
    /// Target shape
    pub shape: Shape,
    /// Name used in logs
    pub schema_name: String,
    /// User prompt
    pub prompt: String,
    /// Caller system instructions, extended with JSON formatting rules
    pub system: Option<String>,
    /// Temperature of the first attempt
    pub temperature: f32,
    /// Bound on each model call
    pub timeout: Duration,
}

impl GenerationRequest {
    /// Request for an arbitrary shape
    #[must_use]
    pub fn new(model: impl Into<String>, shape: Shape, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            shape,
            schema_name: "object".to_string(),
            prompt: prompt.into(),
            system: None,
            temperature: MIN_TEMPERATURE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Request whose shape and name come from a typed output
    #[must_use]
    pub fn for_output<T: StructuredOutput>(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(model, T::shape(), prompt).with_schema_name(T::schema_name())
    }

    /// With a schema name for logging
    #[inline]
    #[must_use]
    pub fn with_schema_name(mut self, name: impl Into<String>) -> Self {
        self.schema_name = name.into();
        self
    }

    /// With caller system instructions
    #[inline]
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// With first-attempt temperature
    #[inline]
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// With per-call timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
