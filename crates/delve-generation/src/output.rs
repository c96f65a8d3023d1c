//! Typed generation results

use delve_schema::Shape;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A type produced by structured generation
///
/// `Default` is the value of last resort when even the minimal object
/// cannot be decoded.
pub trait StructuredOutput: DeserializeOwned + Default + Send {
    /// Shape the model response must satisfy
    fn shape() -> Shape;

    /// Name used in logs and fixtures
    fn schema_name() -> &'static str;
}

/// Ladder rung that produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    /// First, primed attempt validated
    Primed,
    /// Plain retry validated
    Plain,
    /// Repaired text validated
    Repaired,
    /// Valid after per-field coercion
    Coerced,
    /// Skeleton overlaid with surviving fields
    Fallback,
    /// Explicit re-ask with an example payload
    ReAsked,
    /// Built-in minimal object; no usable model output
    Minimal,
}

impl Recovery {
    /// Whether the result carries no model content at all
    #[inline]
    #[must_use]
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::Minimal)
    }
}

impl std::fmt::Display for Recovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Primed => "primed",
            Self::Plain => "plain",
            Self::Repaired => "repaired",
            Self::Coerced => "coerced",
            Self::Fallback => "fallback",
            Self::ReAsked => "re-asked",
            Self::Minimal => "minimal",
        };
        f.write_str(name)
    }
}

/// Result of one structured generation
#[derive(Debug, Clone, PartialEq)]
pub struct Generated<T> {
    /// Schema-valid value
    pub value: T,
    /// Rung that produced it
    pub recovery: Recovery,
    /// Model calls issued
    pub attempts: u32,
    /// Wall time across all rungs
    pub elapsed: Duration,
}

impl<T> Generated<T> {
    /// Whether the value carries no model content
    #[inline]
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.recovery.is_degraded()
    }

    /// Transform the value, keeping recovery metadata
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Generated<U> {
        Generated {
            value: f(self.value),
            recovery: self.recovery,
            attempts: self.attempts,
            elapsed: self.elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_minimal_is_degraded() {
        for r in [
            Recovery::Primed,
            Recovery::Plain,
            Recovery::Repaired,
            Recovery::Coerced,
            Recovery::Fallback,
            Recovery::ReAsked,
        ] {
            assert!(!r.is_degraded(), "{r} should not be degraded");
        }
        assert!(Recovery::Minimal.is_degraded());
    }
}
