//! Structured Generation Client
//!
//! Wraps model calls in a recovery ladder that always ends in a
//! schema-valid value:
//! 1. Primed attempt at the caller's temperature
//! 2. Plain retry without the primer
//! 3. Repair branch on the latest raw text (repair, coerce, fallback object)
//! 4. Explicit re-ask with an example payload
//! 5. Built-in minimal object
//!
//! Every rung after the first runs at [`MIN_TEMPERATURE`].

use crate::caller::{ModelCall, ModelCaller, ModelError};
use crate::output::{Generated, Recovery, StructuredOutput};
use crate::prompts::{formatted_prompt, reask_prompt, restore_primer, system_text, PRIMER};
use crate::request::{GenerationRequest, MIN_TEMPERATURE};
use delve_repair::{example_payload, minimal_valid_object, salvage, SalvageStep};
use delve_schema::{validate, Shape};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Generation client over a model caller
///
/// Stateless apart from the caller handle; safe to share across runs.
#[derive(Clone)]
pub struct GenerationClient {
    caller: Arc<dyn ModelCaller>,
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient").finish_non_exhaustive()
    }
}

impl GenerationClient {
    /// Create a client
    #[inline]
    #[must_use]
    pub fn new(caller: Arc<dyn ModelCaller>) -> Self {
        Self { caller }
    }

    /// Generate a typed value
    ///
    /// A value is accepted only when it both validates and decodes into `T`.
    /// If the minimal object cannot be decoded, `T::default()` is returned.
    pub async fn generate<T: StructuredOutput>(&self, request: &GenerationRequest) -> Generated<T> {
        let outcome = self
            .run_ladder(request, |value| serde_json::from_value::<T>(value.clone()).ok())
            .await;
        match outcome {
            Ok(generated) => generated,
            Err(generated) => generated.map(|v| serde_json::from_value::<T>(v).unwrap_or_default()),
        }
    }

    /// Generate an untyped value that satisfies the request shape
    pub async fn generate_value(&self, request: &GenerationRequest) -> Generated<Value> {
        match self.run_ladder(request, |value| Some(value.clone())).await {
            Ok(generated) | Err(generated) => generated,
        }
    }

    /// Run the ladder; `Err` carries the minimal object when no rung was accepted
    async fn run_ladder<T, F>(
        &self,
        request: &GenerationRequest,
        decode: F,
    ) -> Result<Generated<T>, Generated<Value>>
    where
        F: Fn(&Value) -> Option<T>,
    {
        let started = Instant::now();
        let shape = &request.shape;
        let name = request.schema_name.as_str();
        let system = system_text(request.system.as_deref());
        let prompt = formatted_prompt(&request.prompt);
        let schema = shape.to_json_schema();
        let mut attempts = 0u32;
        let mut last_text: Option<String> = None;

        let accept = |mut value: Value| -> Option<T> {
            validate(shape, &value).ok()?;
            shape.normalize_integers(&mut value);
            decode(&value)
        };
        let done = |value: T, recovery: Recovery, attempts: u32| {
            tracing::debug!(
                schema = name,
                %recovery,
                attempts,
                elapsed_ms = started.elapsed().as_millis(),
                "structured generation accepted"
            );
            Ok(Generated {
                value,
                recovery,
                attempts,
                elapsed: started.elapsed(),
            })
        };

        // Rung 1: primed
        let primed = ModelCall {
            model: request.model.clone(),
            prompt: prompt.clone(),
            system: system.clone(),
            schema: schema.clone(),
            temperature: request.temperature,
            primer: Some(PRIMER.to_string()),
        };
        attempts += 1;
        match self.invoke(&primed, request).await {
            Ok(text) => {
                let text = restore_primer(&text);
                if let Some(v) = parse_strict(&text).and_then(&accept) {
                    return done(v, Recovery::Primed, attempts);
                }
                tracing::debug!(schema = name, rung = "primed", "response rejected");
                last_text = Some(text);
            }
            Err(ModelError::PrimerUnsupported) => {
                tracing::debug!(schema = name, "provider rejected primer");
            }
            Err(e) => tracing::warn!(schema = name, rung = "primed", error = %e, "model call failed"),
        }

        // Rung 2: plain
        let plain = ModelCall {
            primer: None,
            temperature: MIN_TEMPERATURE,
            ..primed
        };
        attempts += 1;
        match self.invoke(&plain, request).await {
            Ok(text) => {
                if let Some(v) = parse_strict(&text).and_then(&accept) {
                    return done(v, Recovery::Plain, attempts);
                }
                tracing::debug!(schema = name, rung = "plain", "response rejected");
                last_text = Some(text);
            }
            Err(e) => tracing::warn!(schema = name, rung = "plain", error = %e, "model call failed"),
        }

        // Rung 3: repair branch on the latest text
        if let Some(text) = last_text.as_deref() {
            if let Some((v, recovery)) = salvage_text(text, shape, &accept) {
                return done(v, recovery, attempts);
            }
            tracing::debug!(schema = name, rung = "repair", "salvage rejected");
        }

        // Rung 4: explicit re-ask
        let reask = ModelCall {
            prompt: reask_prompt(&request.prompt, &example_payload(shape)),
            temperature: MIN_TEMPERATURE,
            ..plain
        };
        attempts += 1;
        match self.invoke(&reask, request).await {
            Ok(text) => {
                let accepted = parse_strict(&text)
                    .and_then(&accept)
                    .or_else(|| salvage_text(&text, shape, &accept).map(|(v, _)| v));
                if let Some(v) = accepted {
                    return done(v, Recovery::ReAsked, attempts);
                }
                tracing::debug!(schema = name, rung = "re-ask", "response rejected");
            }
            Err(e) => tracing::warn!(schema = name, rung = "re-ask", error = %e, "model call failed"),
        }

        // Rung 5: minimal object
        let minimal = minimal_valid_object(shape);
        tracing::warn!(
            schema = name,
            attempts,
            elapsed_ms = started.elapsed().as_millis(),
            "structured generation degraded to minimal object"
        );
        match accept(minimal.clone()) {
            Some(v) => done(v, Recovery::Minimal, attempts),
            None => Err(Generated {
                value: minimal,
                recovery: Recovery::Minimal,
                attempts,
                elapsed: started.elapsed(),
            }),
        }
    }

    async fn invoke(&self, call: &ModelCall, request: &GenerationRequest) -> Result<String, ModelError> {
        match tokio::time::timeout(request.timeout, self.caller.call(call)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout {
                secs: request.timeout.as_secs(),
            }),
        }
    }
}

fn parse_strict(text: &str) -> Option<Value> {
    serde_json::from_str(text.trim()).ok()
}

fn salvage_text<T>(text: &str, shape: &Shape, accept: impl Fn(Value) -> Option<T>) -> Option<(T, Recovery)> {
    let salvaged = salvage(text, shape)?;
    let recovery = match salvaged.step {
        SalvageStep::Repaired => Recovery::Repaired,
        SalvageStep::Coerced => Recovery::Coerced,
        SalvageStep::Fallback => Recovery::Fallback,
    };
    accept(salvaged.value).map(|v| (v, recovery))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::MockModelCaller;
    use crate::prompts::REASK_MARKER;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Summary {
        implications: Vec<String>,
        limitations: Vec<String>,
    }

    impl StructuredOutput for Summary {
        fn shape() -> Shape {
            Shape::object([
                ("implications", Shape::array(Shape::string())),
                ("limitations", Shape::array(Shape::string())),
            ])
        }

        fn schema_name() -> &'static str {
            "summary"
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest::for_output::<Summary>("test-model", "Summarize").with_temperature(0.7)
    }

    fn client(mock: MockModelCaller) -> GenerationClient {
        GenerationClient::new(Arc::new(mock))
    }

    const VALID: &str = r#"{"implications": ["a"], "limitations": ["b"]}"#;

    #[tokio::test]
    async fn primed_success_uses_caller_temperature() {
        let mut mock = MockModelCaller::new();
        mock.expect_call()
            .withf(|c| c.primer.is_some() && (c.temperature - 0.7).abs() < f32::EPSILON)
            .times(1)
            .returning(|_| Ok(r#""implications": ["a"], "limitations": ["b"]}"#.to_string()));

        let out = client(mock).generate::<Summary>(&request()).await;
        assert_eq!(out.recovery, Recovery::Primed);
        assert_eq!(out.attempts, 1);
        assert_eq!(out.value.implications, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn primer_rejection_falls_back_to_plain() {
        let mut mock = MockModelCaller::new();
        mock.expect_call()
            .withf(|c| c.primer.is_some())
            .times(1)
            .returning(|_| Err(ModelError::PrimerUnsupported));
        mock.expect_call()
            .withf(|c| c.primer.is_none() && c.temperature == MIN_TEMPERATURE)
            .times(1)
            .returning(|_| Ok(VALID.to_string()));

        let out = client(mock).generate::<Summary>(&request()).await;
        assert_eq!(out.recovery, Recovery::Plain);
        assert_eq!(out.attempts, 2);
    }

    #[tokio::test]
    async fn malformed_text_is_repaired_without_reask() {
        let mut mock = MockModelCaller::new();
        mock.expect_call()
            .times(2)
            .returning(|_| Ok("```json\n{\"implications\": [\"a\",], \"limitations\": [],}\n```".to_string()));

        let out = client(mock).generate::<Summary>(&request()).await;
        assert_eq!(out.recovery, Recovery::Repaired);
        assert_eq!(out.attempts, 2);
    }

    #[tokio::test]
    async fn mistyped_fields_are_coerced() {
        let mut mock = MockModelCaller::new();
        mock.expect_call()
            .times(2)
            .returning(|_| Ok(r#"{"implications": "one, two", "limitations": []}"#.to_string()));

        let out = client(mock).generate::<Summary>(&request()).await;
        assert_eq!(out.recovery, Recovery::Coerced);
        assert_eq!(out.value.implications, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn transport_failures_reach_reask() {
        let mut mock = MockModelCaller::new();
        mock.expect_call()
            .withf(|c| !c.prompt.contains(REASK_MARKER))
            .times(2)
            .returning(|_| Err(ModelError::Transport("connection reset".into())));
        mock.expect_call()
            .withf(|c| c.prompt.contains(REASK_MARKER) && c.temperature == MIN_TEMPERATURE && c.primer.is_none())
            .times(1)
            .returning(|_| Ok(VALID.to_string()));

        let out = client(mock).generate::<Summary>(&request()).await;
        assert_eq!(out.recovery, Recovery::ReAsked);
        assert_eq!(out.attempts, 3);
        assert!(!out.is_degraded());
    }

    #[tokio::test]
    async fn total_failure_returns_minimal_object() {
        let mut mock = MockModelCaller::new();
        mock.expect_call()
            .times(3)
            .returning(|_| Err(ModelError::Rejected("no output".into())));

        let out = client(mock).generate::<Summary>(&request()).await;
        assert_eq!(out.recovery, Recovery::Minimal);
        assert!(out.is_degraded());
        assert_eq!(out.value.implications, vec!["Implication".to_string()]);
    }

    #[tokio::test]
    async fn untyped_generation_validates_against_shape() {
        let shape = Shape::object([("score", Shape::number().range(0.0, 1.0))]);
        let mut mock = MockModelCaller::new();
        mock.expect_call()
            .times(2)
            .returning(|_| Ok(r#"{"score": "0.4"}"#.to_string()));

        let req = GenerationRequest::new("m", shape, "Score it");
        let out = client(mock).generate_value(&req).await;
        assert_eq!(out.value, json!({ "score": 0.4 }));
        assert_eq!(out.recovery, Recovery::Coerced);
    }

    struct SlowCaller;

    #[async_trait::async_trait]
    impl ModelCaller for SlowCaller {
        async fn call(&self, _call: &ModelCall) -> Result<String, ModelError> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok(VALID.to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_degrade_instead_of_hanging() {
        let client = GenerationClient::new(Arc::new(SlowCaller));
        let req = request().with_timeout(Duration::from_secs(1));
        let out = client.generate::<Summary>(&req).await;
        assert_eq!(out.recovery, Recovery::Minimal);
        assert_eq!(out.attempts, 3);
    }
}
