//! Delve Generation - structured output from unreliable model providers
//!
//! Provides:
//! - [`ModelCaller`]: the provider seam, returning raw response text
//! - [`GenerationRequest`]: model, shape, prompt, temperature and timeout
//! - [`GenerationClient`]: the five-rung recovery ladder
//! - [`StructuredOutput`]: typed outputs with an associated [`Shape`](delve_schema::Shape)
//!
//! A generation never fails: the ladder ends in a built-in minimal object,
//! reported as [`Recovery::Minimal`].
//!
//! # Example
//!
//! ```rust,no_run
//! use delve_generation::{GenerationClient, GenerationRequest, ModelCall, ModelCaller, ModelError};
//! use delve_schema::Shape;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl ModelCaller for Echo {
//!     async fn call(&self, _call: &ModelCall) -> Result<String, ModelError> {
//!         Ok(r#"{"title": "Remote work"}"#.to_string())
//!     }
//! }
//!
//! # async fn run() {
//! let client = GenerationClient::new(Arc::new(Echo));
//! let shape = Shape::object([("title", Shape::string())]);
//! let out = client
//!     .generate_value(&GenerationRequest::new("model", shape, "Name the topic"))
//!     .await;
//! assert_eq!(out.value["title"], "Remote work");
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod caller;
pub mod client;
pub mod output;
pub mod prompts;
pub mod request;

pub use caller::{ModelCall, ModelCaller, ModelError};
pub use client::GenerationClient;
pub use output::{Generated, Recovery, StructuredOutput};
pub use request::{GenerationRequest, DEFAULT_TIMEOUT_SECS, MIN_TEMPERATURE};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for structured generation
    pub use crate::{
        GenerationClient, GenerationRequest, Generated, ModelCall, ModelCaller, ModelError,
        Recovery, StructuredOutput,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
