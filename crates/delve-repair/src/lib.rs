//! Delve Repair - recovering structured objects from unreliable model text
//!
//! Provides:
//! - [`repair`]: extraction, structural rules, lenient parsing and field extraction
//! - [`preprocess`]: decoding of stringified containers inside parsed values
//! - [`fallback`]: coercion, field defaults and minimal valid objects
//! - [`salvage`]: the full repair, coerce, fallback branch in one call
//!
//! Everything here is synchronous and free of shared mutable state, so it
//! is safe to call from any number of concurrent runs.
//!
//! # Example
//!
//! ```rust
//! use delve_repair::repair;
//! use delve_schema::Shape;
//!
//! let shape = Shape::object([("tags", Shape::array(Shape::string()))]);
//! let candidate = repair("```json\n{\"tags\": [\"a\", \"b\",]}\n```", &shape);
//! assert_eq!(candidate.value["tags"][1], "b");
//! ```

#![warn(unreachable_pub)]

pub mod engine;
pub mod extract;
pub mod fallback;
pub mod fields;
pub mod lenient;
pub mod preprocess;
pub mod rules;
mod text;

pub use engine::{parse_with_repair, repair, RepairEngine, RepairStage, RepairedCandidate};
pub use fallback::{
    coerce, coerce_until_valid, example_payload, fallback_object, minimal_valid_object, salvage,
    Coerced, FieldDefaults, SalvageStep, Salvaged,
};
pub use lenient::{parse_lenient, LenientError};
pub use preprocess::preprocess;
pub use rules::{default_rules, RepairRule};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for repairing model output
    pub use crate::{
        example_payload, minimal_valid_object, repair, salvage, FieldDefaults, RepairStage,
        RepairedCandidate, SalvageStep,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
