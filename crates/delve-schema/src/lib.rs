//! Delve Schema - target shapes for structured model output
//!
//! Provides:
//! - [`Shape`]: declarative description of an expected JSON value
//! - [`validate`]: full-walk validation producing [`SchemaError`]s with nested paths
//! - Skeleton and empty-value derivation for fallback construction
//! - JSON Schema export handed to model providers as a format hint
//!
//! # Example
//!
//! ```rust
//! use delve_schema::{validate, Shape};
//! use serde_json::json;
//!
//! let shape = Shape::object([
//!     ("insight", Shape::string()),
//!     ("confidence", Shape::number().range(0.0, 1.0)),
//! ]);
//! assert!(validate(&shape, &json!({ "insight": "x", "confidence": 0.5 })).is_ok());
//! ```

#![warn(unreachable_pub)]

pub mod path;
pub mod shape;
pub mod validate;

pub use path::{FieldPath, PathSegment};
pub use shape::{number_value, FieldDefaultSource, NoDefaults, ObjectShape, Shape};
pub use validate::{
    json_type_name, validate, ExpectedType, IssueCode, Received, SchemaError, ValidationOutcome,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with shapes
    pub use crate::{
        validate, FieldDefaultSource, FieldPath, Shape, SchemaError, ValidationOutcome,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
