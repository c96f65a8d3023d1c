//! Validation of JSON values against shapes
//!
//! Validation never stops at the first problem: every issue in the value is
//! reported with its full path so repair can work field by field.

use crate::path::FieldPath;
use crate::shape::Shape;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    /// Wrong JSON type, or a required field is missing
    InvalidType,
    /// Number below its minimum or array shorter than its minimum length
    TooSmall,
    /// Number above its maximum or array longer than its maximum length
    TooBig,
    /// Right type, but not the literal or one of the enum values
    InvalidValue,
}

/// What the shape expected at a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedType {
    /// Any string
    String,
    /// Any number
    Number,
    /// Whole number
    Integer,
    /// Boolean
    Boolean,
    /// Exactly this string
    Literal(String),
    /// One of these strings
    Enum(Vec<String>),
    /// Array
    Array,
    /// Object
    Object,
    /// Anything
    Any,
}

impl fmt::Display for ExpectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Number => f.write_str("number"),
            Self::Integer => f.write_str("integer"),
            Self::Boolean => f.write_str("boolean"),
            Self::Literal(v) => write!(f, "literal {v:?}"),
            Self::Enum(vs) => write!(f, "one of {}", vs.join("|")),
            Self::Array => f.write_str("array"),
            Self::Object => f.write_str("object"),
            Self::Any => f.write_str("any"),
        }
    }
}

/// What was actually found at a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Received {
    /// Field absent
    Undefined,
    /// Raw text could not be parsed as JSON at all
    Unparseable,
    /// Field present with this value
    Value(Value),
}

impl Received {
    /// JSON type name of the received value
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Unparseable => "unparseable text",
            Self::Value(v) => json_type_name(v),
        }
    }

    /// Received value, if one was present
    #[inline]
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Name of a JSON value's type
#[must_use]
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One validation issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{path}: {code:?}, expected {expected}, received {}", received.type_name())]
pub struct SchemaError {
    /// Where the issue is
    pub path: FieldPath,
    /// Issue kind
    pub code: IssueCode,
    /// What the shape wanted
    pub expected: ExpectedType,
    /// What was there
    pub received: Received,
}

impl SchemaError {
    fn new(path: &FieldPath, code: IssueCode, expected: ExpectedType, received: Received) -> Self {
        Self {
            path: path.clone(),
            code,
            expected,
            received,
        }
    }

    /// Whether the field was missing entirely
    #[inline]
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self.received, Received::Undefined)
    }
}

/// Result of checking model output against a shape
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// Parsed and conforming
    Valid(Value),
    /// Unparseable or non-conforming
    Invalid {
        /// Raw text as received
        raw: String,
        /// Every issue found
        errors: Vec<SchemaError>,
    },
}

impl ValidationOutcome {
    /// Parse `raw` as JSON and validate it
    #[must_use]
    pub fn check(shape: &Shape, raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(value) => Self::of_value(shape, raw, value),
            Err(_) => Self::Invalid {
                raw: raw.to_string(),
                errors: vec![SchemaError::new(
                    &FieldPath::root(),
                    IssueCode::InvalidType,
                    shape.expected(),
                    Received::Unparseable,
                )],
            },
        }
    }

    /// Validate an already-parsed value
    #[must_use]
    pub fn of_value(shape: &Shape, raw: &str, value: Value) -> Self {
        match validate(shape, &value) {
            Ok(()) => Self::Valid(value),
            Err(errors) => Self::Invalid {
                raw: raw.to_string(),
                errors,
            },
        }
    }

    /// Whether validation succeeded
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// The validated value, if any
    #[must_use]
    pub fn into_valid(self) -> Option<Value> {
        match self {
            Self::Valid(v) => Some(v),
            Self::Invalid { .. } => None,
        }
    }

    /// Issues found; empty when valid
    #[must_use]
    pub fn errors(&self) -> &[SchemaError] {
        match self {
            Self::Valid(_) => &[],
            Self::Invalid { errors, .. } => errors,
        }
    }
}

/// Validate `value` against `shape`, collecting every issue
///
/// # Errors
///
/// Returns all [`SchemaError`]s found, in document order.
pub fn validate(shape: &Shape, value: &Value) -> Result<(), Vec<SchemaError>> {
    let mut errors = Vec::new();
    check(shape, Some(value), &FieldPath::root(), &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[allow(clippy::cast_precision_loss)]
fn check(shape: &Shape, value: Option<&Value>, path: &FieldPath, errors: &mut Vec<SchemaError>) {
    let value = match (shape, value) {
        (Shape::Optional { .. }, None | Some(Value::Null)) => return,
        (Shape::Optional { inner }, Some(v)) => return check(inner, Some(v), path, errors),
        (Shape::Any, _) => return,
        (_, None) => {
            errors.push(SchemaError::new(
                path,
                IssueCode::InvalidType,
                shape.expected(),
                Received::Undefined,
            ));
            return;
        }
        (_, Some(v)) => v,
    };
    let invalid_type = |errors: &mut Vec<SchemaError>, expected: ExpectedType| {
        errors.push(SchemaError::new(
            path,
            IssueCode::InvalidType,
            expected,
            Received::Value(value.clone()),
        ));
    };

    match shape {
        Shape::String => {
            if !value.is_string() {
                invalid_type(errors, ExpectedType::String);
            }
        }
        Shape::Boolean => {
            if !value.is_boolean() {
                invalid_type(errors, ExpectedType::Boolean);
            }
        }
        Shape::Number { min, max, integer } => {
            let Some(n) = value.as_f64() else {
                invalid_type(errors, ExpectedType::Number);
                return;
            };
            if *integer && n.fract() != 0.0 {
                invalid_type(errors, ExpectedType::Integer);
                return;
            }
            let expected = if *integer {
                ExpectedType::Integer
            } else {
                ExpectedType::Number
            };
            if min.is_some_and(|lo| n < lo) {
                errors.push(SchemaError::new(
                    path,
                    IssueCode::TooSmall,
                    expected,
                    Received::Value(value.clone()),
                ));
            } else if max.is_some_and(|hi| n > hi) {
                errors.push(SchemaError::new(
                    path,
                    IssueCode::TooBig,
                    expected,
                    Received::Value(value.clone()),
                ));
            }
        }
        Shape::Literal { value: want } => match value.as_str() {
            Some(s) if s == want => {}
            Some(_) => errors.push(SchemaError::new(
                path,
                IssueCode::InvalidValue,
                ExpectedType::Literal(want.clone()),
                Received::Value(value.clone()),
            )),
            None => invalid_type(errors, ExpectedType::Literal(want.clone())),
        },
        Shape::Enum { values } => match value.as_str() {
            Some(s) if values.iter().any(|v| v == s) => {}
            Some(_) => errors.push(SchemaError::new(
                path,
                IssueCode::InvalidValue,
                ExpectedType::Enum(values.clone()),
                Received::Value(value.clone()),
            )),
            None => invalid_type(errors, ExpectedType::Enum(values.clone())),
        },
        Shape::Array {
            items,
            min_items,
            max_items,
        } => {
            let Some(elements) = value.as_array() else {
                invalid_type(errors, ExpectedType::Array);
                return;
            };
            if min_items.is_some_and(|n| elements.len() < n) {
                errors.push(SchemaError::new(
                    path,
                    IssueCode::TooSmall,
                    ExpectedType::Array,
                    Received::Value(value.clone()),
                ));
            } else if max_items.is_some_and(|n| elements.len() > n) {
                errors.push(SchemaError::new(
                    path,
                    IssueCode::TooBig,
                    ExpectedType::Array,
                    Received::Value(value.clone()),
                ));
            }
            for (i, element) in elements.iter().enumerate() {
                check(items, Some(element), &path.index(i), errors);
            }
        }
        Shape::Object(obj) => {
            let Some(map) = value.as_object() else {
                invalid_type(errors, ExpectedType::Object);
                return;
            };
            for (name, field) in &obj.fields {
                check(field, map.get(name), &path.key(name.as_str()), errors);
            }
        }
        Shape::Optional { .. } | Shape::Any => {}
    }
}
