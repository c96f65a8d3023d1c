//! Target schema shapes
//!
//! A [`Shape`] describes what a structured model response must look like:
//! field names, value types, numeric ranges, literal/enum constraints and
//! array lengths. Shapes are plain data so they can be shared across runs
//! without synchronization.

use crate::path::{FieldPath, PathSegment};
use crate::validate::{validate, ExpectedType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Source of field-name-keyed default values
///
/// Used by [`Shape::skeleton`] to produce plausible content instead of
/// bare zero values.
pub trait FieldDefaultSource {
    /// Default value for a field name, if one is known
    fn default_for(&self, field: &str) -> Option<Value>;
}

/// Default source that knows nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDefaults;

impl FieldDefaultSource for NoDefaults {
    fn default_for(&self, _field: &str) -> Option<Value> {
        None
    }
}

/// Schema description for a structured value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    /// Any string
    String,
    /// Number, optionally integral and range-bounded (inclusive)
    Number {
        /// Inclusive lower bound
        min: Option<f64>,
        /// Inclusive upper bound
        max: Option<f64>,
        /// Whether the value must be a whole number
        integer: bool,
    },
    /// `true` or `false`
    Boolean,
    /// Exactly this string
    Literal {
        /// Required value
        value: String,
    },
    /// One of these strings
    Enum {
        /// Allowed values
        values: Vec<String>,
    },
    /// Homogeneous array
    Array {
        /// Element shape
        items: Box<Shape>,
        /// Minimum element count
        min_items: Option<usize>,
        /// Maximum element count
        max_items: Option<usize>,
    },
    /// Object with ordered, named fields
    Object(ObjectShape),
    /// Field may be absent or null
    Optional {
        /// Shape when present
        inner: Box<Shape>,
    },
    /// Unconstrained value
    Any,
}

/// Ordered field map of an object shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectShape {
    /// Field name to shape, in declaration order
    pub fields: IndexMap<String, Shape>,
}

impl ObjectShape {
    /// Empty object shape
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field
    #[inline]
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, shape: Shape) -> Self {
        self.fields.insert(name.into(), shape);
        self
    }

    /// Look up a field shape
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Shape> {
        self.fields.get(name)
    }

    /// Names of fields that must be present
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, s)| !s.is_optional())
            .map(|(k, _)| k.as_str())
    }
}

impl Shape {
    /// String shape
    #[inline]
    #[must_use]
    pub fn string() -> Self {
        Self::String
    }

    /// Unbounded number shape
    #[inline]
    #[must_use]
    pub fn number() -> Self {
        Self::Number {
            min: None,
            max: None,
            integer: false,
        }
    }

    /// Unbounded integer shape
    #[inline]
    #[must_use]
    pub fn integer() -> Self {
        Self::Number {
            min: None,
            max: None,
            integer: true,
        }
    }

    /// Boolean shape
    #[inline]
    #[must_use]
    pub fn boolean() -> Self {
        Self::Boolean
    }

    /// Literal string shape
    #[inline]
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }

    /// String enum shape
    #[must_use]
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Array of `items`
    #[inline]
    #[must_use]
    pub fn array(items: Shape) -> Self {
        Self::Array {
            items: Box::new(items),
            min_items: None,
            max_items: None,
        }
    }

    /// Object shape from `(name, shape)` pairs
    #[must_use]
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Shape)>,
        K: Into<String>,
    {
        Self::Object(ObjectShape {
            fields: fields.into_iter().map(|(k, s)| (k.into(), s)).collect(),
        })
    }

    /// Unconstrained shape
    #[inline]
    #[must_use]
    pub fn any() -> Self {
        Self::Any
    }

    /// Make this shape optional
    #[inline]
    #[must_use]
    pub fn optional(self) -> Self {
        match self {
            Self::Optional { .. } => self,
            other => Self::Optional {
                inner: Box::new(other),
            },
        }
    }

    /// Bound a number shape (inclusive); no-op on other shapes
    #[must_use]
    pub fn range(self, lo: f64, hi: f64) -> Self {
        match self {
            Self::Number { integer, .. } => Self::Number {
                min: Some(lo),
                max: Some(hi),
                integer,
            },
            other => other,
        }
    }

    /// Minimum element count; no-op on non-array shapes
    #[must_use]
    pub fn min_items(self, n: usize) -> Self {
        match self {
            Self::Array {
                items, max_items, ..
            } => Self::Array {
                items,
                min_items: Some(n),
                max_items,
            },
            other => other,
        }
    }

    /// Maximum element count; no-op on non-array shapes
    #[must_use]
    pub fn max_items(self, n: usize) -> Self {
        match self {
            Self::Array {
                items, min_items, ..
            } => Self::Array {
                items,
                min_items,
                max_items: Some(n),
            },
            other => other,
        }
    }

    /// Whether absence is acceptable
    #[inline]
    #[must_use]
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional { .. })
    }

    /// Shape with any optional wrapper removed
    #[must_use]
    pub fn unwrap_optional(&self) -> &Shape {
        match self {
            Self::Optional { inner } => inner.unwrap_optional(),
            other => other,
        }
    }

    /// Object fields, if this is an object shape
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectShape> {
        match self.unwrap_optional() {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Expected type descriptor for error reporting
    #[must_use]
    pub fn expected(&self) -> ExpectedType {
        match self.unwrap_optional() {
            Self::String => ExpectedType::String,
            Self::Number { integer: true, .. } => ExpectedType::Integer,
            Self::Number { .. } => ExpectedType::Number,
            Self::Boolean => ExpectedType::Boolean,
            Self::Literal { value } => ExpectedType::Literal(value.clone()),
            Self::Enum { values } => ExpectedType::Enum(values.clone()),
            Self::Array { .. } => ExpectedType::Array,
            Self::Object(_) => ExpectedType::Object,
            Self::Optional { .. } | Self::Any => ExpectedType::Any,
        }
    }

    /// Resolve the sub-shape addressed by `path`
    #[must_use]
    pub fn at_path(&self, path: &FieldPath) -> Option<&Shape> {
        let mut current = self;
        for seg in path.segments() {
            current = match (current.unwrap_optional(), seg) {
                (Self::Object(obj), PathSegment::Key(k)) => obj.get(k)?,
                (Self::Array { items, .. }, PathSegment::Index(_)) => items,
                (Self::Any, _) => return Some(current),
                _ => return None,
            };
        }
        Some(current)
    }

    /// Whether `value` satisfies this shape
    #[inline]
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        validate(self, value).is_ok()
    }

    /// Rewrite integral floats in integer positions as JSON integers
    ///
    /// `3.0` validates as an integer but does not decode into integer types.
    pub fn normalize_integers(&self, value: &mut Value) {
        match (self.unwrap_optional(), value) {
            (Self::Number { integer: true, .. }, v @ Value::Number(_)) => {
                if let Some(n) = v.as_f64().filter(|n| n.fract() == 0.0) {
                    if !v.is_i64() && !v.is_u64() {
                        *v = number_value(n, true);
                    }
                }
            }
            (Self::Array { items, .. }, Value::Array(values)) => {
                for item in values {
                    items.normalize_integers(item);
                }
            }
            (Self::Object(obj), Value::Object(map)) => {
                for (key, field) in map.iter_mut() {
                    if let Some(shape) = obj.get(key) {
                        shape.normalize_integers(field);
                    }
                }
            }
            _ => {}
        }
    }

    /// Type-appropriate empty value
    ///
    /// Objects are filled field by field; the result is shaped like the
    /// schema but need not satisfy its ranges or length constraints.
    #[must_use]
    pub fn empty_value(&self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Number { .. } => json!(0),
            Self::Boolean => Value::Bool(false),
            Self::Literal { value } => Value::String(value.clone()),
            Self::Enum { values } => values
                .first()
                .map_or_else(|| Value::String(String::new()), |v| Value::String(v.clone())),
            Self::Array { .. } => Value::Array(Vec::new()),
            Self::Object(obj) => Value::Object(
                obj.fields
                    .iter()
                    .filter(|(_, s)| !s.is_optional())
                    .map(|(k, s)| (k.clone(), s.empty_value()))
                    .collect(),
            ),
            Self::Optional { .. } | Self::Any => Value::Null,
        }
    }

    /// Value that satisfies this shape by construction
    ///
    /// Field-name defaults are used wherever they validate against the
    /// field's own shape.
    #[must_use]
    pub fn skeleton(&self, defaults: &dyn FieldDefaultSource) -> Value {
        match self {
            Self::Number { min, max, integer } => number_within(*min, *max, *integer),
            Self::Array {
                items, min_items, ..
            } => {
                let count = min_items.unwrap_or(0);
                Value::Array((0..count).map(|_| items.skeleton(defaults)).collect())
            }
            Self::Object(obj) => {
                let mut map = Map::new();
                for (name, field) in &obj.fields {
                    if field.is_optional() {
                        continue;
                    }
                    let value = defaults
                        .default_for(name)
                        .filter(|d| field.accepts(d))
                        .unwrap_or_else(|| field.skeleton(defaults));
                    map.insert(name.clone(), value);
                }
                Value::Object(map)
            }
            other => other.empty_value(),
        }
    }

    /// Export as a JSON Schema (draft 7) document
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut root = self.schema_node();
        if let Value::Object(map) = &mut root {
            map.insert(
                "$schema".to_string(),
                Value::String("http://json-schema.org/draft-07/schema#".to_string()),
            );
        }
        root
    }

    fn schema_node(&self) -> Value {
        match self {
            Self::String => json!({ "type": "string" }),
            Self::Number { min, max, integer } => {
                let mut node = Map::new();
                node.insert(
                    "type".into(),
                    Value::String(if *integer { "integer" } else { "number" }.into()),
                );
                if let Some(lo) = min {
                    node.insert("minimum".into(), json!(lo));
                }
                if let Some(hi) = max {
                    node.insert("maximum".into(), json!(hi));
                }
                Value::Object(node)
            }
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Literal { value } => json!({ "type": "string", "const": value }),
            Self::Enum { values } => json!({ "type": "string", "enum": values }),
            Self::Array {
                items,
                min_items,
                max_items,
            } => {
                let mut node = Map::new();
                node.insert("type".into(), json!("array"));
                node.insert("items".into(), items.schema_node());
                if let Some(n) = min_items {
                    node.insert("minItems".into(), json!(n));
                }
                if let Some(n) = max_items {
                    node.insert("maxItems".into(), json!(n));
                }
                Value::Object(node)
            }
            Self::Object(obj) => {
                let properties: Map<String, Value> = obj
                    .fields
                    .iter()
                    .map(|(k, s)| (k.clone(), s.schema_node()))
                    .collect();
                let required: Vec<&str> = obj.required_fields().collect();
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                })
            }
            Self::Optional { inner } => inner.schema_node(),
            Self::Any => json!({}),
        }
    }
}

fn number_within(min: Option<f64>, max: Option<f64>, integer: bool) -> Value {
    let pick = match (min, max) {
        (Some(lo), _) => {
            if integer {
                lo.ceil()
            } else {
                lo
            }
        }
        (None, Some(hi)) if hi < 0.0 => {
            if integer {
                hi.floor()
            } else {
                hi
            }
        }
        _ => 0.0,
    };
    number_value(pick, integer)
}

/// JSON number for `n`, integral when requested or when `n` has no fraction
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn number_value(n: f64, integer: bool) -> Value {
    if (integer || n.fract() == 0.0) && n.is_finite() && n.abs() < 9.0e15 {
        json!(n.round() as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(json!(0), Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl FieldDefaultSource for Fixed {
        fn default_for(&self, field: &str) -> Option<Value> {
            match field {
                "confidence" => Some(json!(0.5)),
                "priority" => Some(json!(99)),
                _ => None,
            }
        }
    }

    fn finding() -> Shape {
        Shape::object([
            ("insight", Shape::string()),
            ("confidence", Shape::number().range(0.0, 1.0)),
            ("priority", Shape::integer().range(1.0, 5.0)),
            ("note", Shape::string().optional()),
        ])
    }

    #[test]
    fn skeleton_uses_valid_defaults_only() {
        let value = finding().skeleton(&Fixed);
        assert_eq!(value["confidence"], json!(0.5));
        // 99 is out of range, so the range minimum wins
        assert_eq!(value["priority"], json!(1));
        assert!(value.get("note").is_none());
        assert!(finding().accepts(&value));
    }

    #[test]
    fn skeleton_fills_minimum_items() {
        let shape = Shape::array(finding()).min_items(2);
        let value = shape.skeleton(&NoDefaults);
        assert_eq!(value.as_array().map(Vec::len), Some(2));
        assert!(shape.accepts(&value));
    }

    #[test]
    fn empty_value_is_shaped() {
        let shape = Shape::object([
            ("items", Shape::array(Shape::string())),
            ("meta", Shape::object([("n", Shape::number())])),
            ("flag", Shape::boolean()),
        ]);
        assert_eq!(
            shape.empty_value(),
            json!({ "items": [], "meta": { "n": 0 }, "flag": false })
        );
    }

    #[test]
    fn at_path_walks_arrays_and_objects() {
        let shape = Shape::object([("findings", Shape::array(finding()))]);
        let path = FieldPath::parse_dotted("findings.3.confidence");
        assert!(matches!(shape.at_path(&path), Some(Shape::Number { .. })));
        assert!(shape.at_path(&FieldPath::parse_dotted("nope")).is_none());
    }

    #[test]
    fn json_schema_marks_required() {
        let schema = finding().to_json_schema();
        let required = schema["required"].as_array().cloned().unwrap_or_default();
        assert!(required.contains(&json!("insight")));
        assert!(!required.contains(&json!("note")));
        assert_eq!(schema["properties"]["priority"]["type"], "integer");
    }

    #[test]
    fn number_value_keeps_fractions() {
        assert_eq!(number_value(0.25, false), json!(0.25));
        assert_eq!(number_value(3.0, false), json!(3));
        assert_eq!(number_value(2.6, true), json!(3));
    }

    #[test]
    fn normalize_integers_rewrites_integral_floats() {
        let shape = Shape::object([
            ("priority", Shape::integer()),
            ("score", Shape::number()),
            ("items", Shape::array(Shape::integer())),
        ]);
        let mut value = json!({ "priority": 3.0, "score": 2.0, "items": [1.0, 2] });
        shape.normalize_integers(&mut value);
        assert!(value["priority"].is_i64());
        assert!(value["score"].is_f64());
        assert!(value["items"][0].is_i64());
    }
}
