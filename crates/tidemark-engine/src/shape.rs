//! Declarative value shapes and the validator that enforces them.
//!
//! A [`Shape`] describes a JSON object: its fields, their primitive types,
//! and optional refinements (string pattern, length bounds, numeric range,
//! enum membership). [`Shape::validate`] is deterministic and side-effect
//! free: on success it returns a normalized copy of the value (strings
//! trimmed, undeclared fields dropped); on failure it returns every
//! field-level violation at once, concatenable into one message.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

/// A single field-level validation failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Violation {
    pub field: String,
    pub message: String,
}

/// The validator's failure result: all violations for one value.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Name of the shape the value was checked against.
    pub shape: String,
    pub violations: Vec<Violation>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid `{}`: ", self.shape)?;
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", v.field, v.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// Primitive type of a declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    /// Any JSON number.
    Number,
    /// A whole number (rejects fractional values).
    Integer,
    Boolean,
    /// Homogeneous array of the given element type.
    Array(Box<FieldType>),
    Object,
    /// Accepts anything. Used for payloads a step treats as opaque.
    Any,
}

impl FieldType {
    fn describe(&self) -> String {
        match self {
            Self::String => "string".into(),
            Self::Number => "number".into(),
            Self::Integer => "integer".into(),
            Self::Boolean => "boolean".into(),
            Self::Array(inner) => format!("array of {}", inner.describe()),
            Self::Object => "object".into(),
            Self::Any => "any".into(),
        }
    }

    /// Whether a value produced as `other` satisfies a consumer declaring
    /// `self`. Integers satisfy number; `Any` satisfies (and accepts)
    /// everything.
    fn accepts(&self, other: &FieldType) -> bool {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => true,
            (Self::Number, Self::Integer) => true,
            (Self::Array(a), Self::Array(b)) => a.accepts(b),
            (a, b) => a == b,
        }
    }
}

// ---------------------------------------------------------------------------
// Field definitions
// ---------------------------------------------------------------------------

/// One declared field: type, requiredness, refinements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FieldDef {
    pub field_type: FieldType,
    pub required: bool,
    /// Regex the (trimmed) string value must fully match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Enum membership for a string field, or for each element of an
    /// array-of-strings field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<String>>,
}

impl FieldDef {
    fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: true,
            pattern: None,
            min_length: None,
            max_length: None,
            min: None,
            max: None,
            one_of: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn array(element: FieldType) -> Self {
        Self::new(FieldType::Array(Box::new(element)))
    }

    pub fn object() -> Self {
        Self::new(FieldType::Object)
    }

    pub fn any() -> Self {
        Self::new(FieldType::Any)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(len);
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.one_of = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

/// A named object shape. `BTreeMap` keeps field order deterministic for
/// fingerprinting (project convention).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Shape {
    pub name: String,
    pub fields: BTreeMap<String, FieldDef>,
}

impl Shape {
    /// An object shape with no declared fields. Validates any object and
    /// normalizes it to `{}`.
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn object(name: &str) -> Self {
        Self::empty(name)
    }

    pub fn field(mut self, name: &str, def: FieldDef) -> Self {
        self.fields.insert(name.to_string(), def);
        self
    }

    /// Validate `value` against this shape.
    ///
    /// Returns the normalized value (trimmed strings, undeclared fields
    /// dropped) or every violation found. Deterministic and side-effect free.
    pub fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        let mut violations = Vec::new();

        let map = match value.as_object() {
            Some(map) => map,
            None => {
                return Err(self.fail(vec![Violation {
                    field: "$".into(),
                    message: format!("expected an object, got {}", type_name(value)),
                }]))
            }
        };

        let mut normalized = Map::new();
        for (name, def) in &self.fields {
            match map.get(name) {
                None | Some(Value::Null) => {
                    if def.required {
                        violations.push(Violation {
                            field: name.clone(),
                            message: "required field is missing".into(),
                        });
                    }
                }
                Some(v) => match check_field(name, def, v, &mut violations) {
                    Some(out) => {
                        normalized.insert(name.clone(), out);
                    }
                    None => {}
                },
            }
        }

        if violations.is_empty() {
            Ok(Value::Object(normalized))
        } else {
            Err(self.fail(violations))
        }
    }

    /// Check that a value produced by `producer` satisfies this shape.
    ///
    /// Used at workflow construction time to verify that consecutive steps'
    /// output/input shapes line up. Returns the reasons they don't.
    pub fn accepts_output_of(&self, producer: &Shape) -> Result<(), Vec<String>> {
        let mut reasons = Vec::new();
        for (name, def) in &self.fields {
            if !def.required {
                continue;
            }
            match producer.fields.get(name) {
                None => reasons.push(format!(
                    "required field `{name}` is not produced by `{}`",
                    producer.name
                )),
                Some(produced) => {
                    if !produced.required {
                        reasons.push(format!(
                            "required field `{name}` is only optionally produced by `{}`",
                            producer.name
                        ));
                    }
                    if !def.field_type.accepts(&produced.field_type) {
                        reasons.push(format!(
                            "field `{name}` expects {} but `{}` produces {}",
                            def.field_type.describe(),
                            producer.name,
                            produced.field_type.describe()
                        ));
                    }
                }
            }
        }
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(reasons)
        }
    }

    /// Compile every declared pattern, returning `(field, error)` pairs for
    /// the ones that don't. Called once at definition build time.
    pub(crate) fn check_patterns(&self) -> Vec<(String, String)> {
        let mut bad = Vec::new();
        for (name, def) in &self.fields {
            if let Some(pattern) = &def.pattern {
                if let Err(e) = regex::Regex::new(pattern) {
                    bad.push((name.clone(), e.to_string()));
                }
            }
        }
        bad
    }

    fn fail(&self, violations: Vec<Violation>) -> ValidationError {
        ValidationError {
            shape: self.name.clone(),
            violations,
        }
    }
}

// ---------------------------------------------------------------------------
// Field checks
// ---------------------------------------------------------------------------

/// Validate one field value. Pushes violations and returns the normalized
/// value when the field is acceptable.
fn check_field(
    name: &str,
    def: &FieldDef,
    value: &Value,
    violations: &mut Vec<Violation>,
) -> Option<Value> {
    let before = violations.len();
    let normalized = check_type(name, &def.field_type, value, violations);

    if let Some(Value::String(s)) = &normalized {
        check_string_refinements(name, def, s, violations);
    }
    if let Some(Value::Array(items)) = &normalized {
        if let Some(allowed) = &def.one_of {
            for (i, item) in items.iter().enumerate() {
                if let Value::String(s) = item {
                    if !allowed.iter().any(|a| a == s) {
                        violations.push(Violation {
                            field: format!("{name}[{i}]"),
                            message: format!("`{s}` is not one of [{}]", allowed.join(", ")),
                        });
                    }
                }
            }
        }
    }
    if let Some(n) = normalized.as_ref().and_then(Value::as_f64) {
        if let Some(min) = def.min {
            if n < min {
                violations.push(Violation {
                    field: name.to_string(),
                    message: format!("must be >= {min}, got {n}"),
                });
            }
        }
        if let Some(max) = def.max {
            if n > max {
                violations.push(Violation {
                    field: name.to_string(),
                    message: format!("must be <= {max}, got {n}"),
                });
            }
        }
    }

    if violations.len() == before {
        normalized
    } else {
        None
    }
}

/// Type-check and normalize (trim strings, recurse into arrays).
fn check_type(
    name: &str,
    field_type: &FieldType,
    value: &Value,
    violations: &mut Vec<Violation>,
) -> Option<Value> {
    let mismatch = |violations: &mut Vec<Violation>| {
        violations.push(Violation {
            field: name.to_string(),
            message: format!(
                "expected {}, got {}",
                field_type.describe(),
                type_name(value)
            ),
        });
        None
    };

    match field_type {
        FieldType::Any => Some(value.clone()),
        FieldType::String => match value {
            Value::String(s) => Some(Value::String(s.trim().to_string())),
            _ => mismatch(violations),
        },
        FieldType::Number => match value.as_f64() {
            Some(_) => Some(value.clone()),
            None => mismatch(violations),
        },
        FieldType::Integer => {
            if value.as_i64().is_some() || value.as_u64().is_some() {
                Some(value.clone())
            } else {
                mismatch(violations)
            }
        }
        FieldType::Boolean => match value {
            Value::Bool(_) => Some(value.clone()),
            _ => mismatch(violations),
        },
        FieldType::Object => match value {
            Value::Object(_) => Some(value.clone()),
            _ => mismatch(violations),
        },
        FieldType::Array(element) => match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let element_name = format!("{name}[{i}]");
                    match check_type(&element_name, element, item, violations) {
                        Some(v) => out.push(v),
                        None => return None,
                    }
                }
                Some(Value::Array(out))
            }
            _ => mismatch(violations),
        },
    }
}

fn check_string_refinements(
    name: &str,
    def: &FieldDef,
    value: &str,
    violations: &mut Vec<Violation>,
) {
    if let Some(min) = def.min_length {
        if value.chars().count() < min {
            violations.push(Violation {
                field: name.to_string(),
                message: format!("must be at least {min} characters"),
            });
        }
    }
    if let Some(max) = def.max_length {
        if value.chars().count() > max {
            violations.push(Violation {
                field: name.to_string(),
                message: format!("must be at most {max} characters"),
            });
        }
    }
    if let Some(pattern) = &def.pattern {
        match regex::Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(value) {
                    violations.push(Violation {
                        field: name.to_string(),
                        message: format!("does not match pattern `{pattern}`"),
                    });
                }
            }
            Err(e) => violations.push(Violation {
                field: name.to_string(),
                message: format!("invalid pattern `{pattern}`: {e}"),
            }),
        }
    }
    if let Some(allowed) = &def.one_of {
        if !allowed.iter().any(|a| a == value) {
            violations.push(Violation {
                field: name.to_string(),
                message: format!("`{value}` is not one of [{}]", allowed.join(", ")),
            });
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn campaign_shape() -> Shape {
        Shape::object("campaign_input")
            .field("date_range", FieldDef::string().min_length(1))
            .field(
                "sources",
                FieldDef::array(FieldType::String).one_of(["ga", "gsc", "facebook", "instagram"]),
            )
            .field("campaign_name", FieldDef::string().optional())
            .field("budget", FieldDef::number().optional().min(0.0))
    }

    #[test]
    fn valid_input_is_normalized() {
        let shape = campaign_shape();
        let out = shape
            .validate(&json!({
                "date_range": "  last_30_days  ",
                "sources": ["ga", "facebook"],
                "extra": "dropped",
            }))
            .unwrap();
        assert_eq!(out["date_range"], json!("last_30_days"));
        assert_eq!(out["sources"], json!(["ga", "facebook"]));
        assert!(out.get("extra").is_none(), "undeclared fields are dropped");
    }

    #[test]
    fn missing_required_field() {
        let shape = campaign_shape();
        let err = shape.validate(&json!({"sources": ["ga"]})).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].field, "date_range");
        assert!(err.to_string().contains("campaign_input"));
    }

    #[test]
    fn multiple_violations_are_collected() {
        let shape = campaign_shape();
        let err = shape
            .validate(&json!({
                "date_range": 42,
                "sources": ["ga", "tiktok"],
                "budget": -5,
            }))
            .unwrap_err();
        let fields: Vec<&str> = err.violations.iter().map(|v| v.field.as_str()).collect();
        assert!(fields.contains(&"date_range"));
        assert!(fields.contains(&"sources[1]"));
        assert!(fields.contains(&"budget"));
    }

    #[test]
    fn non_object_value() {
        let shape = campaign_shape();
        let err = shape.validate(&json!("not an object")).unwrap_err();
        assert_eq!(err.violations[0].field, "$");
    }

    #[test]
    fn pattern_refinement() {
        let shape = Shape::object("campaign_ref").field(
            "campaign_id",
            FieldDef::string()
                .min_length(1)
                .max_length(128)
                .pattern("^[a-zA-Z0-9_-]+$"),
        );
        assert!(shape.validate(&json!({"campaign_id": "cmp_42"})).is_ok());
        let err = shape
            .validate(&json!({"campaign_id": "not ok!"}))
            .unwrap_err();
        assert!(err.violations[0].message.contains("pattern"));
    }

    #[test]
    fn integer_rejects_fractions() {
        let shape = Shape::object("resume").field("selected_index", FieldDef::integer().min(0.0));
        assert!(shape.validate(&json!({"selected_index": 1})).is_ok());
        assert!(shape.validate(&json!({"selected_index": 1.5})).is_err());
        assert!(shape.validate(&json!({"selected_index": -1})).is_err());
    }

    #[test]
    fn null_counts_as_absent() {
        let shape = Shape::object("s").field("opt", FieldDef::string().optional());
        let out = shape.validate(&json!({"opt": null})).unwrap();
        assert!(out.get("opt").is_none());
    }

    #[test]
    fn accepts_output_of_compatible() {
        let out_shape = Shape::object("a_out")
            .field("summary", FieldDef::string())
            .field("count", FieldDef::integer());
        let in_shape = Shape::object("b_in")
            .field("summary", FieldDef::string())
            .field("count", FieldDef::number());
        assert!(in_shape.accepts_output_of(&out_shape).is_ok());
    }

    #[test]
    fn accepts_output_of_incompatible() {
        let out_shape = Shape::object("a_out").field("summary", FieldDef::string());
        let in_shape = Shape::object("b_in")
            .field("summary", FieldDef::number())
            .field("ideas", FieldDef::array(FieldType::Object));
        let reasons = in_shape.accepts_output_of(&out_shape).unwrap_err();
        assert_eq!(reasons.len(), 2);
    }

    #[test]
    fn validate_is_deterministic() {
        let shape = campaign_shape();
        let value = json!({"date_range": "last_7_days", "sources": ["gsc"]});
        assert_eq!(
            shape.validate(&value).unwrap(),
            shape.validate(&value).unwrap()
        );
    }
}
