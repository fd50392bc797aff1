//! Provider interface consumed by the graph builder in strict mode.
//!
//! Providers own resource schemas. The core only asks them to validate a
//! config; applying a plan belongs to the external engine.

pub mod atlas;

use crate::core::types::{Config, Literal, Value};
use indexmap::IndexMap;
use std::fmt;

/// Outcome of a schema check. Empty `problems` means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub problems: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

/// A provider plugin as seen by the core.
pub trait Provider: fmt::Debug {
    fn name(&self) -> &str;

    /// Validate `config` against the schema of `resource_type`.
    fn validate_schema(&self, resource_type: &str, config: &Config) -> ValidationResult;

    /// Resource types are namespaced `<provider>_<kind>`.
    fn handles(&self, resource_type: &str) -> bool {
        resource_type
            .strip_prefix(self.name())
            .is_some_and(|rest| rest.starts_with('_') && rest.len() > 1)
    }
}

/// Built-in schema for a provider name, if one ships with the crate.
pub fn builtin(name: &str) -> Option<Box<dyn Provider>> {
    match name {
        atlas::NAME => Some(Box::new(atlas::provider())),
        _ => None,
    }
}

// ============================================================================
// Table-driven schemas
// ============================================================================

/// Expected shape of a literal field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Bool,
    List,
    Map,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Bool => write!(f, "bool"),
            Self::List => write!(f, "list"),
            Self::Map => write!(f, "map"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

pub const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
    }
}

pub const fn optional(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
    }
}

/// A provider whose schemas are a static field table per resource type.
#[derive(Debug, Clone)]
pub struct SchemaProvider {
    name: String,
    types: IndexMap<String, Vec<FieldSpec>>,
}

impl SchemaProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            types: IndexMap::new(),
        }
    }

    /// Register the fields of `<name>_<kind>`.
    pub fn resource(mut self, kind: &str, fields: &[FieldSpec]) -> Self {
        self.types
            .insert(format!("{}_{}", self.name, kind), fields.to_vec());
        self
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

impl Provider for SchemaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate_schema(&self, resource_type: &str, config: &Config) -> ValidationResult {
        let mut problems = Vec::new();
        let fields = match self.types.get(resource_type) {
            Some(f) => f,
            None => {
                problems.push(format!("unknown resource type '{}'", resource_type));
                return ValidationResult { problems };
            }
        };

        for spec in fields {
            match config.get(spec.name) {
                None | Some(Value::Literal(Literal::Null)) if spec.required => {
                    problems.push(format!("missing required field '{}'", spec.name));
                }
                Some(value) => {
                    if let Some(found) = literal_kind(value) {
                        if found != spec.kind {
                            problems.push(format!(
                                "field '{}' expects {}, got {}",
                                spec.name, spec.kind, found
                            ));
                        }
                    }
                }
                None => {}
            }
        }

        for field in config.keys() {
            if !fields.iter().any(|s| s.name == field.as_str()) {
                problems.push(format!("unknown field '{}'", field));
            }
        }

        ValidationResult { problems }
    }
}

/// Kind of a literal value; `None` for deferred values and null, which are
/// checked by the engine once resolved.
fn literal_kind(value: &Value) -> Option<FieldKind> {
    match value {
        Value::Literal(Literal::String(_)) => Some(FieldKind::String),
        Value::Literal(Literal::Int(_) | Literal::Float(_)) => Some(FieldKind::Number),
        Value::Literal(Literal::Bool(_)) => Some(FieldKind::Bool),
        Value::Literal(Literal::List(_)) => Some(FieldKind::List),
        Value::Literal(Literal::Map(_)) => Some(FieldKind::Map),
        Value::Literal(Literal::Null) | Value::Variable(_) | Value::Attribute(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AttributeRef;

    fn sample() -> SchemaProvider {
        SchemaProvider::new("demo").resource(
            "thing",
            &[
                required("name", FieldKind::String),
                optional("size", FieldKind::Number),
            ],
        )
    }

    #[test]
    fn test_handles_prefix() {
        let p = sample();
        assert!(p.handles("demo_thing"));
        assert!(p.handles("demo_other"));
        assert!(!p.handles("demo"));
        assert!(!p.handles("demo_"));
        assert!(!p.handles("democracy_thing"));
    }

    #[test]
    fn test_valid_config() {
        let config = Config::from([
            ("name".to_string(), Value::from("x")),
            ("size".to_string(), Value::from(3)),
        ]);
        assert!(sample().validate_schema("demo_thing", &config).is_valid());
    }

    #[test]
    fn test_deferred_values_pass_kind_check() {
        let config = Config::from([(
            "name".to_string(),
            Value::Attribute(AttributeRef {
                resource: "other".to_string(),
                path: "name".to_string(),
            }),
        )]);
        assert!(sample().validate_schema("demo_thing", &config).is_valid());
    }

    #[test]
    fn test_missing_unknown_and_mistyped() {
        let config = Config::from([
            ("size".to_string(), Value::from("big")),
            ("colour".to_string(), Value::from("red")),
        ]);
        let result = sample().validate_schema("demo_thing", &config);
        assert_eq!(
            result.problems,
            vec![
                "missing required field 'name'".to_string(),
                "field 'size' expects number, got string".to_string(),
                "unknown field 'colour'".to_string(),
            ]
        );
    }

    #[test]
    fn test_null_required_is_missing() {
        let config = Config::from([("name".to_string(), Value::null())]);
        let result = sample().validate_schema("demo_thing", &config);
        assert_eq!(result.problems, vec!["missing required field 'name'"]);
    }

    #[test]
    fn test_unknown_type() {
        let result = sample().validate_schema("demo_widget", &Config::new());
        assert!(!result.is_valid());
        assert!(result.problems[0].contains("unknown resource type"));
    }

    #[test]
    fn test_builtin_lookup() {
        assert!(builtin("mongodbatlas").is_some());
        assert!(builtin("nope").is_none());
    }
}
