//! Declaration and plan types.
//!
//! Declaration types (`Value`, `Variable`, `ResourceNode`, `ProviderConfig`)
//! are built in memory through the registry and builder. Plan types derive
//! Serialize/Deserialize and form the on-disk plan format; their field order
//! is the serialized order, so changing it changes every plan digest.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Values
// ============================================================================

/// Ordered mapping of field name to value.
pub type Config = IndexMap<String, Value>;

/// A possibly-deferred configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Known at declaration time. Structured literals may nest deferred values.
    Literal(Literal),

    /// Supplied at apply time by the engine.
    Variable(String),

    /// Computed attribute of another resource.
    Attribute(AttributeRef),
}

/// Literal payload of a [`Value`].
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

/// A read of `path` on resource `resource`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeRef {
    pub resource: String,
    pub path: String,
}

impl Value {
    pub fn null() -> Self {
        Self::Literal(Literal::Null)
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Literal(Literal::List(items.into_iter().collect()))
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Literal(Literal::Map(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// True when nothing inside this value is deferred.
    pub fn is_literal(&self) -> bool {
        match self {
            Self::Literal(Literal::List(items)) => items.iter().all(Value::is_literal),
            Self::Literal(Literal::Map(entries)) => entries.values().all(Value::is_literal),
            Self::Literal(_) => true,
            Self::Variable(_) | Self::Attribute(_) => false,
        }
    }

    /// Visit every attribute reference, depth first, in declaration order.
    pub fn visit_attributes<'a>(&'a self, f: &mut impl FnMut(&'a AttributeRef)) {
        match self {
            Self::Attribute(r) => f(r),
            Self::Literal(Literal::List(items)) => {
                for item in items {
                    item.visit_attributes(f);
                }
            }
            Self::Literal(Literal::Map(entries)) => {
                for v in entries.values() {
                    v.visit_attributes(f);
                }
            }
            _ => {}
        }
    }

    /// Visit every variable name, depth first, in declaration order.
    pub fn visit_variables<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Self::Variable(name) => f(name),
            Self::Literal(Literal::List(items)) => {
                for item in items {
                    item.visit_variables(f);
                }
            }
            Self::Literal(Literal::Map(entries)) => {
                for v in entries.values() {
                    v.visit_variables(f);
                }
            }
            _ => {}
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Literal(Literal::String(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Literal(Literal::String(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Literal(Literal::Bool(b))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Literal(Literal::Int(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Literal(Literal::Int(i64::from(n)))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Literal(Literal::Float(n))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Literal(Literal::List(items))
    }
}

// ============================================================================
// Variables
// ============================================================================

/// Declared type of an externally supplied input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VarType {
    String,
    Number,
    Bool,
    List,
    Map,
}

impl fmt::Display for VarType {
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

/// An input variable declaration. Never carries a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub var_type: VarType,
    pub sensitive: bool,
    pub description: Option<String>,
}

// ============================================================================
// Resources and providers
// ============================================================================

/// A named unit of desired state.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub id: String,

    pub resource_type: String,

    pub config: Config,

    /// Explicit dependencies as authored.
    pub depends_on: Vec<String>,

    /// Derived: attribute references ∪ explicit dependencies, in the
    /// dependencies' insertion order.
    pub edges: Vec<String>,
}

/// Settings for one provider plugin, consumed by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub settings: Config,
}

// ============================================================================
// Plan
// ============================================================================

/// Serialized, ordered, provider-agnostic plan for one stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// Owning stack id
    pub stack: String,

    /// Input declarations; values are bound by the engine at apply time
    pub variables: Vec<PlanVariable>,

    pub providers: Vec<PlanProvider>,

    /// Resources in dependency order
    pub resources: Vec<PlanResource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlanVariable {
    pub name: String,

    #[serde(rename = "type")]
    pub var_type: VarType,

    pub sensitive: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanProvider {
    pub name: String,
    pub settings: IndexMap<String, PlanValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanResource {
    pub id: String,

    #[serde(rename = "type")]
    pub resource_type: String,

    pub config: IndexMap<String, PlanValue>,

    #[serde(rename = "dependsOn")]
    pub depends_on: Vec<String>,
}

/// A config value as written to the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlanValue {
    /// Fully known value, inlined.
    Literal(serde_json::Value),

    /// Parameter slot bound at apply time.
    Variable(String),

    /// Symbolic cross-reference to another resource's attribute.
    Ref(PlanRef),

    /// List that nests deferred values.
    List(Vec<PlanValue>),

    /// Map that nests deferred values.
    Object(IndexMap<String, PlanValue>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlanRef {
    pub id: String,
    pub path: String,
}

impl PlanValue {
    /// Visit every resource id referenced through `ref`, depth first.
    pub fn visit_refs<'a>(&'a self, f: &mut impl FnMut(&'a PlanRef)) {
        match self {
            Self::Ref(r) => f(r),
            Self::List(items) => {
                for item in items {
                    item.visit_refs(f);
                }
            }
            Self::Object(entries) => {
                for v in entries.values() {
                    v.visit_refs(f);
                }
            }
            Self::Literal(_) | Self::Variable(_) => {}
        }
    }

    /// Visit every variable slot, depth first.
    pub fn visit_variables<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Self::Variable(name) => f(name),
            Self::List(items) => {
                for item in items {
                    item.visit_variables(f);
                }
            }
            Self::Object(entries) => {
                for v in entries.values() {
                    v.visit_variables(f);
                }
            }
            Self::Literal(_) | Self::Ref(_) => {}
        }
    }
}

// ============================================================================
// Output manifest
// ============================================================================

/// Index of every plan written by one `synth` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest schema version
    pub version: String,

    /// Application name from the stack file
    pub app: String,

    pub stacks: IndexMap<String, ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Plan path relative to the output directory
    pub plan: String,

    /// BLAKE3 digest of the plan bytes
    pub digest: String,

    pub resources: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(resource: &str, path: &str) -> Value {
        Value::Attribute(AttributeRef {
            resource: resource.to_string(),
            path: path.to_string(),
        })
    }

    #[test]
    fn test_value_is_literal() {
        assert!(Value::from("x").is_literal());
        assert!(Value::list([Value::from(1), Value::from(true)]).is_literal());
        assert!(!Value::Variable("v".to_string()).is_literal());
        assert!(!Value::list([Value::from(1), attr("a", "id")]).is_literal());
        assert!(!Value::map([("k", Value::list([attr("a", "id")]))]).is_literal());
    }

    #[test]
    fn test_visit_attributes_nested_in_order() {
        let v = Value::map([
            ("first", attr("a", "id")),
            (
                "nested",
                Value::list([Value::map([("name", attr("b", "name"))])]),
            ),
        ]);
        let mut seen = Vec::new();
        v.visit_attributes(&mut |r| seen.push(r.resource.as_str()));
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_visit_variables() {
        let v = Value::list([
            Value::Variable("x".to_string()),
            Value::map([("y", Value::Variable("y".to_string()))]),
        ]);
        let mut seen = Vec::new();
        v.visit_variables(&mut |n| seen.push(n));
        assert_eq!(seen, vec!["x", "y"]);
    }

    #[test]
    fn test_var_type_display() {
        assert_eq!(VarType::String.to_string(), "string");
        assert_eq!(VarType::Map.to_string(), "map");
    }

    #[test]
    fn test_plan_value_wire_shapes() {
        let lit = serde_json::to_string(&PlanValue::Literal(serde_json::json!("M0"))).unwrap();
        assert_eq!(lit, r#"{"literal":"M0"}"#);

        let var = serde_json::to_string(&PlanValue::Variable("orgId".to_string())).unwrap();
        assert_eq!(var, r#"{"variable":"orgId"}"#);

        let r = serde_json::to_string(&PlanValue::Ref(PlanRef {
            id: "proj".to_string(),
            path: "id".to_string(),
        }))
        .unwrap();
        assert_eq!(r, r#"{"ref":{"id":"proj","path":"id"}}"#);
    }

    #[test]
    fn test_plan_resource_uses_depends_on_camel_case() {
        let res = PlanResource {
            id: "c".to_string(),
            resource_type: "cluster".to_string(),
            config: IndexMap::new(),
            depends_on: vec!["p".to_string()],
        };
        let json = serde_json::to_string(&res).unwrap();
        assert!(json.contains(r#""type":"cluster""#));
        assert!(json.contains(r#""dependsOn":["p"]"#));
    }

    #[test]
    fn test_plan_value_visit_refs() {
        let v = PlanValue::Object(IndexMap::from([(
            "scopes".to_string(),
            PlanValue::List(vec![PlanValue::Ref(PlanRef {
                id: "cluster".to_string(),
                path: "name".to_string(),
            })]),
        )]));
        let mut ids = Vec::new();
        v.visit_refs(&mut |r| ids.push(r.id.clone()));
        assert_eq!(ids, vec!["cluster"]);
    }
}
