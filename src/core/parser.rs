//! Stack file parsing and validation.
//!
//! Parses stacks.yaml and turns it into an [`App`] through the same
//! registry and builder calls a library user would make:
//! - Version must be "1.0"
//! - depends_on references must exist and precede the resource
//! - `{{var.<name>}}` and `{{ref.<id>.<path>}}` strings become deferred values

use super::error::{Error, Result};
use super::ident::check_identifier;
use super::stack::{App, Stack};
use super::types::{Config, Value, VarType};
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_yaml_ng::Value as Yaml;
use std::path::Path;
use std::sync::LazyLock;

static VAR_TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{\{var\.([A-Za-z_][A-Za-z0-9_-]*)\}\}$").expect("valid regex")
});

static REF_TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{\{ref\.([A-Za-z_][A-Za-z0-9_-]*)\.([^{}\s]+)\}\}$").expect("valid regex")
});

/// Top-level stacks.yaml document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppFile {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub stacks: IndexMap<String, StackFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackFile {
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub variables: IndexMap<String, VariableDecl>,
    #[serde(default)]
    pub providers: IndexMap<String, IndexMap<String, Yaml>>,
    #[serde(default)]
    pub resources: IndexMap<String, ResourceDecl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableDecl {
    #[serde(rename = "type")]
    pub var_type: VarType,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDecl {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub config: IndexMap<String, Yaml>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Parse a stacks.yaml file from disk.
pub fn parse_app_file(path: &Path) -> Result<AppFile> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_yaml(&path.display().to_string(), &content)
}

/// Parse a stacks.yaml document from a string.
pub fn parse_app(yaml: &str) -> Result<AppFile> {
    parse_yaml("stack file", yaml)
}

fn parse_yaml(origin: &str, yaml: &str) -> Result<AppFile> {
    serde_yaml_ng::from_str(yaml).map_err(|e| Error::parse(origin, e))
}

/// Structural checks that need no builder. Returns every problem found.
pub fn validate_app_file(file: &AppFile) -> Vec<String> {
    let mut problems = Vec::new();

    if file.version != "1.0" {
        problems.push(format!("version must be \"1.0\", got \"{}\"", file.version));
    }
    if file.name.is_empty() {
        problems.push("name must not be empty".to_string());
    }

    for (stack_id, stack) in &file.stacks {
        for (position, (id, resource)) in stack.resources.iter().enumerate() {
            if resource.resource_type.is_empty() {
                problems.push(format!("stack '{}': resource '{}' has no type", stack_id, id));
            }
            for dep in &resource.depends_on {
                match stack.resources.get_index_of(dep.as_str()) {
                    None => problems.push(format!(
                        "stack '{}': resource '{}' depends on unknown resource '{}'",
                        stack_id, id, dep
                    )),
                    Some(i) if i == position => problems.push(format!(
                        "stack '{}': resource '{}' depends on itself",
                        stack_id, id
                    )),
                    Some(i) if i > position => problems.push(format!(
                        "stack '{}': resource '{}' depends on '{}', which is declared after it",
                        stack_id, id, dep
                    )),
                    Some(_) => {}
                }
            }
        }
    }

    problems
}

/// Parse, validate and build an app from a stacks.yaml file.
pub fn load_app(path: &Path) -> Result<App> {
    let file = parse_app_file(path)?;
    build_app(&file)
}

/// Build an [`App`] from a parsed document. Declaration order in the file is
/// insertion order in each builder.
pub fn build_app(file: &AppFile) -> Result<App> {
    let problems = validate_app_file(file);
    if !problems.is_empty() {
        return Err(Error::parse("stack file", problems.join("; ")));
    }

    let mut app = App::new(&file.name);
    for (id, stack) in &file.stacks {
        app.add_stack(build_stack(id, stack)?)?;
    }
    Ok(app)
}

fn build_stack(id: &str, file: &StackFile) -> Result<Stack> {
    check_identifier("stack", id)?;
    let mut stack = Stack::new(id);

    for (name, decl) in &file.variables {
        stack.declare_variable(name, decl.var_type, decl.sensitive, decl.description.as_deref())?;
    }

    for (name, settings) in &file.providers {
        let origin = format!("stack '{}' provider '{}'", id, name);
        stack.add_provider(name, to_config(&origin, settings)?)?;
    }

    if file.strict {
        stack.enable_builtin_schemas()?;
    }

    for (rid, decl) in &file.resources {
        let origin = format!("stack '{}' resource '{}'", id, rid);
        let config = to_config(&origin, &decl.config)?;
        let deps = decl
            .depends_on
            .iter()
            .map(|dep| stack.graph().handle(rid, dep))
            .collect::<Result<Vec<_>>>()?;
        stack.add_resource(rid, &decl.resource_type, config, &deps)?;
    }

    Ok(stack)
}

fn to_config(origin: &str, fields: &IndexMap<String, Yaml>) -> Result<Config> {
    fields
        .iter()
        .map(|(k, v)| Ok((k.clone(), to_value(&format!("{} field '{}'", origin, k), v)?)))
        .collect()
}

/// Convert a YAML node into a [`Value`], expanding reference templates.
pub fn to_value(origin: &str, yaml: &Yaml) -> Result<Value> {
    match yaml {
        Yaml::Null => Ok(Value::null()),
        Yaml::Bool(b) => Ok(Value::from(*b)),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(i))
            } else if n.is_u64() {
                Err(Error::parse(
                    origin,
                    format!("integer {} does not fit in a signed 64-bit value", n),
                ))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::from(f))
            } else {
                Err(Error::parse(origin, format!("unsupported number {}", n)))
            }
        }
        Yaml::String(s) => template(origin, s),
        Yaml::Sequence(items) => items
            .iter()
            .map(|item| to_value(origin, item))
            .collect::<Result<Vec<_>>>()
            .map(Value::from),
        Yaml::Mapping(map) => {
            let mut entries = IndexMap::new();
            for (k, v) in map {
                let Yaml::String(key) = k else {
                    return Err(Error::parse(origin, "map keys must be strings"));
                };
                entries.insert(key.clone(), to_value(origin, v)?);
            }
            Ok(Value::map(entries))
        }
        Yaml::Tagged(tagged) => Err(Error::parse(
            origin,
            format!("unsupported tag {}", tagged.tag),
        )),
    }
}

fn template(origin: &str, s: &str) -> Result<Value> {
    if !s.contains("{{") {
        return Ok(Value::from(s));
    }
    if let Some(caps) = VAR_TEMPLATE.captures(s) {
        return Ok(Value::Variable(caps[1].to_string()));
    }
    if let Some(caps) = REF_TEMPLATE.captures(s) {
        return Ok(Value::Attribute(super::types::AttributeRef {
            resource: caps[1].to_string(),
            path: caps[2].to_string(),
        }));
    }
    Err(Error::parse(
        origin,
        format!(
            "'{}' is not a reference; use exactly {{{{var.<name>}}}} or {{{{ref.<id>.<path>}}}}",
            s
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AttributeRef, PlanValue};

    const ATLAS: &str = r#"
version: "1.0"
name: atlas-demo
stacks:
  atlas:
    variables:
      orgId:
        type: string
        sensitive: true
        description: MongoDB Atlas Org ID
    providers:
      mongodbatlas:
        public_key: "{{var.orgId}}"
    resources:
      newProject:
        type: mongodbatlas_project
        config:
          name: CDKTFProject1
          org_id: "{{var.orgId}}"
      newCluster1:
        type: mongodbatlas_cluster
        config:
          project_id: "{{ref.newProject.id}}"
          name: atlasClusterCDK
          cloud_backup: false
          disk_size_gb: 10.5
"#;

    #[test]
    fn test_parse_valid() {
        let file = parse_app(ATLAS).unwrap();
        assert_eq!(file.name, "atlas-demo");
        assert!(validate_app_file(&file).is_empty());
        let stack = &file.stacks["atlas"];
        assert!(stack.variables["orgId"].sensitive);
        assert_eq!(stack.resources["newCluster1"].resource_type, "mongodbatlas_cluster");
    }

    #[test]
    fn test_build_and_synth() {
        let mut app = build_app(&parse_app(ATLAS).unwrap()).unwrap();
        let plans = app.synth().unwrap();
        let plan = &plans[0];
        let ids: Vec<_> = plan.resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["newProject", "newCluster1"]);
        assert_eq!(plan.resources[1].depends_on, vec!["newProject"]);
        assert_eq!(
            plan.resources[0].config["org_id"],
            PlanValue::Variable("orgId".to_string())
        );
        assert_eq!(
            plan.resources[1].config["disk_size_gb"],
            PlanValue::Literal(serde_json::json!(10.5))
        );
    }

    #[test]
    fn test_templates() {
        assert_eq!(
            template("t", "{{var.orgId}}").unwrap(),
            Value::Variable("orgId".to_string())
        );
        assert_eq!(
            template("t", "{{ref.cluster.connection_strings.0.standard}}").unwrap(),
            Value::Attribute(AttributeRef {
                resource: "cluster".to_string(),
                path: "connection_strings.0.standard".to_string(),
            })
        );
        assert_eq!(template("t", "plain").unwrap(), Value::from("plain"));
    }

    #[test]
    fn test_embedded_template_rejected() {
        let err = template("t", "mongodb://{{var.host}}:27017").unwrap_err();
        assert_eq!(err.kind(), "ParseError");
        let err = template("t", "{{ var.host }}").unwrap_err();
        assert_eq!(err.kind(), "ParseError");
    }

    #[test]
    fn test_nested_values() {
        let yaml: Yaml = serde_yaml_ng::from_str(
            r#"
- role_name: readAnyDatabase
  database_name: admin
- scopes: ["{{ref.cluster.name}}"]
"#,
        )
        .unwrap();
        let value = to_value("t", &yaml).unwrap();
        assert!(!value.is_literal());
        let mut refs = Vec::new();
        value.visit_attributes(&mut |r| refs.push(r.resource.clone()));
        assert_eq!(refs, vec!["cluster"]);
    }

    #[test]
    fn test_integer_out_of_range_rejected() {
        let yaml: Yaml = serde_yaml_ng::from_str("18446744073709551615").unwrap();
        let err = to_value("proj field 'quota'", &yaml).unwrap_err();
        assert_eq!(err.kind(), "ParseError");
        assert!(err.to_string().contains("quota"), "{}", err);

        let yaml: Yaml = serde_yaml_ng::from_str("9223372036854775807").unwrap();
        assert_eq!(to_value("t", &yaml).unwrap(), Value::from(i64::MAX));
    }

    #[test]
    fn test_bad_version() {
        let file = parse_app("version: \"2.0\"\nname: x\n").unwrap();
        let problems = validate_app_file(&file);
        assert!(problems.iter().any(|p| p.contains("version")));
        assert_eq!(build_app(&file).unwrap_err().kind(), "ParseError");
    }

    #[test]
    fn test_dependency_problems() {
        let yaml = r#"
version: "1.0"
name: deps
stacks:
  s:
    resources:
      a:
        type: t
        depends_on: [b]
      b:
        type: t
        depends_on: [b, ghost]
"#;
        let problems = validate_app_file(&parse_app(yaml).unwrap());
        assert_eq!(problems.len(), 3, "{:?}", problems);
        assert!(problems[0].contains("declared after"));
        assert!(problems[1].contains("itself"));
        assert!(problems[2].contains("unknown resource 'ghost'"));
    }

    #[test]
    fn test_unknown_ref_in_config() {
        let yaml = r#"
version: "1.0"
name: refs
stacks:
  s:
    resources:
      a:
        type: t
        config:
          x: "{{ref.later.id}}"
      later:
        type: t
"#;
        let err = build_app(&parse_app(yaml).unwrap()).unwrap_err();
        assert_eq!(err.kind(), "UnknownReferenceError");
    }

    #[test]
    fn test_strict_stack() {
        let yaml = r#"
version: "1.0"
name: strict
stacks:
  s:
    strict: true
    providers:
      mongodbatlas: {}
    resources:
      p:
        type: mongodbatlas_project
        config:
          name: only-a-name
"#;
        let err = build_app(&parse_app(yaml).unwrap()).unwrap_err();
        assert_eq!(err.kind(), "SchemaValidationError");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse_app("version: \"1.0\"\nname: x\nmachines: {}\n").unwrap_err();
        assert_eq!(err.kind(), "ParseError");
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stacks.yaml");
        std::fs::write(&path, ATLAS).unwrap();
        let app = load_app(&path).unwrap();
        assert_eq!(app.name(), "atlas-demo");
        assert_eq!(load_app(&dir.path().join("missing.yaml")).unwrap_err().kind(), "IoError");
    }

    #[test]
    fn test_parse_invalid_yaml() {
        assert!(parse_app("not: [valid: yaml: {{").is_err());
    }
}
