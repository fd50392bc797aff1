//! Plan synthesis: order a stack's graph and serialize it.
//!
//! Literals are inlined, variables become parameter slots and attribute
//! reads become symbolic references. No I/O happens here.

use super::error::{Error, RefKind, Result};
use super::resolver;
use super::stack::Stack;
use super::types::*;
use crate::core::digest;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

/// Synthesize the plan for a stack. Either a complete plan or an error.
pub fn synthesize(stack: &Stack) -> Result<Plan> {
    let graph = stack.graph();

    if let Some(cycle) = graph.detect_cycles().into_iter().next() {
        return Err(Error::CyclicDependency { cycle });
    }

    for node in graph.nodes() {
        check_references(stack, &node.id, &node.config)?;
    }
    for provider in stack.providers() {
        check_references(stack, &format!("provider.{}", provider.name), &provider.settings)?;
    }

    let order = graph.execution_order()?;

    let variables = stack
        .variables()
        .iter()
        .map(|v| PlanVariable {
            name: v.name.clone(),
            var_type: v.var_type,
            sensitive: v.sensitive,
            description: v.description.clone(),
        })
        .collect();

    let mut providers = Vec::new();
    for provider in stack.providers() {
        let owner = format!("provider.{}", provider.name);
        providers.push(PlanProvider {
            name: provider.name.clone(),
            settings: encode_config(&owner, &provider.settings)?,
        });
    }

    let mut resources = Vec::with_capacity(order.len());
    for id in &order {
        let Some(node) = graph.get(id) else {
            continue;
        };
        resources.push(PlanResource {
            id: node.id.clone(),
            resource_type: node.resource_type.clone(),
            config: encode_config(&node.id, &node.config)?,
            depends_on: node.edges.clone(),
        });
    }

    log::info!(
        "synthesized stack '{}': {} variables, {} providers, {} resources",
        stack.id(),
        stack.variables().len(),
        providers.len(),
        resources.len()
    );

    Ok(Plan {
        stack: stack.id().to_string(),
        variables,
        providers,
        resources,
    })
}

/// Every attribute read must name a resource in the graph and every
/// variable read a declared variable.
fn check_references(stack: &Stack, owner: &str, config: &Config) -> Result<()> {
    let mut missing: Option<(RefKind, &str)> = None;
    for value in config.values() {
        value.visit_attributes(&mut |r| {
            if missing.is_none() && !stack.graph().contains(&r.resource) {
                missing = Some((RefKind::Resource, r.resource.as_str()));
            }
        });
        value.visit_variables(&mut |name| {
            if missing.is_none() && !stack.variables().contains(name) {
                missing = Some((RefKind::Variable, name));
            }
        });
    }
    match missing {
        Some((kind, target)) => Err(Error::UnknownReference {
            from: owner.to_string(),
            kind,
            target: target.to_string(),
        }),
        None => Ok(()),
    }
}

fn encode_config(owner: &str, config: &Config) -> Result<IndexMap<String, PlanValue>> {
    config
        .iter()
        .map(|(field, value)| Ok((field.clone(), encode_value(owner, field, value)?)))
        .collect()
}

/// Encode one value. Fully literal structures collapse to a single
/// `literal`; structures that nest deferred values keep their shape.
fn encode_value(owner: &str, path: &str, value: &Value) -> Result<PlanValue> {
    if value.is_literal() {
        return Ok(PlanValue::Literal(to_json(owner, path, value)?));
    }
    match value {
        Value::Variable(name) => Ok(PlanValue::Variable(name.clone())),
        Value::Attribute(r) => Ok(PlanValue::Ref(PlanRef {
            id: r.resource.clone(),
            path: r.path.clone(),
        })),
        Value::Literal(Literal::List(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| encode_value(owner, &format!("{}[{}]", path, i), item))
            .collect::<Result<Vec<_>>>()
            .map(PlanValue::List),
        Value::Literal(Literal::Map(entries)) => entries
            .iter()
            .map(|(k, v)| Ok((k.clone(), encode_value(owner, &format!("{}.{}", path, k), v)?)))
            .collect::<Result<IndexMap<_, _>>>()
            .map(PlanValue::Object),
        Value::Literal(_) => Ok(PlanValue::Literal(to_json(owner, path, value)?)),
    }
}

fn to_json(owner: &str, path: &str, value: &Value) -> Result<serde_json::Value> {
    let unrepresentable = |reason: String| Error::Serialization {
        resource: owner.to_string(),
        field: path.to_string(),
        reason,
    };
    match value {
        Value::Literal(Literal::Null) => Ok(serde_json::Value::Null),
        Value::Literal(Literal::Bool(b)) => Ok(serde_json::Value::Bool(*b)),
        Value::Literal(Literal::Int(n)) => Ok(serde_json::Value::from(*n)),
        Value::Literal(Literal::Float(f)) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| unrepresentable(format!("non-finite number {}", f))),
        Value::Literal(Literal::String(s)) => Ok(serde_json::Value::String(s.clone())),
        Value::Literal(Literal::List(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| to_json(owner, &format!("{}[{}]", path, i), item))
            .collect::<Result<Vec<_>>>()
            .map(serde_json::Value::Array),
        Value::Literal(Literal::Map(entries)) => entries
            .iter()
            .map(|(k, v)| Ok((k.clone(), to_json(owner, &format!("{}.{}", path, k), v)?)))
            .collect::<Result<serde_json::Map<_, _>>>()
            .map(serde_json::Value::Object),
        Value::Variable(_) | Value::Attribute(_) => Err(unrepresentable(
            "deferred value in literal position".to_string(),
        )),
    }
}

// ============================================================================
// Plan file encoding
// ============================================================================

impl Plan {
    /// Canonical plan text: pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(self).map_err(|e| Error::Serialization {
            resource: self.stack.clone(),
            field: "plan".to_string(),
            reason: e.to_string(),
        })?;
        text.push('\n');
        Ok(text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::parse("plan", e))
    }

    /// BLAKE3 digest of the canonical plan text.
    pub fn digest(&self) -> Result<String> {
        Ok(digest::hash_string(&self.to_json()?))
    }

    pub fn resource(&self, id: &str) -> Option<&PlanResource> {
        self.resources.iter().find(|r| r.id == id)
    }
}

/// Re-validate a plan loaded from disk: unique names, resolvable references,
/// no cycles, and every dependency listed before its dependent.
pub fn check_plan(plan: &Plan) -> Result<()> {
    let scope = format!("plan '{}'", plan.stack);

    let mut variables: FxHashSet<&str> = FxHashSet::default();
    for v in &plan.variables {
        if !variables.insert(v.name.as_str()) {
            return Err(Error::DuplicateName {
                stack: plan.stack.clone(),
                what: "variable",
                name: v.name.clone(),
            });
        }
    }

    let mut position: FxHashMap<&str, usize> = FxHashMap::default();
    for (i, r) in plan.resources.iter().enumerate() {
        if position.insert(r.id.as_str(), i).is_some() {
            return Err(Error::DuplicateId {
                scope,
                id: r.id.clone(),
            });
        }
    }

    let unknown = |from: &str, kind: RefKind, target: &str| Error::UnknownReference {
        from: from.to_string(),
        kind,
        target: target.to_string(),
    };

    for r in &plan.resources {
        let mut refs: Vec<&str> = Vec::new();
        let mut vars: Vec<&str> = Vec::new();
        for value in r.config.values() {
            value.visit_refs(&mut |pr| refs.push(pr.id.as_str()));
            value.visit_variables(&mut |name| vars.push(name));
        }
        if let Some(var) = vars.into_iter().find(|v| !variables.contains(v)) {
            return Err(unknown(&r.id, RefKind::Variable, var));
        }
        for target in refs.into_iter().chain(r.depends_on.iter().map(String::as_str)) {
            if !position.contains_key(target) {
                return Err(unknown(&r.id, RefKind::Resource, target));
            }
        }
        if let Some(dep) = r.config.values().find_map(|v| {
            let mut missing = None;
            v.visit_refs(&mut |pr| {
                if missing.is_none() && !r.depends_on.contains(&pr.id) {
                    missing = Some(pr.id.clone());
                }
            });
            missing
        }) {
            return Err(Error::InvalidPlan {
                stack: plan.stack.clone(),
                message: format!("resource '{}' references '{}' without depending on it", r.id, dep),
            });
        }
    }

    for p in &plan.providers {
        let from = format!("provider.{}", p.name);
        for value in p.settings.values() {
            let mut missing = None;
            value.visit_variables(&mut |name| {
                if missing.is_none() && !variables.contains(name) {
                    missing = Some((RefKind::Variable, name.to_string()));
                }
            });
            value.visit_refs(&mut |pr| {
                if missing.is_none() && !position.contains_key(pr.id.as_str()) {
                    missing = Some((RefKind::Resource, pr.id.clone()));
                }
            });
            if let Some((kind, target)) = missing {
                return Err(unknown(&from, kind, &target));
            }
        }
    }

    let graph: Vec<(&str, &[String])> = plan
        .resources
        .iter()
        .map(|r| (r.id.as_str(), r.depends_on.as_slice()))
        .collect();
    if let Some(cycle) = resolver::find_cycles(&graph).into_iter().next() {
        return Err(Error::CyclicDependency { cycle });
    }

    for (i, r) in plan.resources.iter().enumerate() {
        if let Some(dep) = r.depends_on.iter().find(|d| position[d.as_str()] > i) {
            return Err(Error::InvalidPlan {
                stack: plan.stack.clone(),
                message: format!("resource '{}' is listed before its dependency '{}'", r.id, dep),
            });
        }
    }

    Ok(())
}

/// Human-readable summary lines. Variables only ever appear by name.
pub fn describe(plan: &Plan) -> Vec<String> {
    let sensitive: FxHashSet<&str> = plan
        .variables
        .iter()
        .filter(|v| v.sensitive)
        .map(|v| v.name.as_str())
        .collect();

    let mut lines = Vec::new();
    for v in &plan.variables {
        lines.push(format!(
            "  var.{} ({}{})",
            v.name,
            v.var_type,
            if v.sensitive { ", sensitive" } else { "" }
        ));
    }
    for p in &plan.providers {
        lines.push(format!("  provider {}", p.name));
        for (k, v) in &p.settings {
            lines.push(format!("      {} = {}", k, render(v, &sensitive)));
        }
    }
    for r in &plan.resources {
        let after = if r.depends_on.is_empty() {
            String::new()
        } else {
            format!(" after {}", r.depends_on.join(", "))
        };
        lines.push(format!("  + {} ({}){}", r.id, r.resource_type, after));
        for (k, v) in &r.config {
            lines.push(format!("      {} = {}", k, render(v, &sensitive)));
        }
    }
    lines
}

fn render(value: &PlanValue, sensitive: &FxHashSet<&str>) -> String {
    match value {
        PlanValue::Literal(v) => v.to_string(),
        PlanValue::Variable(name) if sensitive.contains(name.as_str()) => {
            format!("var.{} (sensitive)", name)
        }
        PlanValue::Variable(name) => format!("var.{}", name),
        PlanValue::Ref(r) => format!("{}.{}", r.id, r.path),
        PlanValue::List(items) => format!(
            "[{}]",
            items
                .iter()
                .map(|v| render(v, sensitive))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        PlanValue::Object(entries) => format!(
            "{{{}}}",
            entries
                .iter()
                .map(|(k, v)| format!("{} = {}", k, render(v, sensitive)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}
