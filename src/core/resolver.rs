//! Resource graph construction, reference checks and ordering.
//!
//! Builds a DAG from attribute references and explicit depends_on edges.
//! A node may only reference nodes added before it. Topological order uses
//! Kahn's algorithm with insertion order as the tie-break, so output is a
//! pure function of declaration order.

use super::error::{Error, RefKind, Result};
use super::ident::check_identifier;
use super::types::{AttributeRef, Config, ResourceNode, Value};
use crate::provider::Provider;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Handle to a resource added to a builder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    id: String,
}

impl ResourceHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Shorthand for [`attribute_of`].
    pub fn attr(&self, path: &str) -> Value {
        attribute_of(self, path)
    }
}

/// Deferred read of `path` on the resource behind `handle`. Paths are not
/// checked against any schema.
pub fn attribute_of(handle: &ResourceHandle, path: &str) -> Value {
    Value::Attribute(AttributeRef {
        resource: handle.id.clone(),
        path: path.to_string(),
    })
}

/// Accumulates resource nodes for one stack.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    stack: String,
    nodes: IndexMap<String, ResourceNode>,
    strict: bool,
    schemas: Vec<Box<dyn Provider>>,
}

impl GraphBuilder {
    pub fn new(stack: &str) -> Self {
        Self {
            stack: stack.to_string(),
            ..Self::default()
        }
    }

    /// Validate every subsequent resource against a registered provider.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Register a provider schema consulted in strict mode.
    pub fn register_schema(&mut self, provider: Box<dyn Provider>) {
        log::debug!(
            "stack '{}': registered schema provider '{}'",
            self.stack,
            provider.name()
        );
        self.schemas.push(provider);
    }

    /// Add a resource. Every attribute reference in `config` and every
    /// explicit dependency must name a resource already in this builder.
    pub fn add_resource(
        &mut self,
        id: &str,
        resource_type: &str,
        config: Config,
        explicit_deps: &[ResourceHandle],
    ) -> Result<ResourceHandle> {
        check_identifier("resource", id)?;
        if self.nodes.contains_key(id) {
            return Err(Error::DuplicateId {
                scope: format!("stack '{}'", self.stack),
                id: id.to_string(),
            });
        }

        let mut referenced: FxHashSet<&str> = FxHashSet::default();
        let mut unknown: Option<&str> = None;
        for value in config.values() {
            value.visit_attributes(&mut |r| {
                if self.nodes.contains_key(&r.resource) {
                    referenced.insert(r.resource.as_str());
                } else if unknown.is_none() {
                    unknown = Some(r.resource.as_str());
                }
            });
        }
        if let Some(target) = unknown {
            return Err(unknown_resource(id, target));
        }
        for dep in explicit_deps {
            if !self.nodes.contains_key(&dep.id) {
                return Err(unknown_resource(id, &dep.id));
            }
            referenced.insert(dep.id.as_str());
        }

        if self.strict {
            self.check_schema(id, resource_type, &config)?;
        }

        // Order edges by the dependencies' own insertion order.
        let mut edges: Vec<(usize, String)> = referenced
            .into_iter()
            .filter_map(|dep| self.nodes.get_index_of(dep).map(|i| (i, dep.to_string())))
            .collect();
        edges.sort_unstable();
        let edges: Vec<String> = edges.into_iter().map(|(_, dep)| dep).collect();

        log::debug!(
            "stack '{}': added resource '{}' ({}) depending on [{}]",
            self.stack,
            id,
            resource_type,
            edges.join(", ")
        );

        self.nodes.insert(
            id.to_string(),
            ResourceNode {
                id: id.to_string(),
                resource_type: resource_type.to_string(),
                config,
                depends_on: explicit_deps.iter().map(|d| d.id.clone()).collect(),
                edges,
            },
        );
        Ok(ResourceHandle { id: id.to_string() })
    }

    fn check_schema(&self, id: &str, resource_type: &str, config: &Config) -> Result<()> {
        let provider = self
            .schemas
            .iter()
            .find(|p| p.handles(resource_type))
            .ok_or_else(|| Error::SchemaValidation {
                provider: "-".to_string(),
                resource: id.to_string(),
                resource_type: resource_type.to_string(),
                problems: vec!["no registered provider handles this type".to_string()],
            })?;
        let result = provider.validate_schema(resource_type, config);
        if result.is_valid() {
            return Ok(());
        }
        Err(Error::SchemaValidation {
            provider: provider.name().to_string(),
            resource: id.to_string(),
            resource_type: resource_type.to_string(),
            problems: result.problems,
        })
    }

    /// Handle for a resource already added, for explicit dependencies.
    pub fn handle(&self, from: &str, id: &str) -> Result<ResourceHandle> {
        if self.nodes.contains_key(id) {
            Ok(ResourceHandle { id: id.to_string() })
        } else {
            Err(unknown_resource(from, id))
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All dependency cycles, each as the offending id sequence.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        find_cycles(&self.adjacency())
    }

    /// Dependency-respecting order of resource ids.
    pub fn execution_order(&self) -> Result<Vec<String>> {
        execution_order(&self.adjacency())
    }

    fn adjacency(&self) -> Vec<(&str, &[String])> {
        self.nodes
            .values()
            .map(|n| (n.id.as_str(), n.edges.as_slice()))
            .collect()
    }
}

fn unknown_resource(from: &str, target: &str) -> Error {
    Error::UnknownReference {
        from: from.to_string(),
        kind: RefKind::Resource,
        target: target.to_string(),
    }
}

// ============================================================================
// Graph algorithms over (id, dependencies) in insertion order
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

/// Find dependency cycles with an iterative depth-first search. Roots and
/// edges are visited in insertion order so results are deterministic. Each
/// strongly connected tangle is reported once per distinct member set.
/// Dependencies on ids outside the graph are ignored here.
pub fn find_cycles(graph: &[(&str, &[String])]) -> Vec<Vec<String>> {
    let index: FxHashMap<&str, usize> = graph
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (*id, i))
        .collect();
    let mut marks = vec![Mark::New; graph.len()];
    let mut seen: FxHashSet<Vec<usize>> = FxHashSet::default();
    let mut cycles = Vec::new();

    for root in 0..graph.len() {
        if marks[root] != Mark::New {
            continue;
        }
        marks[root] = Mark::Active;
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(top) = stack.last_mut() {
            let (node, edge) = *top;
            let deps = graph[node].1;
            if edge == deps.len() {
                marks[node] = Mark::Done;
                stack.pop();
                continue;
            }
            top.1 += 1;

            let Some(&next) = index.get(deps[edge].as_str()) else {
                continue;
            };
            match marks[next] {
                Mark::New => {
                    marks[next] = Mark::Active;
                    stack.push((next, 0));
                }
                Mark::Active => {
                    if let Some(start) = stack.iter().position(|(n, _)| *n == next) {
                        let members: Vec<usize> = stack[start..].iter().map(|(n, _)| *n).collect();
                        let mut key = members.clone();
                        key.sort_unstable();
                        if seen.insert(key) {
                            cycles.push(
                                members
                                    .into_iter()
                                    .map(|n| graph[n].0.to_string())
                                    .collect(),
                            );
                        }
                    }
                }
                Mark::Done => {}
            }
        }
    }

    cycles
}

/// Stable topological order: among ready nodes the earliest inserted wins.
/// Fails with the first cycle found when the graph is not a DAG.
pub fn execution_order(graph: &[(&str, &[String])]) -> Result<Vec<String>> {
    let index: FxHashMap<&str, usize> = graph
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (*id, i))
        .collect();
    let mut in_degree = vec![0usize; graph.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); graph.len()];

    for (i, (id, deps)) in graph.iter().enumerate() {
        for dep in deps.iter() {
            let d = *index
                .get(dep.as_str())
                .ok_or_else(|| unknown_resource(id, dep))?;
            dependents[d].push(i);
            in_degree[i] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(Reverse(current)) = ready.pop() {
        order.push(graph[current].0.to_string());
        for &next in &dependents[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() != graph.len() {
        let cycle = find_cycles(graph).into_iter().next().unwrap_or_else(|| {
            // Unreachable for well-formed input; name the stuck nodes instead.
            graph
                .iter()
                .zip(&in_degree)
                .filter(|(_, &d)| d > 0)
                .map(|((id, _), _)| id.to_string())
                .collect()
        });
        return Err(Error::CyclicDependency { cycle });
    }

    Ok(order)
}
