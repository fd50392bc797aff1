//! Stacks and apps: the unit of synthesis and its container.
//!
//! A stack owns one variable registry, one graph builder and its provider
//! blocks. It moves from `Declaring` to `Synthesized` exactly once.

use super::error::{Error, RefKind, Result};
use super::ident::check_identifier;
use super::planner;
use super::resolver::{GraphBuilder, ResourceHandle};
use super::types::{Config, Plan, ProviderConfig, VarType};
use super::variables::{VariableHandle, VariableRegistry};
use crate::provider::{self, Provider};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Declaring,
    Synthesized,
}

#[derive(Debug)]
pub struct Stack {
    id: String,
    variables: VariableRegistry,
    graph: GraphBuilder,
    providers: IndexMap<String, ProviderConfig>,
    phase: Phase,
}

impl Stack {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            variables: VariableRegistry::new(id),
            graph: GraphBuilder::new(id),
            providers: IndexMap::new(),
            phase: Phase::Declaring,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn variables(&self) -> &VariableRegistry {
        &self.variables
    }

    pub fn graph(&self) -> &GraphBuilder {
        &self.graph
    }

    /// Provider blocks in declaration order.
    pub fn providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.values()
    }

    fn ensure_declaring(&self) -> Result<()> {
        match self.phase {
            Phase::Declaring => Ok(()),
            Phase::Synthesized => Err(Error::AlreadySynthesized {
                stack: self.id.clone(),
            }),
        }
    }

    pub fn variables_mut(&mut self) -> Result<&mut VariableRegistry> {
        self.ensure_declaring()?;
        Ok(&mut self.variables)
    }

    pub fn graph_mut(&mut self) -> Result<&mut GraphBuilder> {
        self.ensure_declaring()?;
        Ok(&mut self.graph)
    }

    pub fn declare_variable(
        &mut self,
        name: &str,
        var_type: VarType,
        sensitive: bool,
        description: Option<&str>,
    ) -> Result<VariableHandle> {
        self.variables_mut()?
            .declare(name, var_type, sensitive, description)
    }

    pub fn add_resource(
        &mut self,
        id: &str,
        resource_type: &str,
        config: Config,
        explicit_deps: &[ResourceHandle],
    ) -> Result<ResourceHandle> {
        self.graph_mut()?
            .add_resource(id, resource_type, config, explicit_deps)
    }

    /// Declare a provider block. Settings may read declared variables and
    /// attributes of resources already added.
    pub fn add_provider(&mut self, name: &str, settings: Config) -> Result<()> {
        self.ensure_declaring()?;
        check_identifier("provider", name)?;
        if self.providers.contains_key(name) {
            return Err(Error::DuplicateName {
                stack: self.id.clone(),
                what: "provider",
                name: name.to_string(),
            });
        }

        let from = format!("provider.{}", name);
        let mut missing: Option<(RefKind, String)> = None;
        for value in settings.values() {
            value.visit_variables(&mut |var| {
                if missing.is_none() && !self.variables.contains(var) {
                    missing = Some((RefKind::Variable, var.to_string()));
                }
            });
            value.visit_attributes(&mut |r| {
                if missing.is_none() && !self.graph.contains(&r.resource) {
                    missing = Some((RefKind::Resource, r.resource.clone()));
                }
            });
        }
        if let Some((kind, target)) = missing {
            return Err(Error::UnknownReference { from, kind, target });
        }

        log::debug!("stack '{}': declared provider '{}'", self.id, name);
        self.providers.insert(
            name.to_string(),
            ProviderConfig {
                name: name.to_string(),
                settings,
            },
        );
        Ok(())
    }

    /// Validate every later resource against registered schemas.
    pub fn enable_strict(&mut self) -> Result<()> {
        self.graph_mut()?.set_strict(true);
        Ok(())
    }

    pub fn register_schema(&mut self, provider: Box<dyn Provider>) -> Result<()> {
        self.graph_mut()?.register_schema(provider);
        Ok(())
    }

    /// Strict mode with the built-in schema for every declared provider
    /// that has one.
    pub fn enable_builtin_schemas(&mut self) -> Result<()> {
        self.ensure_declaring()?;
        let names: Vec<String> = self.providers.keys().cloned().collect();
        for name in names {
            if let Some(schema) = provider::builtin(&name) {
                self.graph.register_schema(schema);
            }
        }
        self.graph.set_strict(true);
        Ok(())
    }

    /// Synthesize the plan and close the stack to further declarations.
    /// On failure the stack stays open so the caller can fix and retry.
    pub fn finalize(&mut self) -> Result<Plan> {
        self.ensure_declaring()?;
        let plan = planner::synthesize(self)?;
        self.phase = Phase::Synthesized;
        Ok(plan)
    }
}

/// A named collection of independent stacks.
#[derive(Debug)]
pub struct App {
    name: String,
    stacks: IndexMap<String, Stack>,
}

impl App {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stacks: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_stack(&mut self, stack: Stack) -> Result<()> {
        check_identifier("stack", stack.id())?;
        if self.stacks.contains_key(stack.id()) {
            return Err(Error::DuplicateId {
                scope: format!("app '{}'", self.name),
                id: stack.id().to_string(),
            });
        }
        self.stacks.insert(stack.id().to_string(), stack);
        Ok(())
    }

    pub fn stack(&self, id: &str) -> Option<&Stack> {
        self.stacks.get(id)
    }

    pub fn stack_mut(&mut self, id: &str) -> Option<&mut Stack> {
        self.stacks.get_mut(id)
    }

    pub fn stacks(&self) -> impl Iterator<Item = &Stack> {
        self.stacks.values()
    }

    /// Synthesize every stack in declaration order. The first failure aborts
    /// the whole app and no plans are returned.
    pub fn synth(&mut self) -> Result<Vec<Plan>> {
        let mut plans = Vec::with_capacity(self.stacks.len());
        for stack in self.stacks.values_mut() {
            plans.push(stack.finalize()?);
        }
        log::info!("app '{}': synthesized {} stacks", self.name, plans.len());
        Ok(plans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{PlanValue, Value};

    #[test]
    fn test_finalize_once() {
        let mut stack = Stack::new("s");
        stack.add_resource("a", "t", Config::new(), &[]).unwrap();
        stack.finalize().unwrap();
        assert_eq!(stack.phase(), Phase::Synthesized);
        assert_eq!(stack.finalize().unwrap_err().kind(), "AlreadySynthesizedError");
    }

    #[test]
    fn test_declare_after_finalize() {
        let mut stack = Stack::new("s");
        stack.finalize().unwrap();
        let err = stack
            .add_resource("late", "t", Config::new(), &[])
            .unwrap_err();
        assert_eq!(err.kind(), "AlreadySynthesizedError");
        assert!(stack
            .declare_variable("v", VarType::Bool, false, None)
            .is_err());
        assert!(stack.add_provider("p", Config::new()).is_err());
    }

    #[test]
    fn test_failed_finalize_stays_open() {
        let mut stack = Stack::new("s");
        stack
            .add_resource(
                "a",
                "t",
                Config::from([("x".to_string(), Value::Variable("later".to_string()))]),
                &[],
            )
            .unwrap();
        assert!(stack.finalize().is_err());
        assert_eq!(stack.phase(), Phase::Declaring);
        stack
            .declare_variable("later", VarType::String, false, None)
            .unwrap();
        let plan = stack.finalize().unwrap();
        assert_eq!(plan.variables[0].name, "later");
    }

    #[test]
    fn test_empty_stack() {
        let plan = Stack::new("empty").finalize().unwrap();
        assert!(plan.resources.is_empty());
        assert!(plan.variables.is_empty());
    }

    #[test]
    fn test_provider_rules() {
        let mut stack = Stack::new("s");
        let err = stack
            .add_provider(
                "mongodbatlas",
                Config::from([("public_key".to_string(), Value::Variable("pk".to_string()))]),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "UnknownReferenceError");

        let pk = stack
            .declare_variable("pk", VarType::String, true, None)
            .unwrap();
        stack
            .add_provider(
                "mongodbatlas",
                Config::from([("public_key".to_string(), pk.value())]),
            )
            .unwrap();
        let err = stack.add_provider("mongodbatlas", Config::new()).unwrap_err();
        assert_eq!(err.kind(), "DuplicateNameError");
    }

    #[test]
    fn test_builtin_schemas_strict() {
        let mut stack = Stack::new("s");
        stack.add_provider("mongodbatlas", Config::new()).unwrap();
        stack.enable_builtin_schemas().unwrap();
        assert!(stack.graph().is_strict());

        let err = stack
            .add_resource(
                "p",
                "mongodbatlas_project",
                Config::from([("name".to_string(), Value::from("x"))]),
                &[],
            )
            .unwrap_err();
        assert_eq!(err.kind(), "SchemaValidationError");
        assert!(err.to_string().contains("org_id"));
        assert!(stack.graph().is_empty());

        stack
            .add_resource(
                "p",
                "mongodbatlas_project",
                Config::from([
                    ("name".to_string(), Value::from("x")),
                    ("org_id".to_string(), Value::from("abc")),
                ]),
                &[],
            )
            .unwrap();
    }

    #[test]
    fn test_app_duplicate_stack() {
        let mut app = App::new("demo");
        app.add_stack(Stack::new("one")).unwrap();
        let err = app.add_stack(Stack::new("one")).unwrap_err();
        assert_eq!(err.kind(), "DuplicateIdError");
        assert!(app.add_stack(Stack::new("bad/id")).is_err());
    }

    #[test]
    fn test_app_synth_all_or_nothing() {
        let mut app = App::new("demo");
        app.add_stack(Stack::new("good")).unwrap();
        let mut broken = Stack::new("broken");
        broken
            .add_resource(
                "a",
                "t",
                Config::from([("x".to_string(), Value::Variable("nope".to_string()))]),
                &[],
            )
            .unwrap();
        app.add_stack(broken).unwrap();
        assert!(app.synth().is_err());
    }

    #[test]
    fn test_independent_stacks_reuse_ids() {
        let mut app = App::new("demo");
        for id in ["dev", "prod"] {
            let mut stack = Stack::new(id);
            let env = stack
                .declare_variable("env", VarType::String, false, None)
                .unwrap();
            stack
                .add_resource(
                    "proj",
                    "project",
                    Config::from([("name".to_string(), env.value())]),
                    &[],
                )
                .unwrap();
            app.add_stack(stack).unwrap();
        }
        let plans = app.synth().unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[1].stack, "prod");
        assert_eq!(
            plans[1].resources[0].config["name"],
            PlanValue::Variable("env".to_string())
        );
    }
}
