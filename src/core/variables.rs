//! Variable registry: externally supplied inputs exposed as deferred values.

use super::error::{Error, Result};
use super::ident::check_identifier;
use super::types::{Value, VarType, Variable};
use indexmap::IndexMap;

/// Handle to a declared variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableHandle {
    name: String,
}

impl VariableHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deferred value reading this variable.
    pub fn value(&self) -> Value {
        Value::Variable(self.name.clone())
    }
}

/// Declared inputs of one stack, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    stack: String,
    variables: IndexMap<String, Variable>,
}

impl VariableRegistry {
    pub fn new(stack: &str) -> Self {
        Self {
            stack: stack.to_string(),
            variables: IndexMap::new(),
        }
    }

    /// Declare an input. Fails if `name` is already declared in this stack.
    pub fn declare(
        &mut self,
        name: &str,
        var_type: VarType,
        sensitive: bool,
        description: Option<&str>,
    ) -> Result<VariableHandle> {
        check_identifier("variable", name)?;
        if self.variables.contains_key(name) {
            return Err(Error::DuplicateName {
                stack: self.stack.clone(),
                what: "variable",
                name: name.to_string(),
            });
        }
        log::debug!(
            "stack '{}': declared variable '{}' ({}{})",
            self.stack,
            name,
            var_type,
            if sensitive { ", sensitive" } else { "" }
        );
        self.variables.insert(
            name.to_string(),
            Variable {
                name: name.to_string(),
                var_type,
                sensitive,
                description: description.map(str::to_string),
            },
        );
        Ok(VariableHandle {
            name: name.to_string(),
        })
    }

    /// The deferred value for a handle. No value lookup happens here.
    pub fn resolve(&self, handle: &VariableHandle) -> Value {
        handle.value()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
