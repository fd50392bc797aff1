//! Engine runner: hands a synthesized plan to the external engine.
//!
//! The engine owns provider APIs, state and secrets. This module only checks
//! that every plan variable has an environment value and then runs
//! `<engine> <sub-command>` in the stack's output directory.

pub mod local;

use crate::core::error::{Error, Result};
use crate::core::types::Plan;
use std::fmt;
use std::path::Path;

pub const DEFAULT_ENGINE: &str = "terraform";
pub const DEFAULT_VAR_PREFIX: &str = "TF_VAR_";

/// Output from an engine run.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineAction {
    Diff,
    Apply,
    Destroy,
}

impl EngineAction {
    /// Engine sub-command for this action.
    pub fn subcommand(self) -> &'static str {
        match self {
            Self::Diff => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for EngineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Diff => write!(f, "diff"),
            Self::Apply => write!(f, "apply"),
            Self::Destroy => write!(f, "destroy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub program: String,

    /// Environment prefix the engine reads variables from.
    pub var_prefix: String,

    /// Extra arguments appended after the sub-command.
    pub extra_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_ENGINE.to_string(),
            var_prefix: DEFAULT_VAR_PREFIX.to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Names of plan variables with no `<prefix><name>` value in `lookup`.
/// Only names are returned; values are never read into the result.
pub fn missing_variables(
    plan: &Plan,
    prefix: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<String> {
    plan.variables
        .iter()
        .filter(|v| lookup(&format!("{}{}", prefix, v.name)).is_none())
        .map(|v| v.name.clone())
        .collect()
}

/// Fail with the missing names if any variable is unbound.
pub fn check_variables(
    plan: &Plan,
    prefix: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let names = missing_variables(plan, prefix, lookup);
    if names.is_empty() {
        return Ok(());
    }
    Err(Error::MissingVariables {
        stack: plan.stack.clone(),
        names: names
            .into_iter()
            .map(|n| format!("{}{}", prefix, n))
            .collect(),
    })
}

/// Run one engine action for a stack whose plan lives in `stack_dir`.
/// Variables are looked up in the process environment.
pub fn run(
    cfg: &EngineConfig,
    action: EngineAction,
    stack_dir: &Path,
    plan: &Plan,
) -> Result<ExecOutput> {
    check_variables(plan, &cfg.var_prefix, |key| std::env::var(key).ok())?;

    let mut args = vec![action.subcommand().to_string()];
    args.extend(cfg.extra_args.iter().cloned());
    log::info!(
        "stack '{}': {} via {} {}",
        plan.stack,
        action,
        cfg.program,
        args.join(" ")
    );

    let out = local::exec_local(&cfg.program, &args, stack_dir)?;
    if !out.success() {
        let detail = out
            .stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("no output");
        return Err(Error::Engine {
            program: cfg.program.clone(),
            detail: format!("{} exited with {}: {}", action.subcommand(), out.exit_code, detail),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{PlanVariable, VarType};
    use std::collections::HashMap;

    fn plan_with(vars: &[&str]) -> Plan {
        Plan {
            stack: "atlas".to_string(),
            variables: vars
                .iter()
                .map(|n| PlanVariable {
                    name: n.to_string(),
                    var_type: VarType::String,
                    sensitive: true,
                    description: None,
                })
                .collect(),
            providers: Vec::new(),
            resources: Vec::new(),
        }
    }

    #[test]
    fn test_subcommands() {
        assert_eq!(EngineAction::Diff.subcommand(), "plan");
        assert_eq!(EngineAction::Apply.subcommand(), "apply");
        assert_eq!(EngineAction::Destroy.subcommand(), "destroy");
    }

    #[test]
    fn test_missing_variables() {
        let env: HashMap<&str, &str> = HashMap::from([("TF_VAR_publicKey", "secret-pk")]);
        let plan = plan_with(&["publicKey", "privateKey", "orgId"]);
        let missing = missing_variables(&plan, "TF_VAR_", |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(missing, vec!["privateKey", "orgId"]);
    }

    #[test]
    fn test_check_variables_names_only() {
        let env: HashMap<&str, &str> = HashMap::from([("TF_VAR_publicKey", "secret-pk")]);
        let plan = plan_with(&["publicKey", "orgId"]);
        let err = check_variables(&plan, "TF_VAR_", |k| env.get(k).map(|v| v.to_string()))
            .unwrap_err();
        assert_eq!(err.kind(), "MissingVariableError");
        let msg = err.to_string();
        assert!(msg.contains("TF_VAR_orgId"));
        assert!(!msg.contains("secret-pk"));
    }

    #[test]
    fn test_run_with_echo_engine() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig {
            program: "echo".to_string(),
            ..EngineConfig::default()
        };
        let out = run(&cfg, EngineAction::Diff, dir.path(), &plan_with(&[])).unwrap();
        assert_eq!(out.stdout.trim(), "plan");
    }

    #[test]
    fn test_run_extra_args() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig {
            program: "echo".to_string(),
            extra_args: vec!["-auto-approve".to_string()],
            ..EngineConfig::default()
        };
        let out = run(&cfg, EngineAction::Apply, dir.path(), &plan_with(&[])).unwrap();
        assert_eq!(out.stdout.trim(), "apply -auto-approve");
    }

    #[test]
    fn test_run_engine_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig {
            program: "false".to_string(),
            ..EngineConfig::default()
        };
        let err = run(&cfg, EngineAction::Destroy, dir.path(), &plan_with(&[])).unwrap_err();
        assert_eq!(err.kind(), "EngineError");
    }

    #[test]
    fn test_run_refuses_unbound_variables() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig {
            program: "echo".to_string(),
            var_prefix: "STACKSYNTH_TEST_UNSET_".to_string(),
            extra_args: Vec::new(),
        };
        let err = run(&cfg, EngineAction::Apply, dir.path(), &plan_with(&["orgId"])).unwrap_err();
        assert_eq!(err.kind(), "MissingVariableError");
    }
}
