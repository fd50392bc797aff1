//! Error taxonomy for declaration, synthesis, output and engine delegation.
//!
//! Every variant is fatal to the phase it occurs in. Graph construction is
//! pure, so nothing here is retried.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// What kind of declaration a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Resource,
    Variable,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource => write!(f, "resource"),
            Self::Variable => write!(f, "variable"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{what} '{name}' is already declared in stack '{stack}'")]
    DuplicateName {
        stack: String,
        what: &'static str,
        name: String,
    },

    #[error("id '{id}' is already declared in {scope}")]
    DuplicateId { scope: String, id: String },

    #[error("'{from}' references unknown {kind} '{target}'")]
    UnknownReference {
        from: String,
        kind: RefKind,
        target: String,
    },

    #[error("dependency cycle detected: {}", format_cycle(.cycle))]
    CyclicDependency { cycle: Vec<String> },

    #[error("stack '{stack}' has already been synthesized")]
    AlreadySynthesized { stack: String },

    #[error("cannot serialize '{resource}.{field}': {reason}")]
    Serialization {
        resource: String,
        field: String,
        reason: String,
    },

    #[error(
        "provider '{provider}' rejected '{resource}' ({resource_type}): {}",
        .problems.join("; ")
    )]
    SchemaValidation {
        provider: String,
        resource: String,
        resource_type: String,
        problems: Vec<String>,
    },

    #[error("invalid {what} identifier '{name}' (expected [A-Za-z_][A-Za-z0-9_-]*)")]
    InvalidIdentifier { what: &'static str, name: String },

    #[error("{origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("plan for stack '{stack}' is inconsistent: {message}")]
    InvalidPlan { stack: String, message: String },

    #[error("{}: {message}", .path.display())]
    Output { path: PathBuf, message: String },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stack '{stack}' is missing environment values for: {}", .names.join(", "))]
    MissingVariables { stack: String, names: Vec<String> },

    #[error("engine '{program}' {detail}")]
    Engine { program: String, detail: String },
}

impl Error {
    /// Stable taxonomy name, printed by the CLI next to the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateName { .. } => "DuplicateNameError",
            Self::DuplicateId { .. } => "DuplicateIdError",
            Self::UnknownReference { .. } => "UnknownReferenceError",
            Self::CyclicDependency { .. } => "CyclicDependencyError",
            Self::AlreadySynthesized { .. } => "AlreadySynthesizedError",
            Self::Serialization { .. } => "SerializationError",
            Self::SchemaValidation { .. } => "SchemaValidationError",
            Self::InvalidIdentifier { .. } => "InvalidIdentifierError",
            Self::Parse { .. } => "ParseError",
            Self::InvalidPlan { .. } => "InvalidPlanError",
            Self::Output { .. } => "OutputError",
            Self::Io { .. } => "IoError",
            Self::MissingVariables { .. } => "MissingVariableError",
            Self::Engine { .. } => "EngineError",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn output(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::Output {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn parse(origin: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            origin: origin.into(),
            message: message.to_string(),
        }
    }
}

/// Render a cycle as `a -> b -> a`.
fn format_cycle(cycle: &[String]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(String::as_str).collect();
    if let Some(first) = cycle.first() {
        parts.push(first);
    }
    parts.join(" -> ")
}

pub type Result<T> = std::result::Result<T, Error>;
