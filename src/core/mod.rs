//! Core logic: values, registry, graph, synthesis, stack files and output.

pub mod digest;
pub mod error;
pub mod ident;
pub mod parser;
pub mod planner;
pub mod resolver;
pub mod stack;
pub mod state;
pub mod types;
pub mod variables;
