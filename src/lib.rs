//! stacksynth: declarative infrastructure stacks compiled to plans.
//!
//! Resources are declared against an explicit graph builder, cross-resource
//! reads become symbolic references, and each stack synthesizes into a
//! deterministic JSON plan that an external engine applies.

pub mod cli;
pub mod core;
pub mod engine;
pub mod provider;
