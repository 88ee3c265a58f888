//! Namespace-level dependency tracking for incremental schema compilation
//!
//! A [`DependencyGraph`] records which namespaces consulted which others
//! while compiling, and which files declared components into each namespace.
//! From a set of changed files it answers which namespaces, and therefore
//! which files, have to be recompiled. [`RebuildPlan`] strings those queries
//! together and derives the next graph generation.

pub mod dependency_graph;
pub mod incremental;

pub use dependency_graph::DependencyGraph;
pub use incremental::RebuildPlan;
