//! Dependency graph of the crates in a release run
//!
//! Built on petgraph for ordering and cycle detection. Units own their resolved
//! local edges once the graph is built.

pub mod dependency_graph;

pub use dependency_graph::DependencyGraph;
