//! Local dependency graph of the crates taking part in a release
//!
//! ## Graph Structure
//!
//! - **Directed Graph**: `A → B` means "A depends on B"
//! - **Nodes**: workspace crates in the run (excluded crates are not nodes)
//! - **Edges**: dependencies from any scope (normal/dev/build, any target)
//! - **Order**: units are enumerated dependencies first, by depth then name
//!
//! Cycles are rejected when the graph is built.

use crate::core::error::{ReleaseError, RelayError, RelayResult};
use crate::release::unit::{Unit, UnitId, UnitSpec};
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;

/// The units of one release run and the edges between them
pub struct DependencyGraph {
  /// Units in enumeration order; a unit's id is its index here
  units: Vec<Arc<Unit>>,

  /// Longest dependency chain below each unit, in edges
  depths: Vec<usize>,
}

impl DependencyGraph {
  /// Build the graph from loaded crates.
  ///
  /// Dependency names that do not match a loaded crate are external and ignored.
  pub fn build(mut specs: Vec<UnitSpec>) -> RelayResult<Self> {
    specs.sort_by(|a, b| a.name.cmp(&b.name));

    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let mut name_to_node: HashMap<&str, NodeIndex> = HashMap::new();
    for (i, spec) in specs.iter().enumerate() {
      name_to_node.insert(spec.name.as_str(), graph.add_node(i));
    }

    for (i, spec) in specs.iter().enumerate() {
      let from = NodeIndex::new(i);
      for dep in spec.requirements.keys() {
        if let Some(&to) = name_to_node.get(dep.as_str())
          && to != from
        {
          graph.update_edge(from, to, ());
        }
      }
    }

    // toposort lists dependents before their dependencies
    let topo = algo::toposort(&graph, None).map_err(|_| cycle_error(&graph, &specs))?;

    let mut depth = vec![0usize; specs.len()];
    for node in topo.iter().rev() {
      depth[node.index()] = graph
        .neighbors(*node)
        .map(|dep| depth[dep.index()] + 1)
        .max()
        .unwrap_or(0);
    }

    let mut order: Vec<usize> = (0..specs.len()).collect();
    order.sort_by(|&a, &b| depth[a].cmp(&depth[b]).then_with(|| specs[a].name.cmp(&specs[b].name)));

    let mut new_id = vec![0usize; specs.len()];
    for (id, &old) in order.iter().enumerate() {
      new_id[old] = id;
    }

    let mut edges: Vec<Vec<UnitId>> = vec![Vec::new(); specs.len()];
    for edge in graph.raw_edges() {
      let from = new_id[edge.source().index()];
      let to = new_id[edge.target().index()];
      edges[from].push(to);
    }
    for list in edges.iter_mut() {
      list.sort_unstable();
    }

    let mut slots: Vec<Option<UnitSpec>> = specs.into_iter().map(Some).collect();
    let mut units = Vec::with_capacity(slots.len());
    let mut depths = Vec::with_capacity(slots.len());
    for (id, &old) in order.iter().enumerate() {
      let spec = slots[old]
        .take()
        .ok_or_else(|| RelayError::message("Crate listed twice while building the dependency graph"))?;
      units.push(Arc::new(Unit::new(id, spec, std::mem::take(&mut edges[id]))));
      depths.push(depth[old]);
    }

    Ok(Self { units, depths })
  }

  pub fn units(&self) -> &[Arc<Unit>] {
    &self.units
  }

  pub fn unit(&self, id: UnitId) -> &Arc<Unit> {
    &self.units[id]
  }

  pub fn find(&self, name: &str) -> Option<&Arc<Unit>> {
    self.units.iter().find(|u| u.name == name)
  }

  pub fn len(&self) -> usize {
    self.units.len()
  }

  pub fn is_empty(&self) -> bool {
    self.units.is_empty()
  }

  /// Longest dependency chain in the graph, in edges
  pub fn depth(&self) -> usize {
    self.depths.iter().copied().max().unwrap_or(0)
  }
}

fn cycle_error(graph: &DiGraph<usize, ()>, specs: &[UnitSpec]) -> RelayError {
  let mut cycles: Vec<Vec<String>> = algo::tarjan_scc(graph)
    .into_iter()
    .filter(|scc| scc.len() > 1)
    .map(|scc| {
      let mut names: Vec<String> = scc.iter().map(|n| specs[graph[*n]].name.clone()).collect();
      names.sort();
      if let Some(first) = names.first().cloned() {
        names.push(first);
      }
      names
    })
    .collect();
  cycles.sort();

  RelayError::Release(ReleaseError::DependencyCycle {
    units: cycles.into_iter().next().unwrap_or_default(),
  })
}
