//! The inheritance graph between compilation units.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};

use protoforge_config::ProjectConfig;

/// Directed graph with an edge from each base unit to every unit deriving
/// from it.
#[derive(Debug, Clone, Default)]
pub struct UnitGraph {
    graph: DiGraph<String, ()>,
    nodes: BTreeMap<String, NodeIndex>,
    bases: BTreeMap<String, Vec<String>>,
    cycles: BTreeMap<String, Vec<String>>,
}

impl UnitGraph {
    /// Builds the graph from the configured units.
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self::from_bases(
            config
                .units
                .iter()
                .map(|(name, unit)| (name.clone(), unit.bases.clone())),
        )
    }

    /// Builds the graph from `(unit, declared bases)` pairs.
    ///
    /// Bases that are not themselves listed are kept in [`bases`](Self::bases)
    /// but get no edge.
    pub fn from_bases(units: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        let mut g = UnitGraph::default();
        for (name, bases) in units {
            let idx = g.graph.add_node(name.clone());
            g.nodes.insert(name.clone(), idx);
            g.bases.insert(name, bases);
        }

        let mut edges = Vec::new();
        for (unit, bases) in &g.bases {
            for base in bases {
                if let (Some(&from), Some(&to)) = (g.nodes.get(base), g.nodes.get(unit)) {
                    edges.push((from, to));
                }
            }
        }
        for (from, to) in edges {
            g.graph.add_edge(from, to, ());
        }

        for scc in kosaraju_scc(&g.graph) {
            let looped = scc.len() == 1 && g.graph.contains_edge(scc[0], scc[0]);
            if scc.len() > 1 || looped {
                let mut members: Vec<String> = scc.iter().map(|&i| g.graph[i].clone()).collect();
                members.sort();
                for member in &members {
                    g.cycles.insert(member.clone(), members.clone());
                }
            }
        }
        g
    }

    /// Returns `true` if `unit` is part of the graph.
    pub fn contains(&self, unit: &str) -> bool {
        self.nodes.contains_key(unit)
    }

    /// The declared bases of `unit`, in declaration order.
    pub fn bases(&self, unit: &str) -> &[String] {
        self.bases.get(unit).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The members of the cycle `unit` is on, if any.
    pub fn cycle_of(&self, unit: &str) -> Option<&[String]> {
        self.cycles.get(unit).map(Vec::as_slice)
    }

    /// Every unit that sits on a cycle.
    pub fn cyclic_units(&self) -> BTreeSet<String> {
        self.cycles.keys().cloned().collect()
    }

    /// Units deriving from `unit`, directly or transitively.
    pub fn descendants(&self, unit: &str) -> BTreeSet<String> {
        let Some(&start) = self.nodes.get(unit) else {
            return BTreeSet::new();
        };
        let mut found = BTreeSet::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(idx) = dfs.next(&self.graph) {
            if idx != start {
                found.insert(self.graph[idx].clone());
            }
        }
        found
    }

    /// Units `unit` derives from, directly or transitively.
    pub fn ancestors(&self, unit: &str) -> BTreeSet<String> {
        let Some(&start) = self.nodes.get(unit) else {
            return BTreeSet::new();
        };
        let reversed = Reversed(&self.graph);
        let mut found = BTreeSet::new();
        let mut dfs = Dfs::new(reversed, start);
        while let Some(idx) = dfs.next(reversed) {
            if idx != start {
                found.insert(self.graph[idx].clone());
            }
        }
        found
    }

    /// Groups units so every unit's bases appear in an earlier group.
    ///
    /// Units in one group can be resolved in parallel. Units that sit on or
    /// downstream of a cycle cannot be ordered; they are returned together in
    /// a final group, where resolving them reports the cycle.
    pub fn levels(&self) -> Vec<Vec<String>> {
        let mut levels: Vec<Vec<String>> = Vec::new();
        let mut placed: BTreeSet<&str> = BTreeSet::new();
        let mut remaining: BTreeSet<&str> = self.nodes.keys().map(String::as_str).collect();

        loop {
            let ready: Vec<&str> = remaining
                .iter()
                .copied()
                .filter(|unit| {
                    self.bases(unit)
                        .iter()
                        .all(|b| !self.contains(b) || placed.contains(b.as_str()))
                })
                .collect();
            if ready.is_empty() {
                break;
            }
            for &unit in &ready {
                remaining.remove(unit);
                placed.insert(unit);
            }
            levels.push(ready.into_iter().map(str::to_string).collect());
        }

        if !remaining.is_empty() {
            levels.push(remaining.into_iter().map(str::to_string).collect());
        }
        levels
    }
}
