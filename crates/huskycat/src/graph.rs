//! Tool dependency graph and level scheduling.
//!
//! Edges express "upstream must have completed successfully before downstream
//! may run". The graph is validated at construction; a cycle is a
//! configuration error, not a runtime condition.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("dependency cycle detected among tools: {0}")]
    Cycle(String),
}

/// A single schedulable level: tools with no ordering constraint among them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Level {
    pub level: usize,
    pub tools: Vec<String>,
}

/// Scheduling statistics derived from the level structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStats {
    pub tool_count: usize,
    pub level_count: usize,
    /// Size of the largest level.
    pub max_parallelism: usize,
    pub avg_level_size: f64,
    /// tool_count / level_count; the best case over a serial schedule.
    pub theoretical_speedup: f64,
}

/// Directed acyclic graph over tool names, with a topological level schedule.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// tool -> upstreams, restricted to tools in the run set.
    upstreams: BTreeMap<String, BTreeSet<String>>,
    levels: Vec<Level>,
}

impl DependencyGraph {
    /// Build the graph for `tools`, taking edges from `dependencies`.
    ///
    /// Dependencies naming tools outside the run set are dropped: an absent
    /// upstream constrains nothing.
    pub fn new(
        tools: &BTreeSet<String>,
        dependencies: &BTreeMap<String, Vec<String>>,
    ) -> Result<Self, GraphError> {
        let mut upstreams: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for tool in tools {
            let deps = dependencies
                .get(tool)
                .map(|d| {
                    d.iter()
                        .filter(|u| tools.contains(*u) && *u != tool)
                        .cloned()
                        .collect::<BTreeSet<String>>()
                })
                .unwrap_or_default();
            upstreams.insert(tool.clone(), deps);
        }

        let levels = topological_levels(&upstreams)?;
        Ok(Self { upstreams, levels })
    }

    /// Ordered level schedule: level 0 has no prerequisites, level k+1 only
    /// prerequisites in levels <= k.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Direct upstreams of one tool.
    pub fn upstreams_of(&self, tool: &str) -> &BTreeSet<String> {
        static EMPTY: BTreeSet<String> = BTreeSet::new();
        self.upstreams.get(tool).unwrap_or(&EMPTY)
    }

    pub fn tool_count(&self) -> usize {
        self.upstreams.len()
    }

    pub fn stats(&self) -> GraphStats {
        let tool_count = self.tool_count();
        let level_count = self.levels.len();
        let max_parallelism = self.levels.iter().map(|l| l.tools.len()).max().unwrap_or(0);
        let avg_level_size = if level_count == 0 {
            0.0
        } else {
            tool_count as f64 / level_count as f64
        };
        let theoretical_speedup = if level_count == 0 {
            1.0
        } else {
            tool_count as f64 / level_count as f64
        };
        GraphStats {
            tool_count,
            level_count,
            max_parallelism,
            avg_level_size,
            theoretical_speedup,
        }
    }
}

/// Kahn's algorithm grouped into levels. Deterministic within a level
/// (name order).
fn topological_levels(
    upstreams: &BTreeMap<String, BTreeSet<String>>,
) -> Result<Vec<Level>, GraphError> {
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for (tool, deps) in upstreams {
        indegree.entry(tool.as_str()).or_insert(0);
        for dep in deps {
            *indegree.entry(tool.as_str()).or_insert(0) += 1;
            dependents
                .entry(dep.as_str())
                .or_default()
                .insert(tool.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|&(_, deg)| *deg == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut levels: Vec<Level> = Vec::new();
    let mut placed = 0usize;

    while !ready.is_empty() {
        let current: Vec<&str> = ready.iter().copied().collect();
        ready.clear();

        for name in &current {
            placed += 1;
            if let Some(downs) = dependents.get(name) {
                for down in downs {
                    let deg = indegree
                        .get_mut(down)
                        .expect("dependent must have an indegree entry");
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(down);
                    }
                }
            }
        }

        levels.push(Level {
            level: levels.len(),
            tools: current.iter().map(|s| s.to_string()).collect(),
        });
    }

    if placed != upstreams.len() {
        let stuck: Vec<&str> = indegree
            .iter()
            .filter(|&(_, deg)| *deg > 0)
            .map(|(name, _)| *name)
            .collect();
        return Err(GraphError::Cycle(stuck.join(", ")));
    }

    Ok(levels)
}
