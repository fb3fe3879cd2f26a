//! Variable dependency graph
//!
//! Orders variable definitions so that every variable is evaluated after the
//! variables it references. Anchors are not nodes: a reference to an anchor
//! is satisfied without an edge.

use crate::context::Anchors;
use crate::error::{BuildError, BuildResult};
use indexmap::IndexMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Names and their references, in authoring order
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: IndexMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with the names it references
    ///
    /// Fails if the name was already added.
    pub fn add(&mut self, name: impl Into<String>, references: Vec<String>) -> BuildResult<()> {
        let name = name.into();
        if self.nodes.contains_key(&name) {
            return Err(BuildError::DuplicateName { name });
        }
        self.nodes.insert(name, references);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Compute an evaluation order
    ///
    /// Kahn's algorithm; among the nodes ready at any step, the one added
    /// first goes first, so independent variables keep authoring order.
    pub fn build(&self, anchors: &Anchors) -> BuildResult<Vec<String>> {
        let count = self.nodes.len();
        let mut in_degree = vec![0usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];

        for (index, (name, references)) in self.nodes.iter().enumerate() {
            for reference in references {
                if anchors.contains(reference) {
                    continue;
                }
                let Some(target) = self.nodes.get_index_of(reference) else {
                    return Err(BuildError::UnknownReference {
                        variable: name.clone(),
                        reference: reference.clone(),
                    });
                };
                // A repeated reference adds one edge per mention, so the
                // matching decrements below stay balanced.
                in_degree[index] += 1;
                dependents[target].push(index);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(index, _)| Reverse(index))
            .collect();
        let mut order = Vec::with_capacity(count);

        while let Some(Reverse(index)) = ready.pop() {
            order.push(index);
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() < count {
            return Err(BuildError::CyclicDependency {
                cycle: self.find_cycle(anchors, &in_degree),
            });
        }

        let order: Vec<String> = order
            .into_iter()
            .filter_map(|index| self.nodes.get_index(index).map(|(name, _)| name.clone()))
            .collect();
        log::debug!("Dependency order: {}", order.join(", "));
        Ok(order)
    }

    /// Path of one cycle among the nodes Kahn's algorithm could not order
    fn find_cycle(&self, anchors: &Anchors, in_degree: &[usize]) -> Vec<String> {
        let stuck: Vec<usize> = (0..self.nodes.len()).filter(|&i| in_degree[i] > 0).collect();
        let Some(&start) = stuck.first() else {
            return Vec::new();
        };

        // Every stuck node has at least one stuck reference; following them
        // from any stuck node must revisit a node.
        let mut path: Vec<usize> = vec![start];
        let mut current = start;
        loop {
            let next = self.nodes[current]
                .iter()
                .filter(|reference| !anchors.contains(reference))
                .filter_map(|reference| self.nodes.get_index_of(reference.as_str()))
                .find(|&target| in_degree[target] > 0);
            let Some(next) = next else {
                break;
            };
            if let Some(position) = path.iter().position(|&seen| seen == next) {
                let mut cycle: Vec<String> = path[position..]
                    .iter()
                    .filter_map(|&i| self.nodes.get_index(i).map(|(name, _)| name.clone()))
                    .collect();
                if let Some(first) = cycle.first().cloned() {
                    cycle.push(first);
                }
                return cycle;
            }
            path.push(next);
            current = next;
        }

        stuck
            .iter()
            .filter_map(|&i| self.nodes.get_index(i).map(|(name, _)| name.clone()))
            .collect()
    }
}
