//! # Scheduler
//!
//! Dependency graph of the simulation components.
//! Each node is a named component and an edge `a -> b` means that `b` consumes an output of `a`,
//! so `a` must be triggered before `b` within a time step.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SchedulerError {
    #[error("dependency cycle between {0:?}")]
    Cycle(Vec<String>),
    #[error("unknown node {0}")]
    UnknownNode(String),
    #[error("node {0} already exists")]
    Duplicate(String),
}

/// Directed acyclic graph of named nodes
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<String>,
    index: BTreeMap<String, usize>,
    children: Vec<BTreeSet<usize>>,
}
impl Graph {
    pub fn new() -> Self {
        Default::default()
    }
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
    /// Adds a node to the graph
    pub fn add_node<S: Into<String>>(&mut self, name: S) -> Result<&mut Self, SchedulerError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(SchedulerError::Duplicate(name));
        }
        self.index.insert(name.clone(), self.nodes.len());
        self.nodes.push(name);
        self.children.push(BTreeSet::new());
        Ok(self)
    }
    fn id(&self, name: &str) -> Result<usize, SchedulerError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| SchedulerError::UnknownNode(name.to_string()))
    }
    /// Adds the dependency `producer -> consumer`
    pub fn add_edge(&mut self, producer: &str, consumer: &str) -> Result<&mut Self, SchedulerError> {
        let (p, c) = (self.id(producer)?, self.id(consumer)?);
        self.children[p].insert(c);
        Ok(self)
    }
    /// Nodes that consume the outputs of `name`
    pub fn consumers(&self, name: &str) -> Result<Vec<&str>, SchedulerError> {
        let id = self.id(name)?;
        Ok(self.children[id]
            .iter()
            .map(|&c| self.nodes[c].as_str())
            .collect())
    }
    /// Order in which the nodes must be triggered
    ///
    /// The order is deterministic: among the nodes ready at the same time, the one added first
    /// to the graph comes first.
    pub fn topological_order(&self) -> Result<Vec<String>, SchedulerError> {
        let mut indegree = vec![0usize; self.nodes.len()];
        self.children
            .iter()
            .flatten()
            .for_each(|&c| indegree[c] += 1);
        let mut ready: BTreeSet<usize> = indegree
            .iter()
            .enumerate()
            .filter_map(|(id, &deg)| if deg == 0 { Some(id) } else { None })
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for &c in &self.children[id] {
                indegree[c] -= 1;
                if indegree[c] == 0 {
                    ready.insert(c);
                }
            }
        }
        if order.len() < self.nodes.len() {
            let cycle = indegree
                .iter()
                .enumerate()
                .filter(|(_, &deg)| deg > 0)
                .map(|(id, _)| self.nodes[id].clone())
                .collect();
            return Err(SchedulerError::Cycle(cycle));
        }
        Ok(order.into_iter().map(|id| self.nodes[id].clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producers_first() {
        let mut graph = Graph::new();
        for name in ["ngs_pyramid", "propagation", "atmosphere", "lgs_sh"] {
            graph.add_node(name).unwrap();
        }
        graph
            .add_edge("atmosphere", "propagation")
            .unwrap()
            .add_edge("propagation", "ngs_pyramid")
            .unwrap()
            .add_edge("propagation", "lgs_sh")
            .unwrap();
        assert_eq!(
            graph.topological_order().unwrap(),
            vec!["atmosphere", "propagation", "ngs_pyramid", "lgs_sh"]
        );
        assert_eq!(
            graph.consumers("propagation").unwrap(),
            vec!["ngs_pyramid", "lgs_sh"]
        );
    }

    #[test]
    fn cycle() {
        let mut graph = Graph::new();
        graph.add_node("a").unwrap().add_node("b").unwrap().add_node("c").unwrap();
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("b", "c").unwrap();
        graph.add_edge("c", "b").unwrap();
        assert_eq!(
            graph.topological_order(),
            Err(SchedulerError::Cycle(vec!["b".to_string(), "c".to_string()]))
        );
    }

    #[test]
    fn invalid_edits() {
        let mut graph = Graph::new();
        graph.add_node("a").unwrap();
        assert_eq!(
            graph.add_node("a").err(),
            Some(SchedulerError::Duplicate("a".to_string()))
        );
        assert_eq!(
            graph.add_edge("a", "z").err(),
            Some(SchedulerError::UnknownNode("z".to_string()))
        );
    }
}
