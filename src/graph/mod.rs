//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Per-project dependency graph over Spec names
//!
//! Nodes are stored in a flat vector and referenced by index; each node
//! keeps parallel index sets for its dependencies and dependents.

use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::spec::Spec;
use crate::unit::UnitKind;

#[derive(Debug)]
struct Node {
    name: String,
    kind: UnitKind,
    /// Out-edges: what this node depends on.
    deps: BTreeSet<usize>,
    /// In-edges: what depends on this node.
    dependents: BTreeSet<usize>,
}

#[derive(Debug)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl DependencyGraph {
    /// Build the graph for one project's Spec set.
    ///
    /// Unknown dependency targets and cycles are the two build-time
    /// failures; everything else about the Specs is already validated.
    pub fn from_specs(specs: &[Spec]) -> Result<Self> {
        let mut graph = Self {
            nodes: Vec::with_capacity(specs.len()),
            index: HashMap::with_capacity(specs.len()),
        };

        for spec in specs {
            graph.index.insert(spec.name.clone(), graph.nodes.len());
            graph.nodes.push(Node {
                name: spec.name.clone(),
                kind: spec.kind(),
                deps: BTreeSet::new(),
                dependents: BTreeSet::new(),
            });
        }

        for spec in specs {
            let from = graph.index[&spec.name];
            for dep in &spec.depends_on {
                let to = *graph.index.get(&dep.name).ok_or_else(|| {
                    Error::Validation(format!(
                        "'{}' depends on unknown target '{}'",
                        spec.name, dep.name
                    ))
                })?;
                graph.nodes[from].deps.insert(to);
                graph.nodes[to].dependents.insert(from);
            }
        }

        if let Some(cycle) = graph.find_cycle() {
            return Err(Error::Cycle { nodes: cycle });
        }

        Ok(graph)
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

    pub fn kind_of(&self, name: &str) -> Option<UnitKind> {
        self.index.get(name).map(|&i| self.nodes[i].kind)
    }

    /// Nodes with an edge into `name`; what must stop before `name` stops.
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        let Some(&i) = self.index.get(name) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = self.nodes[i]
            .dependents
            .iter()
            .map(|&d| self.nodes[d].name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Dependency-first linear order (Kahn), ties broken by name.
    pub fn topo_order(&self) -> Vec<String> {
        let mut remaining: Vec<usize> = self.nodes.iter().map(|n| n.deps.len()).collect();
        let mut ready: BTreeSet<(&str, usize)> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.deps.is_empty())
            .map(|(i, n)| (n.name.as_str(), i))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(&(name, i)) = ready.iter().next() {
            ready.remove(&(name, i));
            order.push(name.to_string());

            for &dependent in &self.nodes[i].dependents {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.insert((self.nodes[dependent].name.as_str(), dependent));
                }
            }
        }

        debug_assert_eq!(order.len(), self.nodes.len());
        order
    }

    /// Dependents-first order; the safe stop sequence.
    pub fn reverse_topo_order(&self) -> Vec<String> {
        let mut order = self.topo_order();
        order.reverse();
        order
    }

    /// Iterative white/grey/black DFS. Returns the names forming the
    /// first cycle found, in edge order.
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Grey,
            Black,
        }

        let n = self.nodes.len();
        let adjacency: Vec<Vec<usize>> = self
            .nodes
            .iter()
            .map(|node| node.deps.iter().copied().collect())
            .collect();
        let mut color = vec![Color::White; n];
        let mut parent = vec![usize::MAX; n];

        for start in 0..n {
            if color[start] != Color::White {
                continue;
            }
            color[start] = Color::Grey;
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

            while let Some(&(node, next)) = stack.last() {
                if next < adjacency[node].len() {
                    stack.last_mut().unwrap().1 += 1;
                    let child = adjacency[node][next];
                    match color[child] {
                        Color::White => {
                            color[child] = Color::Grey;
                            parent[child] = node;
                            stack.push((child, 0));
                        }
                        Color::Grey => {
                            // Walk back from the current node to the grey
                            // child to recover the cycle members
                            let mut path = vec![node];
                            let mut current = node;
                            while current != child {
                                current = parent[current];
                                path.push(current);
                            }
                            path.reverse();
                            return Some(
                                path.into_iter()
                                    .map(|i| self.nodes[i].name.clone())
                                    .collect(),
                            );
                        }
                        Color::Black => {}
                    }
                } else {
                    color[node] = Color::Black;
                    stack.pop();
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{ContainerSpec, Resource, UnitRef};
    use std::collections::BTreeMap;

    fn container(name: &str, deps: &[&str]) -> Spec {
        Spec {
            name: name.to_string(),
            project: "proj".to_string(),
            resource: Resource::Container(ContainerSpec {
                image: Some("img".into()),
                ..Default::default()
            }),
            depends_on: deps
                .iter()
                .map(|d| UnitRef {
                    name: d.to_string(),
                    kind: UnitKind::Container,
                })
                .collect(),
            external_dependencies: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }

    #[test]
    fn topo_order_is_a_linear_extension() {
        let specs = vec![
            container("proj-web", &["proj-db", "proj-cache"]),
            container("proj-db", &[]),
            container("proj-cache", &["proj-db"]),
        ];
        let graph = DependencyGraph::from_specs(&specs).unwrap();
        assert_eq!(graph.len(), 3);
        assert!(!graph.is_empty());
        assert!(graph.contains("proj-db"));

        let order = graph.topo_order();
        assert_eq!(order, vec!["proj-db", "proj-cache", "proj-web"]);

        let reverse = graph.reverse_topo_order();
        assert_eq!(reverse, vec!["proj-web", "proj-cache", "proj-db"]);
    }

    #[test]
    fn ties_break_lexicographically() {
        let specs = vec![
            container("proj-c", &[]),
            container("proj-a", &[]),
            container("proj-b", &[]),
        ];
        let graph = DependencyGraph::from_specs(&specs).unwrap();
        assert_eq!(graph.topo_order(), vec!["proj-a", "proj-b", "proj-c"]);
    }

    #[test]
    fn cycle_reports_exactly_its_members() {
        let specs = vec![
            container("proj-a", &["proj-b"]),
            container("proj-b", &["proj-c"]),
            container("proj-c", &["proj-a"]),
            container("proj-ok", &[]),
        ];
        let err = DependencyGraph::from_specs(&specs).unwrap_err();
        assert!(err.is_cycle_error());

        let Error::Cycle { nodes } = err else {
            unreachable!()
        };
        let mut sorted = nodes.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["proj-a", "proj-b", "proj-c"]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let specs = vec![container("proj-a", &["proj-a"])];
        let err = DependencyGraph::from_specs(&specs).unwrap_err();
        let Error::Cycle { nodes } = err else {
            unreachable!()
        };
        assert_eq!(nodes, vec!["proj-a"]);
    }

    #[test]
    fn unknown_target_is_rejected() {
        let specs = vec![container("proj-web", &["proj-ghost"])];
        let err = DependencyGraph::from_specs(&specs).unwrap_err();
        assert!(err.is_validation_error());
        assert!(err.to_string().contains("proj-ghost"));
    }

    #[test]
    fn dependents_are_reverse_edges() {
        let specs = vec![
            container("proj-web", &["proj-db"]),
            container("proj-worker", &["proj-db"]),
            container("proj-db", &[]),
        ];
        let graph = DependencyGraph::from_specs(&specs).unwrap();
        assert_eq!(graph.dependents("proj-db"), vec!["proj-web", "proj-worker"]);
        assert!(graph.dependents("proj-web").is_empty());
        assert!(graph.dependents("missing").is_empty());
    }

    #[test]
    fn build_nodes_precede_their_service() {
        let mut api = container("proj-api", &["proj-api-build"]);
        api.depends_on[0].kind = UnitKind::Build;

        let build = Spec {
            name: "proj-api-build".to_string(),
            project: "proj".to_string(),
            resource: Resource::Build(crate::spec::BuildSpec {
                context: ".".into(),
                dockerfile: "Dockerfile".into(),
                args: BTreeMap::new(),
                image_tag: "localhost/proj-api:latest".into(),
            }),
            depends_on: Vec::new(),
            external_dependencies: Vec::new(),
            annotations: BTreeMap::new(),
        };

        let graph = DependencyGraph::from_specs(&[build, api]).unwrap();
        let order = graph.topo_order();
        let build_pos = order.iter().position(|n| n == "proj-api-build").unwrap();
        let api_pos = order.iter().position(|n| n == "proj-api").unwrap();
        assert!(build_pos < api_pos);
        assert_eq!(graph.kind_of("proj-api-build"), Some(UnitKind::Build));
    }
}
