//! Registry validation and ordering.

use std::collections::HashMap;

use crate::registry::NodeSpec;
use crate::GraphError;

/// Resolved edges of a valid registry, by node index.
#[derive(Debug, Clone)]
pub(crate) struct Topology {
    /// Dependencies of each node.
    pub dependencies: Vec<Vec<usize>>,
    /// Dependents of each node.
    pub dependents: Vec<Vec<usize>>,
    /// Topological order; ties broken by registration order.
    pub order: Vec<usize>,
}

impl Topology {
    /// Validate `nodes` and compute the start order.
    ///
    /// Unknown dependencies are reported before cycles. A node depending on
    /// itself is a cycle of length one.
    pub fn build(nodes: &[NodeSpec]) -> Result<Self, GraphError> {
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.as_str(), i))
            .collect();

        let mut dependencies = Vec::with_capacity(nodes.len());
        for node in nodes {
            let mut resolved = Vec::with_capacity(node.dependencies.len());
            for dep in &node.dependencies {
                let Some(&i) = index.get(dep.as_str()) else {
                    return Err(GraphError::UnknownDependency {
                        node: node.name.clone(),
                        dependency: dep.clone(),
                    });
                };
                resolved.push(i);
            }
            dependencies.push(resolved);
        }

        if let Some(cycle) = find_cycle(&dependencies) {
            return Err(GraphError::Cycle(
                cycle.into_iter().map(|i| nodes[i].name.clone()).collect(),
            ));
        }

        let mut dependents = vec![Vec::new(); nodes.len()];
        for (i, deps) in dependencies.iter().enumerate() {
            for &d in deps {
                dependents[d].push(i);
            }
        }

        let order = topological_order(&dependencies, &dependents);

        Ok(Self {
            dependencies,
            dependents,
            order,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

/// Depth-first search for a cycle. Returns its members with the first node
/// repeated at the end, e.g. `[a, b, a]`.
fn find_cycle(dependencies: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; dependencies.len()];
    let mut path = Vec::new();

    for start in 0..dependencies.len() {
        if marks[start] == Mark::Unvisited {
            if let Some(cycle) = visit(start, dependencies, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit(
    node: usize,
    dependencies: &[Vec<usize>],
    marks: &mut [Mark],
    path: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    marks[node] = Mark::OnPath;
    path.push(node);

    for &dep in &dependencies[node] {
        match marks[dep] {
            Mark::OnPath => {
                let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(dep);
                return Some(cycle);
            }
            Mark::Unvisited => {
                if let Some(cycle) = visit(dep, dependencies, marks, path) {
                    return Some(cycle);
                }
            }
            Mark::Done => {}
        }
    }

    path.pop();
    marks[node] = Mark::Done;
    None
}

/// Kahn's algorithm, always picking the lowest registration index next.
fn topological_order(dependencies: &[Vec<usize>], dependents: &[Vec<usize>]) -> Vec<usize> {
    let mut remaining: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut ready: std::collections::BTreeSet<usize> = remaining
        .iter()
        .enumerate()
        .filter(|(_, &n)| n == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{node_data, FnLifecycle};

    fn spec(name: &str, deps: &[&str]) -> NodeSpec {
        deps.iter().fold(
            NodeSpec::new(name, FnLifecycle::new(|_| async { anyhow::Ok(node_data(())) })),
            |spec, dep| spec.depends_on(*dep),
        )
    }

    #[test]
    fn test_order_respects_dependencies() {
        let nodes = vec![
            spec("service:api", &["module:db", "bridge"]),
            spec("module:db", &[]),
            spec("bridge", &[]),
        ];
        let topology = Topology::build(&nodes).unwrap();
        assert_eq!(topology.order, vec![1, 2, 0]);
        assert_eq!(topology.dependents[2], vec![0]);
    }

    #[test]
    fn test_unknown_dependency() {
        let nodes = vec![spec("a", &["b", "ghost"]), spec("b", &["a"])];
        let err = Topology::build(&nodes).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownDependency {
                node: "a".to_string(),
                dependency: "ghost".to_string(),
            }
        );
    }

    #[test]
    fn test_cycle_names_participants() {
        let nodes = vec![
            spec("root", &[]),
            spec("a", &["b"]),
            spec("b", &["c"]),
            spec("c", &["a", "root"]),
        ];
        match Topology::build(&nodes).unwrap_err() {
            GraphError::Cycle(members) => assert_eq!(members, vec!["a", "b", "c", "a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let nodes = vec![spec("a", &["a"])];
        assert!(matches!(
            Topology::build(&nodes),
            Err(GraphError::Cycle(members)) if members == vec!["a", "a"]
        ));
    }
}
