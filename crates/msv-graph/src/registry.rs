//! # Node Registry
//!
//! Declarative description of every node to launch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::node::NodeLifecycle;
use crate::GraphError;

/// One node: name, dependencies, mandatory flag and lifecycle callbacks.
#[derive(Clone)]
pub struct NodeSpec {
    pub(crate) name: String,
    pub(crate) dependencies: Vec<String>,
    pub(crate) mandatory: bool,
    pub(crate) lifecycle: Arc<dyn NodeLifecycle>,
}

impl NodeSpec {
    /// Create an optional node with no dependencies.
    pub fn new(name: impl Into<String>, lifecycle: impl NodeLifecycle + 'static) -> Self {
        Self::from_shared(name, Arc::new(lifecycle))
    }

    pub fn from_shared(name: impl Into<String>, lifecycle: Arc<dyn NodeLifecycle>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            mandatory: false,
            lifecycle,
        }
    }

    /// Add a dependency. Repeated names are ignored.
    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
        self
    }

    /// Mark the node as mandatory: its failure fails the whole graph.
    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    #[must_use]
    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("mandatory", &self.mandatory)
            .finish_non_exhaustive()
    }
}

/// Ordered set of uniquely named nodes.
///
/// Registration order is the tie-breaker for scheduling, so graphs built
/// from the same registry always start nodes in the same order.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: Vec<NodeSpec>,
    index: HashMap<String, usize>,
}

impl NodeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::DuplicateNode` if the name is taken.
    pub fn register(&mut self, spec: NodeSpec) -> Result<(), GraphError> {
        if self.index.contains_key(&spec.name) {
            return Err(GraphError::DuplicateNode(spec.name));
        }
        self.index.insert(spec.name.clone(), self.nodes.len());
        self.nodes.push(spec);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NodeSpec> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn into_nodes(self) -> Vec<NodeSpec> {
        self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{node_data, FnLifecycle};

    fn noop() -> FnLifecycle {
        FnLifecycle::new(|_| async { anyhow::Ok(node_data(())) })
    }

    #[test]
    fn test_spec_builder() {
        let spec = NodeSpec::new("service:api", noop())
            .depends_on("bridge")
            .depends_on("module:db")
            .depends_on("bridge")
            .mandatory();

        assert_eq!(spec.name(), "service:api");
        assert_eq!(spec.dependencies(), ["bridge", "module:db"]);
        assert!(spec.is_mandatory());
        assert!(!NodeSpec::new("module:db", noop()).is_mandatory());
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = NodeRegistry::new();
        registry.register(NodeSpec::new("bridge", noop())).unwrap();

        let err = registry.register(NodeSpec::new("bridge", noop())).unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode("bridge".to_string()));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("bridge"));
    }
}
