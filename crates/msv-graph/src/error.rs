//! # Error Types

use thiserror::Error;

use crate::GraphState;

/// Errors reported by the registry and the executor.
///
/// Node failures are also published on the notification channel, so the
/// type is `Clone`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The dependency relation contains a cycle.
    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// A node depends on a name that is not registered.
    #[error("Node \"{node}\" depends on unknown node \"{dependency}\"")]
    UnknownDependency { node: String, dependency: String },

    /// Two nodes share a name.
    #[error("Node \"{0}\" is already registered")]
    DuplicateNode(String),

    /// A node's init callback failed or panicked.
    #[error("Node \"{node}\" failed to initialize: {message}")]
    NodeInit { node: String, message: String },

    /// A node's deinit callback failed or panicked.
    #[error("Node \"{node}\" failed to deinitialize: {message}")]
    NodeDeinit { node: String, message: String },

    /// A node was not started because a dependency failed.
    #[error("Node \"{node}\" not started: dependency \"{dependency}\" failed")]
    DependencyFailed { node: String, dependency: String },

    /// `init()` or `deinit()` called in the wrong graph state.
    #[error("Cannot {operation} graph in state {actual}")]
    StateConflict {
        operation: &'static str,
        actual: GraphState,
    },
}

impl GraphError {
    /// Whether the error comes from an invalid registry rather than a node.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Cycle(_) | Self::UnknownDependency { .. } | Self::DuplicateNode(_)
        )
    }

    /// The node the error is about, if any.
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::NodeInit { node, .. }
            | Self::NodeDeinit { node, .. }
            | Self::DependencyFailed { node, .. }
            | Self::UnknownDependency { node, .. }
            | Self::DuplicateNode(node) => Some(node.as_str()),
            Self::Cycle(_) | Self::StateConflict { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = GraphError::Cycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
        assert!(err.is_configuration());
        assert_eq!(err.node(), None);
    }

    #[test]
    fn test_node_errors() {
        let err = GraphError::NodeInit {
            node: "module:db".into(),
            message: "connection refused".into(),
        };
        assert!(!err.is_configuration());
        assert_eq!(err.node(), Some("module:db"));
        assert!(err.to_string().contains("connection refused"));
    }
}
