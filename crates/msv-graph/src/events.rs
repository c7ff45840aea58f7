//! Executor notifications.

use crate::{GraphError, GraphState, NodeState};

/// Notification published by a `DependencyGraph`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// A node changed state.
    NodeState { node: String, state: NodeState },

    /// The aggregate state changed.
    GraphState(GraphState),

    /// A node failed to start or stop, or the registry is invalid
    /// (`node` is `None` for registry-wide errors).
    Error {
        node: Option<String>,
        error: GraphError,
    },
}
