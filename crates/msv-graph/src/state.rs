//! Node and graph state machines.

use std::fmt;

/// Lifecycle state of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Registered, init not started.
    Pending,
    /// Init callback running.
    Initializing,
    /// Init succeeded; data available to dependents.
    Ready,
    /// Init failed, or a dependency failed.
    Failed,
    /// Deinit callback running.
    Deinitializing,
    /// Terminal.
    Stopped,
}

impl NodeState {
    /// Whether startup is finished with this node, one way or the other.
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::Stopped)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Deinitializing => "deinitializing",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate state of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphState {
    /// Created, `init()` not called yet.
    Pending,
    /// Startup in progress.
    Initializing,
    /// Every mandatory node is Ready.
    Ready,
    /// A mandatory node failed, or the registry is invalid.
    Failed,
    /// Teardown in progress.
    Deinitializing,
    /// Every node stopped. Not reusable.
    Stopped,
}

impl GraphState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Deinitializing => "deinitializing",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
