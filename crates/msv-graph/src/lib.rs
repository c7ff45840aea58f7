//! # MSV Graph - Dependency-Ordered Lifecycle Executor
//!
//! Brings a set of named, interdependent nodes up in dependency order and
//! tears them down in reverse, tolerating failures of optional nodes.
//!
//! ## Lifecycle
//!
//! ```text
//!   Pending ──► Initializing ──► Ready ──► Deinitializing ──► Stopped
//!                    │                                          ▲
//!                    └──────────► Failed ───────────────────────┘
//! ```
//!
//! ## Scheduling
//!
//! ```text
//!            ┌──────────┐
//!            │  bridge  │            level 0: starts immediately
//!            └────┬─────┘
//!        ┌────────┴────────┐
//!   ┌────▼─────┐     ┌─────▼────┐
//!   │ module:a │     │ module:b │    level 1: concurrent
//!   └────┬─────┘     └─────┬────┘
//!        └────────┬────────┘
//!          ┌──────▼──────┐
//!          │ service:api │           level 2: sees Ready deps only
//!          └─────────────┘
//! ```
//!
//! - A node starts as soon as every dependency is Ready.
//! - A failed mandatory node fails the graph: nodes already initializing
//!   finish, nothing new starts, and `init()` returns the error.
//! - A failed optional node fails its dependents without running them.
//! - Teardown deinitializes a node only after all of its dependents stopped.
//!
//! Unknown dependencies and cycles are rejected before any node initializes.

mod error;
mod events;
mod executor;
mod node;
mod registry;
mod state;
mod topology;

pub use error::GraphError;
pub use events::GraphEvent;
pub use executor::DependencyGraph;
pub use node::{node_data, Dependencies, FnLifecycle, NodeData, NodeLifecycle, PartialInit};
pub use registry::{NodeRegistry, NodeSpec};
pub use state::{GraphState, NodeState};

/// Capacity of the notification channel returned by `DependencyGraph::subscribe`.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
