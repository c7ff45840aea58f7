//! # Dependency Graph Executor
//!
//! Drives every node of a registry through its lifecycle.
//!
//! Node callbacks run as futures polled by the `init()`/`deinit()` call
//! itself; independent branches make progress concurrently without spawning.
//! Runtime state lives behind a mutex that is never held across an await.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::node::{Dependencies, NodeData, PartialInit};
use crate::registry::{NodeRegistry, NodeSpec};
use crate::topology::Topology;
use crate::{GraphError, GraphEvent, GraphState, NodeState, EVENT_CHANNEL_CAPACITY};

struct NodeSlot {
    state: NodeState,
    data: Option<NodeData>,
}

struct Runtime {
    state: GraphState,
    nodes: Vec<NodeSlot>,
    /// `init()` is still polling node callbacks.
    starting: bool,
}

enum Readiness {
    Ready,
    Waiting,
    DependencyFailed(usize),
}

type InitOutcome = (usize, std::thread::Result<anyhow::Result<NodeData>>);
type DeinitOutcome = (usize, std::thread::Result<anyhow::Result<()>>);

/// Lifecycle executor for one registry.
///
/// A graph runs once: `init()` from Pending, `deinit()` from Ready or
/// Failed, and a Stopped graph cannot be restarted.
pub struct DependencyGraph {
    nodes: Vec<NodeSpec>,
    index: HashMap<String, usize>,
    topology: Result<Topology, GraphError>,
    runtime: Mutex<Runtime>,
    events: broadcast::Sender<GraphEvent>,
}

impl DependencyGraph {
    /// Create a graph from a registry.
    ///
    /// The registry is validated here, but configuration errors are only
    /// reported by `init()`.
    #[must_use]
    pub fn new(registry: NodeRegistry) -> Self {
        let nodes = registry.into_nodes();
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), i))
            .collect();
        let topology = Topology::build(&nodes);
        let slots = nodes
            .iter()
            .map(|_| NodeSlot {
                state: NodeState::Pending,
                data: None,
            })
            .collect();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            nodes,
            index,
            topology,
            runtime: Mutex::new(Runtime {
                state: GraphState::Pending,
                nodes: slots,
                starting: false,
            }),
            events,
        }
    }

    /// Subscribe to state and error notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> GraphState {
        self.runtime.lock().state
    }

    #[must_use]
    pub fn node_state(&self, name: &str) -> Option<NodeState> {
        let idx = *self.index.get(name)?;
        Some(self.runtime.lock().nodes[idx].state)
    }

    /// Data of a node that initialized (or partially initialized) and has
    /// not been torn down yet.
    #[must_use]
    pub fn node_data(&self, name: &str) -> Option<NodeData> {
        let idx = *self.index.get(name)?;
        self.runtime.lock().nodes[idx].data.clone()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    /// Initialize every node in dependency order.
    ///
    /// Resolves once every node has settled. Fails with the first mandatory
    /// node error, or with the configuration error if the registry is
    /// invalid (before any node starts).
    pub async fn init(&self) -> Result<(), GraphError> {
        self.begin("init", &[GraphState::Pending], GraphState::Initializing)?;
        self.runtime.lock().starting = true;
        let result = self.run_init().await;
        self.runtime.lock().starting = false;
        result
    }

    async fn run_init(&self) -> Result<(), GraphError> {
        let topology = match &self.topology {
            Ok(topology) => topology,
            Err(e) => {
                error!(error = %e, "[Graph] Invalid node registry");
                self.report(None, e.clone());
                self.set_graph_state(GraphState::Failed);
                return Err(e.clone());
            }
        };

        info!(nodes = self.nodes.len(), "[Graph] Initializing nodes");

        let mut running: FuturesUnordered<BoxFuture<'static, InitOutcome>> =
            FuturesUnordered::new();
        let mut scheduled = vec![false; self.nodes.len()];
        let mut fatal: Option<GraphError> = None;

        self.check_ready();

        loop {
            if fatal.is_none() {
                for &idx in &topology.order {
                    if scheduled[idx] {
                        continue;
                    }
                    match self.readiness(topology, idx) {
                        Readiness::Waiting => {}
                        Readiness::Ready => {
                            scheduled[idx] = true;
                            running.push(self.launch_init(topology, idx));
                        }
                        Readiness::DependencyFailed(dep) => {
                            scheduled[idx] = true;
                            let err = GraphError::DependencyFailed {
                                node: self.nodes[idx].name.clone(),
                                dependency: self.nodes[dep].name.clone(),
                            };
                            if let Some(err) = self.fail_node(idx, None, err) {
                                fatal.get_or_insert(err);
                            }
                        }
                    }
                }
            }

            let Some((idx, outcome)) = running.next().await else {
                break;
            };

            match outcome {
                Ok(Ok(data)) => {
                    self.runtime.lock().nodes[idx].data = Some(data);
                    self.set_node_state(idx, NodeState::Ready);
                    self.check_ready();
                }
                Ok(Err(e)) => {
                    let (partial, e) = match e.downcast::<PartialInit>() {
                        Ok(partial) => {
                            let (data, e) = partial.into_parts();
                            (Some(data), e)
                        }
                        Err(e) => (None, e),
                    };
                    let err = GraphError::NodeInit {
                        node: self.nodes[idx].name.clone(),
                        message: format!("{e:#}"),
                    };
                    if let Some(err) = self.fail_node(idx, partial, err) {
                        fatal.get_or_insert(err);
                    }
                }
                Err(panic) => {
                    let err = GraphError::NodeInit {
                        node: self.nodes[idx].name.clone(),
                        message: panic_message(panic.as_ref()),
                    };
                    if let Some(err) = self.fail_node(idx, None, err) {
                        fatal.get_or_insert(err);
                    }
                }
            }
        }

        if let Some(err) = fatal {
            error!(error = %err, "[Graph] Initialization failed");
            return Err(err);
        }

        self.check_ready();
        info!("[Graph] All nodes settled");
        Ok(())
    }

    /// Tear down every node in reverse dependency order.
    ///
    /// Deinit failures are reported on the notification channel and never
    /// interrupt teardown. Only a state conflict is returned as an error.
    pub async fn deinit(&self) -> Result<(), GraphError> {
        self.begin(
            "deinit",
            &[GraphState::Ready, GraphState::Failed],
            GraphState::Deinitializing,
        )?;

        info!("[Graph] Deinitializing nodes");

        // Nodes that never produced data have nothing to tear down.
        let mut needs_teardown = vec![false; self.nodes.len()];
        for idx in 0..self.nodes.len() {
            let has_data = self.runtime.lock().nodes[idx].data.is_some();
            if has_data {
                needs_teardown[idx] = true;
            } else {
                self.set_node_state(idx, NodeState::Stopped);
            }
        }

        let dependents = match &self.topology {
            Ok(topology) => topology.dependents.clone(),
            Err(_) => vec![Vec::new(); self.nodes.len()],
        };

        let mut running: FuturesUnordered<BoxFuture<'static, DeinitOutcome>> =
            FuturesUnordered::new();

        loop {
            for idx in 0..self.nodes.len() {
                if !needs_teardown[idx] {
                    continue;
                }
                let unblocked = {
                    let runtime = self.runtime.lock();
                    dependents[idx]
                        .iter()
                        .all(|&d| runtime.nodes[d].state == NodeState::Stopped)
                };
                if unblocked {
                    needs_teardown[idx] = false;
                    running.push(self.launch_deinit(idx));
                }
            }

            let Some((idx, outcome)) = running.next().await else {
                break;
            };

            let message = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{e:#}")),
                Err(panic) => Some(panic_message(panic.as_ref())),
            };
            if let Some(message) = message {
                let err = GraphError::NodeDeinit {
                    node: self.nodes[idx].name.clone(),
                    message,
                };
                warn!(node = %self.nodes[idx].name, error = %err, "[Graph] Node deinit failed");
                self.report(Some(idx), err);
            }
            self.set_node_state(idx, NodeState::Stopped);
        }

        self.set_graph_state(GraphState::Stopped);
        info!("[Graph] All nodes stopped");
        Ok(())
    }

    fn begin(
        &self,
        operation: &'static str,
        allowed: &[GraphState],
        next: GraphState,
    ) -> Result<(), GraphError> {
        {
            let mut runtime = self.runtime.lock();
            if runtime.starting || !allowed.contains(&runtime.state) {
                return Err(GraphError::StateConflict {
                    operation,
                    actual: runtime.state,
                });
            }
            runtime.state = next;
        }
        debug!(state = %next, "[Graph] Graph state changed");
        let _ = self.events.send(GraphEvent::GraphState(next));
        Ok(())
    }

    fn readiness(&self, topology: &Topology, idx: usize) -> Readiness {
        let runtime = self.runtime.lock();
        let mut all_ready = true;
        for &dep in &topology.dependencies[idx] {
            match runtime.nodes[dep].state {
                NodeState::Ready => {}
                NodeState::Failed => return Readiness::DependencyFailed(dep),
                _ => all_ready = false,
            }
        }
        if all_ready {
            Readiness::Ready
        } else {
            Readiness::Waiting
        }
    }

    fn launch_init(&self, topology: &Topology, idx: usize) -> BoxFuture<'static, InitOutcome> {
        let mut dependencies = Dependencies::new();
        {
            let runtime = self.runtime.lock();
            for &dep in &topology.dependencies[idx] {
                if let Some(data) = &runtime.nodes[dep].data {
                    dependencies.insert(self.nodes[dep].name.clone(), data.clone());
                }
            }
        }

        self.set_node_state(idx, NodeState::Initializing);

        let lifecycle = self.nodes[idx].lifecycle.clone();
        async move {
            let outcome = AssertUnwindSafe(lifecycle.init(dependencies))
                .catch_unwind()
                .await;
            (idx, outcome)
        }
        .boxed()
    }

    fn launch_deinit(&self, idx: usize) -> BoxFuture<'static, DeinitOutcome> {
        let (data, state) = {
            let mut runtime = self.runtime.lock();
            let slot = &mut runtime.nodes[idx];
            (slot.data.take(), slot.state)
        };

        // Failed nodes with partial data go straight to Stopped afterwards.
        if state == NodeState::Ready {
            self.set_node_state(idx, NodeState::Deinitializing);
        }

        let lifecycle = self.nodes[idx].lifecycle.clone();
        async move {
            let outcome = match data {
                Some(data) => AssertUnwindSafe(lifecycle.deinit(data)).catch_unwind().await,
                None => Ok(Ok(())),
            };
            (idx, outcome)
        }
        .boxed()
    }

    /// Mark a node Failed and report it. Returns the error if the node is
    /// mandatory, i.e. if the graph failed.
    fn fail_node(
        &self,
        idx: usize,
        partial: Option<NodeData>,
        err: GraphError,
    ) -> Option<GraphError> {
        let node = &self.nodes[idx];
        self.runtime.lock().nodes[idx].data = partial;
        self.set_node_state(idx, NodeState::Failed);

        if node.mandatory {
            error!(node = %node.name, error = %err, "[Graph] Mandatory node failed");
        } else {
            warn!(node = %node.name, error = %err, "[Graph] Optional node failed");
        }
        self.report(Some(idx), err.clone());

        if !node.mandatory {
            return None;
        }
        if self.state() == GraphState::Initializing {
            self.set_graph_state(GraphState::Failed);
        }
        Some(err)
    }

    /// Move the graph to Ready once every mandatory node is Ready.
    fn check_ready(&self) {
        let ready = {
            let runtime = self.runtime.lock();
            runtime.state == GraphState::Initializing
                && self
                    .nodes
                    .iter()
                    .zip(&runtime.nodes)
                    .all(|(spec, slot)| !spec.mandatory || slot.state == NodeState::Ready)
        };
        if ready {
            self.set_graph_state(GraphState::Ready);
        }
    }

    fn set_node_state(&self, idx: usize, state: NodeState) {
        let previous = {
            let mut runtime = self.runtime.lock();
            std::mem::replace(&mut runtime.nodes[idx].state, state)
        };
        if previous == state {
            return;
        }

        let name = &self.nodes[idx].name;
        debug!(node = %name, from = %previous, to = %state, "[Graph] Node state changed");
        let _ = self.events.send(GraphEvent::NodeState {
            node: name.clone(),
            state,
        });
    }

    fn set_graph_state(&self, state: GraphState) {
        let previous = std::mem::replace(&mut self.runtime.lock().state, state);
        if previous == state {
            return;
        }

        info!(from = %previous, to = %state, "[Graph] Graph state changed");
        let _ = self.events.send(GraphEvent::GraphState(state));
    }

    fn report(&self, idx: Option<usize>, error: GraphError) {
        let node = idx.map(|i| self.nodes[i].name.clone());
        let _ = self.events.send(GraphEvent::Error { node, error });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
