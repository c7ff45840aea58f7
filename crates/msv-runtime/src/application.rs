//! # Application
//!
//! Wires one bridge, any number of services and any number of modules into
//! a single dependency graph and drives it.
//!
//! ## Configuration Scoping
//!
//! ```text
//!   common ──┬── merge(app)              → application (bridge type, log level)
//!            ├── merge(bridge.<type>)    → bridge factory
//!            ├── merge(service.<name>)   → each service
//!            └── merge(module.<name>)    → each module
//! ```
//!
//! Each component also gets a logger tagged `Bridge:<type>`,
//! `Service:<name>` or `Module:<name>`, with the level taken from its
//! effective configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use msv_bridge::{
    local_bridge, BridgeError, BridgeFactory, BridgeHandle, EventOptions, Payload, TaskOptions,
    LOCAL_BRIDGE,
};
use msv_config::Config;
use msv_graph::{DependencyGraph, GraphEvent, GraphState, NodeRegistry, NodeSpec, NodeState};
use msv_telemetry::{LogLevel, Logger};
use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::module::{Module, ModuleDescription, ModuleRef, MODULE_PREFIX};
use crate::nodes::{BridgeNode, LiveModules, LiveServices, ModuleNode, Scope, ServiceNode, BRIDGE_NODE};
use crate::service::{Service, ServiceDescription, SERVICE_PREFIX};
use crate::ApplicationError;

/// Log level applied when neither `common` nor `app` sets one.
pub const DEFAULT_LOG_LEVEL: u64 = 4;

/// Read `log_level` (number or name) from a scoped configuration.
#[must_use]
pub fn log_level(config: &Config) -> Option<LogLevel> {
    config.get_str("log_level").and_then(|raw| LogLevel::parse(&raw))
}

/// Everything an `Application` is built from.
pub struct ApplicationOptions {
    config: Config,
    logger: Option<Logger>,
    bridges: BTreeMap<String, BridgeFactory>,
    services: Vec<(String, ServiceDescription)>,
    modules: Vec<(String, ModuleDescription)>,
    shadow_mode: bool,
}

impl ApplicationOptions {
    /// Options with the basic configuration and the local bridge registered.
    #[must_use]
    pub fn new() -> Self {
        let mut bridges = BTreeMap::new();
        bridges.insert(LOCAL_BRIDGE.to_string(), local_bridge());
        Self {
            config: Config::basic(),
            logger: None,
            bridges,
            services: Vec::new(),
            modules: Vec::new(),
            shadow_mode: false,
        }
    }

    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use `logger` as the root logger instead of one built from config.
    #[must_use]
    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Register a bridge factory under a type name selectable by `app.bridge`.
    #[must_use]
    pub fn bridge(mut self, bridge_type: impl Into<String>, factory: BridgeFactory) -> Self {
        self.bridges.insert(bridge_type.into(), factory);
        self
    }

    /// Add a service. A later service with the same name replaces it.
    #[must_use]
    pub fn service(mut self, name: impl Into<String>, description: ServiceDescription) -> Self {
        upsert(&mut self.services, name.into(), description);
        self
    }

    /// Add a module. A later module with the same name replaces it.
    #[must_use]
    pub fn module(mut self, name: impl Into<String>, description: ModuleDescription) -> Self {
        upsert(&mut self.modules, name.into(), description);
        self
    }

    /// Run services without registering them with the bridge.
    #[must_use]
    pub fn shadow_mode(mut self, enabled: bool) -> Self {
        self.shadow_mode = enabled;
        self
    }
}

impl Default for ApplicationOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ApplicationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationOptions")
            .field("bridges", &self.bridges.keys().collect::<Vec<_>>())
            .field("services", &self.services.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("modules", &self.modules.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("shadow_mode", &self.shadow_mode)
            .finish_non_exhaustive()
    }
}

fn upsert<T>(entries: &mut Vec<(String, T)>, name: String, value: T) {
    match entries.iter_mut().find(|(existing, _)| *existing == name) {
        Some(entry) => entry.1 = value,
        None => entries.push((name, value)),
    }
}

/// A running (or runnable) set of bridge, services and modules.
pub struct Application {
    config: Config,
    logger: Logger,
    shadow_mode: bool,
    graph: DependencyGraph,
    handle: BridgeHandle,
    services: LiveServices,
    modules: LiveModules,
    started: AtomicBool,
}

impl Application {
    /// Build the dependency graph. Nothing is initialized until `start`.
    pub fn new(options: ApplicationOptions) -> Result<Self, ApplicationError> {
        let ApplicationOptions {
            config,
            logger,
            bridges,
            services,
            modules,
            shadow_mode,
        } = options;

        let defaults = Config::from_value(json!({ "common": { "log_level": DEFAULT_LOG_LEVEL } }))
            .unwrap_or_default();
        let config = defaults.merge(&config);
        let common = config.sub("common");
        let app_config = common.merge(&config.sub("app"));

        let logger = logger.unwrap_or_else(|| Logger::root(log_level(&app_config).unwrap_or_default()));

        let scope = |kind: &str, name: &str, namespace: String| {
            let scoped = common.merge(&config.sub(&namespace));
            let level = log_level(&scoped);
            Scope {
                name: name.to_string(),
                logger: logger.sub(format!("{kind}:{name}"), level),
                config: scoped,
                shadow_mode,
            }
        };

        let bridge_type = app_config
            .get_str("bridge")
            .unwrap_or_else(|| LOCAL_BRIDGE.to_string());
        let factory = bridges
            .get(&bridge_type)
            .cloned()
            .ok_or_else(|| ApplicationError::UnknownBridge(bridge_type.clone()))?;

        let handle = BridgeHandle::detached();
        let live_services = LiveServices::default();
        let live_modules = LiveModules::default();
        let mut registry = NodeRegistry::new();

        registry.register(
            NodeSpec::new(
                BRIDGE_NODE,
                BridgeNode {
                    scope: scope("Bridge", &bridge_type, format!("bridge.{bridge_type}")),
                    factory,
                    handle: handle.clone(),
                },
            )
            .mandatory(),
        )?;

        for (name, description) in modules {
            let references: Vec<ModuleRef> =
                description.uses.iter().map(|r| ModuleRef::parse(r)).collect();
            let mut spec = NodeSpec::new(
                format!("{MODULE_PREFIX}{name}"),
                ModuleNode {
                    scope: scope("Module", &name, format!("module.{name}")),
                    description,
                    modules: references.clone(),
                    live: live_modules.clone(),
                },
            );
            for reference in &references {
                spec = spec.depends_on(reference.node());
            }
            registry.register(spec)?;
        }

        for (name, description) in services {
            let references: Vec<ModuleRef> =
                description.uses.iter().map(|r| ModuleRef::parse(r)).collect();
            let mut spec = NodeSpec::new(
                format!("{SERVICE_PREFIX}{name}"),
                ServiceNode {
                    scope: scope("Service", &name, format!("service.{name}")),
                    description,
                    modules: references.clone(),
                    live: live_services.clone(),
                },
            )
            .depends_on(BRIDGE_NODE)
            .mandatory();
            for reference in &references {
                spec = spec.depends_on(reference.node());
            }
            registry.register(spec)?;
        }

        logger.debug(format!(
            "Application built: bridge \"{bridge_type}\", {} nodes, shadow mode {}",
            registry.len(),
            shadow_mode
        ));

        Ok(Self {
            config,
            logger,
            shadow_mode,
            graph: DependencyGraph::new(registry),
            handle,
            services: live_services,
            modules: live_modules,
            started: AtomicBool::new(false),
        })
    }

    /// Initialize every node, then let the bridge deliver buffered calls.
    ///
    /// Returns once every node settled. Can be called once.
    pub async fn start(&self) -> Result<(), ApplicationError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ApplicationError::AlreadyStarted);
        }

        self.logger.log("Starting application");
        tokio::spawn(report_events(self.graph.subscribe(), self.logger.sub("Loader", None)));

        self.graph.init().await?;
        self.handle.bridge()?.enable();

        self.logger.log("Application started");
        Ok(())
    }

    /// Tear every node down in reverse dependency order.
    pub async fn stop(&self) -> Result<(), ApplicationError> {
        self.logger.log("Stopping application");
        self.graph.deinit().await?;
        self.logger.log("Application stopped");
        Ok(())
    }

    pub async fn run(&self, task: &str, payload: Payload) -> Result<Payload, BridgeError> {
        self.handle.run(task, payload, TaskOptions::default()).await
    }

    pub async fn run_with(&self, task: &str, payload: Payload, options: TaskOptions) -> Result<Payload, BridgeError> {
        self.handle.run(task, payload, options).await
    }

    pub async fn send(&self, event: &str, payload: Payload) -> Result<(), BridgeError> {
        self.handle.send(event, payload, EventOptions::default()).await
    }

    pub async fn send_with(&self, event: &str, payload: Payload, options: EventOptions) -> Result<(), BridgeError> {
        self.handle.send(event, payload, options).await
    }

    /// A live service instance.
    pub fn service(&self, name: &str) -> Result<Arc<dyn Service>, ApplicationError> {
        self.services
            .read()
            .get(name)
            .map(|instance| instance.service.clone())
            .ok_or_else(|| ApplicationError::UnknownService(name.to_string()))
    }

    /// A live service instance as its concrete type.
    pub fn service_as<S: Service>(&self, name: &str) -> Result<Arc<S>, ApplicationError> {
        let services = self.services.read();
        let instance = services
            .get(name)
            .ok_or_else(|| ApplicationError::UnknownService(name.to_string()))?;
        instance.downcast::<S>().ok_or_else(|| ApplicationError::TypeMismatch {
            kind: "Service",
            name: name.to_string(),
        })
    }

    /// An initialized module as its concrete type.
    pub fn module_as<M: Module>(&self, name: &str) -> Result<Arc<M>, ApplicationError> {
        let modules = self.modules.read();
        let instance = modules
            .get(name)
            .ok_or_else(|| ApplicationError::UnknownModule(name.to_string()))?;
        instance.downcast::<M>().ok_or_else(|| ApplicationError::TypeMismatch {
            kind: "Module",
            name: name.to_string(),
        })
    }

    #[must_use]
    pub fn state(&self) -> GraphState {
        self.graph.state()
    }

    /// State of a graph node (`bridge`, `service:<name>`, `module:<name>`).
    #[must_use]
    pub fn node_state(&self, node: &str) -> Option<NodeState> {
        self.graph.node_state(node)
    }

    /// Lifecycle notifications of the underlying graph.
    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.graph.subscribe()
    }

    #[must_use]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// The full configuration, defaults included.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn is_shadow(&self) -> bool {
        self.shadow_mode
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("state", &self.state())
            .field("shadow_mode", &self.shadow_mode)
            .field("bridge", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Log every lifecycle notification until the graph goes away.
async fn report_events(mut events: broadcast::Receiver<GraphEvent>, loader: Logger) {
    loop {
        match events.recv().await {
            Ok(GraphEvent::NodeState { node, state }) => match state {
                NodeState::Ready | NodeState::Failed | NodeState::Stopped => {
                    loader.log(format!("[{state}] {node}"));
                }
                _ => loader.debug(format!("[{state}] {node}")),
            },
            Ok(GraphEvent::GraphState(state)) => loader.log(format!("[{state}] application")),
            Ok(GraphEvent::Error { node: Some(node), error }) => {
                loader.error(format!("#{node} {error}"));
            }
            Ok(GraphEvent::Error { node: None, error }) => loader.error(error),
            Err(RecvError::Lagged(skipped)) => {
                loader.warn(format!("Missed {skipped} lifecycle notifications"));
            }
            Err(RecvError::Closed) => break,
        }
    }
}
