//! Graph nodes backing the bridge, services and modules.
//!
//! ```text
//!   module:a ◄── module:b ◄──┐
//!                            ├── service:x ──► bridge
//!   module:c ◄───────────────┘
//! ```
//!
//! The bridge node is mandatory and has no dependencies. Service nodes are
//! mandatory and depend on the bridge plus their modules. Module nodes are
//! optional: a failing module only takes down the nodes that use it.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use msv_bridge::{BridgeClient, BridgeFactory, BridgeHandle, BridgeOptions, DynBridge};
use msv_config::Config;
use msv_graph::{node_data, Dependencies, NodeData, NodeLifecycle, PartialInit};
use msv_telemetry::Logger;
use parking_lot::RwLock;

use crate::exports::ExportsBuilder;
use crate::module::{ModuleContext, ModuleDescription, ModuleInstance, ModuleMap, ModuleRef};
use crate::service::{ServiceContext, ServiceDescription, ServiceInstance};

/// Graph node name of the bridge.
pub const BRIDGE_NODE: &str = "bridge";

/// Services that finished `init`, by name.
pub(crate) type LiveServices = Arc<RwLock<HashMap<String, ServiceInstance>>>;

/// Modules that finished `init`, by name.
pub(crate) type LiveModules = Arc<RwLock<HashMap<String, ModuleInstance>>>;

/// Config, logger and mode shared by every node of one kind and name.
#[derive(Debug, Clone)]
pub(crate) struct Scope {
    pub name: String,
    pub config: Config,
    pub logger: Logger,
    pub shadow_mode: bool,
}

pub(crate) struct BridgeNode {
    pub scope: Scope,
    pub factory: BridgeFactory,
    pub handle: BridgeHandle,
}

#[async_trait]
impl NodeLifecycle for BridgeNode {
    async fn init(&self, _dependencies: Dependencies) -> anyhow::Result<NodeData> {
        let bridge = (self.factory)(BridgeOptions {
            config: self.scope.config.clone(),
            logger: self.scope.logger.clone(),
            shadow_mode: self.scope.shadow_mode,
        })
        .with_context(|| format!("Failed to create bridge \"{}\"", self.scope.name))?;

        bridge.init().await?;
        self.handle.attach(bridge.clone());
        self.scope.logger.debug("Bridge attached");
        Ok(node_data(bridge))
    }

    async fn deinit(&self, data: NodeData) -> anyhow::Result<()> {
        self.handle.detach();
        let bridge = data
            .downcast::<DynBridge>()
            .map_err(|_| anyhow!("bridge node holds unexpected data"))?;
        bridge.disable();
        bridge.deinit().await?;
        self.scope.logger.debug("Bridge released");
        Ok(())
    }
}

/// What a running service node keeps for teardown.
struct ServiceRecord {
    instance: ServiceInstance,
    bridge: DynBridge,
}

pub(crate) struct ServiceNode {
    pub scope: Scope,
    pub description: ServiceDescription,
    pub modules: Vec<ModuleRef>,
    pub live: LiveServices,
}

#[async_trait]
impl NodeLifecycle for ServiceNode {
    async fn init(&self, dependencies: Dependencies) -> anyhow::Result<NodeData> {
        let name = &self.scope.name;
        let bridge = dependencies
            .get_as::<DynBridge>(BRIDGE_NODE)
            .map(|bridge| DynBridge::clone(&bridge))
            .ok_or_else(|| anyhow!("bridge is not available"))?;

        let client = BridgeClient::held(bridge.clone());
        let ctx = ServiceContext {
            name: name.clone(),
            config: self.scope.config.clone(),
            logger: self.scope.logger.clone(),
            modules: ModuleMap::resolve(&self.modules, &dependencies),
            shadow_mode: self.scope.shadow_mode,
            bridge: client.clone(),
        };
        let instance = (self.description.factory)(ctx)
            .with_context(|| format!("Failed to construct service \"{name}\""))?;
        self.live.write().insert(name.clone(), instance.clone());

        let record = ServiceRecord {
            instance: instance.clone(),
            bridge: bridge.clone(),
        };

        // From here on a failure still needs deinit to unregister.
        if let Err(e) = instance.service.init().await {
            return Err(PartialInit::new(node_data(record), e).into());
        }
        client.release();

        if !self.scope.shadow_mode {
            let exports = instance
                .service
                .clone()
                .exports(ExportsBuilder::new(self.scope.logger.clone()))
                .build();
            self.scope.logger.debug(format!(
                "Listening: tasks [{}], events [{}]",
                exports.task_names().collect::<Vec<_>>().join(", "),
                exports.event_names().collect::<Vec<_>>().join(", ")
            ));
            if let Err(e) = bridge.start_listening(name, exports).await {
                return Err(PartialInit::new(node_data(record), e).into());
            }
        }

        Ok(node_data(record))
    }

    async fn deinit(&self, data: NodeData) -> anyhow::Result<()> {
        let name = &self.scope.name;
        self.live.write().remove(name);

        let record = data
            .downcast::<ServiceRecord>()
            .map_err(|_| anyhow!("service node holds unexpected data"))?;

        let stopped = if self.scope.shadow_mode {
            Ok(())
        } else {
            record.bridge.stop_listening(name).await
        };
        let deinit = record.instance.service.deinit().await;

        if let Err(e) = stopped {
            self.scope.logger.error(format!("Failed to stop listening: {e}"));
        }
        deinit
    }
}

pub(crate) struct ModuleNode {
    pub scope: Scope,
    pub description: ModuleDescription,
    pub modules: Vec<ModuleRef>,
    pub live: LiveModules,
}

#[async_trait]
impl NodeLifecycle for ModuleNode {
    async fn init(&self, dependencies: Dependencies) -> anyhow::Result<NodeData> {
        let name = &self.scope.name;
        let ctx = ModuleContext {
            name: name.clone(),
            config: self.scope.config.clone(),
            logger: self.scope.logger.clone(),
            modules: ModuleMap::resolve(&self.modules, &dependencies),
        };
        let instance = (self.description.factory)(ctx)
            .with_context(|| format!("Failed to construct module \"{name}\""))?;

        if let Err(e) = instance.module.init().await {
            return Err(PartialInit::new(node_data(instance), e).into());
        }
        self.live.write().insert(name.clone(), instance.clone());
        Ok(node_data(instance))
    }

    async fn deinit(&self, data: NodeData) -> anyhow::Result<()> {
        self.live.write().remove(&self.scope.name);
        let instance = data
            .downcast::<ModuleInstance>()
            .map_err(|_| anyhow!("module node holds unexpected data"))?;
        instance.module.deinit().await
    }
}
