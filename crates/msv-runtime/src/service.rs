//! # Services
//!
//! A service owns a set of tasks and event listeners. Once initialized it
//! hands its export table to the bridge, and from then on callers reach it
//! only through `run`/`send`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use msv_bridge::BridgeClient;
use msv_config::Config;
use msv_telemetry::Logger;

use crate::exports::ExportsBuilder;
use crate::module::ModuleMap;

/// Node name prefix of services.
pub const SERVICE_PREFIX: &str = "service:";

/// Lifecycle hooks and exports of a service.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Runs before the service's exports are registered.
    ///
    /// `ServiceContext::bridge` refuses `run` until this returns: tasks are
    /// delivered only once every service is up, so awaiting one here fails
    /// with `BridgeError::RunDuringInit`. `send` is buffered as usual.
    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn deinit(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Register the tasks and events this service answers.
    ///
    /// Called once, after `init`.
    fn exports(self: Arc<Self>, exports: ExportsBuilder) -> ExportsBuilder {
        exports
    }
}

/// What a service factory receives.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub name: String,
    /// `common` merged with `service.<name>`.
    pub config: Config,
    pub logger: Logger,
    /// Modules declared in `uses`, by local name.
    pub modules: ModuleMap,
    pub shadow_mode: bool,
    /// `run`/`send` towards other services. `run` fails fast until this
    /// service's `init` has returned.
    pub bridge: BridgeClient,
}

#[derive(Clone)]
pub(crate) struct ServiceInstance {
    pub service: Arc<dyn Service>,
    any: Arc<dyn Any + Send + Sync>,
}

impl ServiceInstance {
    pub fn new<S: Service>(service: S) -> Self {
        let service = Arc::new(service);
        Self {
            service: service.clone(),
            any: service,
        }
    }

    pub fn downcast<S: Service>(&self) -> Option<Arc<S>> {
        self.any.clone().downcast::<S>().ok()
    }
}

type ServiceFactory = Arc<dyn Fn(ServiceContext) -> anyhow::Result<ServiceInstance> + Send + Sync>;

/// How to build a service, and which modules it needs.
#[derive(Clone)]
pub struct ServiceDescription {
    pub(crate) uses: Vec<String>,
    pub(crate) factory: ServiceFactory,
}

impl ServiceDescription {
    pub fn new<S, F>(factory: F) -> Self
    where
        S: Service,
        F: Fn(ServiceContext) -> anyhow::Result<S> + Send + Sync + 'static,
    {
        Self {
            uses: Vec::new(),
            factory: Arc::new(move |ctx| factory(ctx).map(ServiceInstance::new)),
        }
    }

    /// Declare module dependencies (`"name"` or `"local:name"`).
    #[must_use]
    pub fn uses<I, T>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.uses.extend(modules.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.uses
    }
}

impl fmt::Debug for ServiceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescription")
            .field("uses", &self.uses)
            .finish_non_exhaustive()
    }
}
