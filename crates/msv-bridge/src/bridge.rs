//! # Bridge Contract
//!
//! Interface every transport implements, plus the factory the application
//! uses to build one from its scoped configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use msv_config::Config;
use msv_telemetry::Logger;

use crate::{BridgeError, ExportTable, Payload};

/// Per-call options of `run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOptions {
    /// Give up waiting for the result after this long.
    pub wait: Option<Duration>,
}

impl TaskOptions {
    #[must_use]
    pub fn with_wait(wait: Duration) -> Self {
        Self { wait: Some(wait) }
    }
}

/// Per-call options of `send`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct EventOptions {}

/// Message transport between services.
///
/// Implementations start in a buffering state: calls made before `enable`
/// are held and delivered once enabled.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Acquire transport resources.
    async fn init(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    /// Release transport resources.
    async fn deinit(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    /// Register a service's tasks and event listeners.
    async fn start_listening(&self, service: &str, exports: ExportTable) -> Result<(), BridgeError>;

    /// Remove every registration made by `service`. Idempotent.
    async fn stop_listening(&self, service: &str) -> Result<(), BridgeError>;

    /// Invoke a task and wait for its result.
    async fn run(&self, task: &str, payload: Payload, options: TaskOptions) -> Result<Payload, BridgeError>;

    /// Dispatch an event to every listener without waiting for them.
    async fn send(&self, event: &str, payload: Payload, options: EventOptions) -> Result<(), BridgeError>;

    /// Leave buffering mode and deliver everything queued so far.
    fn enable(&self);

    /// Final shutdown. Idempotent.
    fn disable(&self);
}

/// Shared bridge instance.
pub type DynBridge = Arc<dyn Bridge>;

/// What a bridge factory receives.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// `common` merged with `bridge.<type>`.
    pub config: Config,
    /// Logger tagged `Bridge:<type>`.
    pub logger: Logger,
    pub shadow_mode: bool,
}

/// Builds a bridge from its options.
pub type BridgeFactory = Arc<dyn Fn(BridgeOptions) -> Result<DynBridge, BridgeError> + Send + Sync>;
