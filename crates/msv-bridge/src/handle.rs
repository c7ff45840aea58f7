//! Handles through which callers reach a bridge.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bridge::{Bridge, DynBridge, EventOptions, TaskOptions};
use crate::{BridgeError, Payload};

enum Slot {
    Detached,
    Attached(DynBridge),
}

/// Public entry point for `run`/`send` on an application.
///
/// Detached until the bridge has initialized, and again once it starts
/// shutting down; every call made while detached fails with `Unavailable`.
#[derive(Clone)]
pub struct BridgeHandle {
    slot: Arc<RwLock<Slot>>,
}

impl BridgeHandle {
    #[must_use]
    pub fn detached() -> Self {
        Self {
            slot: Arc::new(RwLock::new(Slot::Detached)),
        }
    }

    pub fn attach(&self, bridge: DynBridge) {
        *self.slot.write() = Slot::Attached(bridge);
    }

    /// Detach and return the bridge that was attached, if any.
    pub fn detach(&self) -> Option<DynBridge> {
        match std::mem::replace(&mut *self.slot.write(), Slot::Detached) {
            Slot::Attached(bridge) => Some(bridge),
            Slot::Detached => None,
        }
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        matches!(*self.slot.read(), Slot::Attached(_))
    }

    /// The attached bridge.
    pub fn bridge(&self) -> Result<DynBridge, BridgeError> {
        match &*self.slot.read() {
            Slot::Attached(bridge) => Ok(bridge.clone()),
            Slot::Detached => Err(BridgeError::Unavailable),
        }
    }

    pub async fn run(&self, task: &str, payload: Payload, options: TaskOptions) -> Result<Payload, BridgeError> {
        let bridge = self.bridge()?;
        bridge.run(task, payload, options).await
    }

    pub async fn send(&self, event: &str, payload: Payload, options: EventOptions) -> Result<(), BridgeError> {
        let bridge = self.bridge()?;
        bridge.send(event, payload, options).await
    }
}

impl Default for BridgeHandle {
    fn default() -> Self {
        Self::detached()
    }
}

impl fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeHandle")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// `run`/`send` bound to one bridge, handed to services.
///
/// A client created with [`BridgeClient::held`] refuses `run` until
/// [`BridgeClient::release`] is called. The bridge only delivers tasks once
/// every service has finished `init`, so a task awaited from inside `init`
/// could never be answered; it fails with `RunDuringInit` instead. `send`
/// is always accepted.
#[derive(Clone)]
pub struct BridgeClient {
    bridge: DynBridge,
    held: Arc<AtomicBool>,
}

impl BridgeClient {
    pub fn new(bridge: DynBridge) -> Self {
        Self {
            bridge,
            held: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A client whose `run` fails fast until released.
    pub fn held(bridge: DynBridge) -> Self {
        Self {
            bridge,
            held: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Allow `run` on this client and every clone of it.
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    pub async fn run(&self, task: &str, payload: Payload) -> Result<Payload, BridgeError> {
        self.run_with(task, payload, TaskOptions::default()).await
    }

    pub async fn run_with(&self, task: &str, payload: Payload, options: TaskOptions) -> Result<Payload, BridgeError> {
        if self.is_held() {
            return Err(BridgeError::RunDuringInit(task.to_string()));
        }
        self.bridge.run(task, payload, options).await
    }

    pub async fn send(&self, event: &str, payload: Payload) -> Result<(), BridgeError> {
        self.bridge.send(event, payload, EventOptions::default()).await
    }

    pub async fn send_with(&self, event: &str, payload: Payload, options: EventOptions) -> Result<(), BridgeError> {
        self.bridge.send(event, payload, options).await
    }
}

impl fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeClient")
            .field("held", &self.is_held())
            .finish_non_exhaustive()
    }
}
