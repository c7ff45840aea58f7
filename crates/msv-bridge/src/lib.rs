//! # MSV Bridge - Task and Event Transport
//!
//! A bridge carries two kinds of calls between services:
//!
//! - **Tasks** (`run`): request/response, answered by exactly one handler.
//! - **Events** (`send`): fire-and-forget, delivered to every listener.
//!
//! ## Startup Buffering
//!
//! ```text
//!   caller ──run/send──► ┌───────────────┐
//!                        │  LocalBridge  │
//!                        │               │   Buffering: calls queue in
//!                        │ [events FIFO] │   two FIFOs, task callers wait
//!                        │ [tasks  FIFO] │
//!                        └───────┬───────┘
//!                                │ enable()
//!                                ▼
//!                  events replayed first, then tasks,
//!                  each kind in submission order
//! ```
//!
//! Services register their handlers with `start_listening` while the bridge
//! is still buffering. Once every service is up, the application enables the
//! bridge and everything queued during startup is delivered.

mod bridge;
mod error;
mod exports;
mod handle;
mod local;
mod queue;

pub use bridge::{Bridge, BridgeFactory, BridgeOptions, DynBridge, EventOptions, TaskOptions};
pub use error::BridgeError;
pub use exports::{
    event_handler, task_handler, with_event_validation, with_validation, EventHandler,
    ExportTable, Payload, TaskHandler, Validator,
};
pub use handle::{BridgeClient, BridgeHandle};
pub use local::{local_bridge, BridgeMode, LocalBridge};
pub use queue::CallKind;

/// Default number of buffered calls per kind before `BufferFull`.
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// Bridge type selected when `app.bridge` is not configured.
pub const LOCAL_BRIDGE: &str = "local";
