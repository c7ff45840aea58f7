//! # Local Bridge
//!
//! In-process bridge. Tasks and events are dispatched straight to the
//! handlers registered by services living in the same process.
//!
//! ## Modes
//!
//! ```text
//!   Buffering ──enable()──► Enabled ──disable()──► Closed
//!       │                                            ▲
//!       └─────────────────disable()──────────────────┘
//! ```
//!
//! - **Buffering**: `run` queues the call and waits; `send` queues the event.
//!   Each queue holds at most `buffer_capacity` calls.
//! - **Enabled**: calls dispatch live. Buffered events are replayed first,
//!   then buffered tasks; task results resolve in submission order.
//! - **Closed**: `run` fails with `Unavailable`, `send` drops the event.
//!   Tasks still buffered at close resolve with `Cancelled`.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::future::FutureExt;
use futures::stream::{FuturesOrdered, StreamExt};
use msv_telemetry::Logger;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bridge::{Bridge, BridgeFactory, BridgeOptions, EventOptions, TaskOptions};
use crate::queue::{CallBuffer, PendingEvent, PendingTask};
use crate::{
    BridgeError, CallKind, EventHandler, ExportTable, Payload, TaskHandler,
    DEFAULT_BUFFER_CAPACITY,
};

/// Mode of a `LocalBridge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeMode {
    Buffering,
    Enabled,
    Closed,
}

struct TaskEntry {
    service: String,
    handler: TaskHandler,
}

struct Listener {
    service: String,
    handler: EventHandler,
}

struct State {
    mode: BridgeMode,
    buffer: CallBuffer,
    tasks: HashMap<String, TaskEntry>,
    events: HashMap<String, Vec<Listener>>,
}

impl State {
    fn listeners(&self, event: &str) -> Vec<(String, EventHandler)> {
        self.events
            .get(event)
            .map(|list| {
                list.iter()
                    .map(|l| (l.service.clone(), l.handler.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

enum TaskCall {
    Live(Option<TaskHandler>, Payload),
    Buffered(Uuid, oneshot::Receiver<Result<Payload, BridgeError>>),
}

/// In-process bridge with startup buffering.
pub struct LocalBridge {
    state: Mutex<State>,
    logger: Logger,
}

impl LocalBridge {
    /// Create a bridge with the default buffer capacity.
    #[must_use]
    pub fn new(logger: Logger) -> Self {
        Self::with_capacity(logger, DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a bridge buffering at most `capacity` calls per kind.
    #[must_use]
    pub fn with_capacity(logger: Logger, capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                mode: BridgeMode::Buffering,
                buffer: CallBuffer::new(capacity),
                tasks: HashMap::new(),
                events: HashMap::new(),
            }),
            logger,
        }
    }

    #[must_use]
    pub fn mode(&self) -> BridgeMode {
        self.state.lock().mode
    }

    /// Calls of `kind` waiting for `enable`.
    #[must_use]
    pub fn pending_calls(&self, kind: CallKind) -> usize {
        self.state.lock().buffer.len(kind)
    }

    /// Registered task names, sorted.
    #[must_use]
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().tasks.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of listeners registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.state.lock().events.get(event).map_or(0, Vec::len)
    }

    fn dispatch_event(&self, call_id: Option<Uuid>, event: &str, payload: Payload) {
        let listeners = self.state.lock().listeners(event);
        if listeners.is_empty() {
            self.logger
                .warn(format!("No listeners on event \"{event}\""));
            return;
        }

        debug!(event = %event, listeners = listeners.len(), call_id = ?call_id, "[Bridge] Dispatching event");
        for (service, handler) in listeners {
            let logger = self.logger.clone();
            let event = event.to_string();
            let payload = payload.clone();
            spawn_detached(&self.logger, async move {
                let outcome = AssertUnwindSafe(handler(payload)).catch_unwind().await;
                let message = match outcome {
                    Ok(Ok(())) => return,
                    Ok(Err(e)) => format!("{e:#}"),
                    Err(_) => "handler panicked".to_string(),
                };
                logger.error(format!(
                    "Event \"{event}\" listener of service \"{service}\" failed: {message}"
                ));
            });
        }
    }
}

#[async_trait]
impl Bridge for LocalBridge {
    async fn start_listening(&self, service: &str, exports: ExportTable) -> Result<(), BridgeError> {
        let (tasks, events) = exports.into_parts();
        let mut state = self.state.lock();

        for (name, handler) in tasks {
            let entry = TaskEntry {
                service: service.to_string(),
                handler,
            };
            if let Some(previous) = state.tasks.insert(name.clone(), entry) {
                debug!(
                    task = %name,
                    previous = %previous.service,
                    service = %service,
                    "[Bridge] Task handler replaced"
                );
            }
        }
        for (name, handlers) in events {
            let listeners = state.events.entry(name).or_default();
            listeners.extend(handlers.into_iter().map(|handler| Listener {
                service: service.to_string(),
                handler,
            }));
        }

        debug!(service = %service, "[Bridge] Service listening");
        Ok(())
    }

    async fn stop_listening(&self, service: &str) -> Result<(), BridgeError> {
        let mut state = self.state.lock();
        state.tasks.retain(|_, entry| entry.service != service);
        for listeners in state.events.values_mut() {
            listeners.retain(|l| l.service != service);
        }
        state.events.retain(|_, listeners| !listeners.is_empty());

        debug!(service = %service, "[Bridge] Service stopped listening");
        Ok(())
    }

    async fn run(&self, task: &str, payload: Payload, options: TaskOptions) -> Result<Payload, BridgeError> {
        let call = {
            let mut state = self.state.lock();
            match state.mode {
                BridgeMode::Closed => return Err(BridgeError::Unavailable),
                BridgeMode::Enabled => {
                    TaskCall::Live(state.tasks.get(task).map(|e| e.handler.clone()), payload)
                }
                BridgeMode::Buffering => {
                    let (reply, rx) = oneshot::channel();
                    let call_id = Uuid::new_v4();
                    state.buffer.push_task(PendingTask {
                        call_id,
                        name: task.to_string(),
                        payload,
                        options: options.clone(),
                        reply,
                    })?;
                    TaskCall::Buffered(call_id, rx)
                }
            }
        };

        let result = async {
            match call {
                TaskCall::Live(Some(handler), payload) => invoke_task(task, handler, payload).await,
                TaskCall::Live(None, _) => Err(BridgeError::UnknownTask(task.to_string())),
                TaskCall::Buffered(call_id, rx) => {
                    debug!(task = %task, call_id = %call_id, "[Bridge] Task buffered");
                    rx.await
                        .unwrap_or_else(|_| Err(BridgeError::Cancelled(task.to_string())))
                }
            }
        };

        match options.wait {
            None => result.await,
            Some(wait) => tokio::time::timeout(wait, result)
                .await
                .unwrap_or_else(|_| {
                    Err(BridgeError::Timeout {
                        task: task.to_string(),
                        waited_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    })
                }),
        }
    }

    async fn send(&self, event: &str, payload: Payload, options: EventOptions) -> Result<(), BridgeError> {
        {
            let mut state = self.state.lock();
            match state.mode {
                BridgeMode::Enabled => {}
                BridgeMode::Closed => {
                    drop(state);
                    self.logger
                        .warn(format!("Bridge closed, event \"{event}\" dropped"));
                    return Ok(());
                }
                BridgeMode::Buffering => {
                    let call_id = Uuid::new_v4();
                    state.buffer.push_event(PendingEvent {
                        call_id,
                        name: event.to_string(),
                        payload,
                        options,
                    })?;
                    debug!(event = %event, call_id = %call_id, "[Bridge] Event buffered");
                    return Ok(());
                }
            }
        }

        self.dispatch_event(None, event, payload);
        Ok(())
    }

    fn enable(&self) {
        let (events, tasks) = {
            let mut state = self.state.lock();
            if state.mode != BridgeMode::Buffering {
                debug!(mode = ?state.mode, "[Bridge] Enable ignored");
                return;
            }
            state.mode = BridgeMode::Enabled;
            let (events, tasks) = state.buffer.take();
            let tasks: Vec<(PendingTask, Option<TaskHandler>)> = tasks
                .into_iter()
                .map(|t| {
                    let handler = state.tasks.get(&t.name).map(|e| e.handler.clone());
                    (t, handler)
                })
                .collect();
            (events, tasks)
        };

        info!(
            events = events.len(),
            tasks = tasks.len(),
            "[Bridge] Enabled, replaying buffered calls"
        );

        for event in events {
            debug!(event = %event.name, call_id = %event.call_id, options = ?event.options, "[Bridge] Replaying event");
            self.dispatch_event(Some(event.call_id), &event.name, event.payload);
        }

        if tasks.is_empty() {
            return;
        }

        // Handlers run concurrently; replies go out in submission order.
        spawn_detached(&self.logger, async move {
            let mut replay: FuturesOrdered<_> = tasks
                .into_iter()
                .map(|(pending, handler)| async move {
                    debug!(
                        task = %pending.name,
                        call_id = %pending.call_id,
                        wait = ?pending.options.wait,
                        "[Bridge] Replaying task"
                    );
                    let result = match handler {
                        Some(handler) => invoke_task(&pending.name, handler, pending.payload).await,
                        None => Err(BridgeError::UnknownTask(pending.name.clone())),
                    };
                    (pending.reply, result)
                })
                .collect();

            while let Some((reply, result)) = replay.next().await {
                // The caller may have timed out and gone away.
                let _ = reply.send(result);
            }
        });
    }

    fn disable(&self) {
        let (events, tasks) = {
            let mut state = self.state.lock();
            if state.mode == BridgeMode::Closed {
                return;
            }
            state.mode = BridgeMode::Closed;
            state.buffer.take()
        };

        if !events.is_empty() {
            self.logger.warn(format!(
                "Bridge closed with {} undelivered events",
                events.len()
            ));
        }
        for task in tasks {
            let _ = task.reply.send(Err(BridgeError::Cancelled(task.name)));
        }

        info!("[Bridge] Disabled");
    }
}

async fn invoke_task(task: &str, handler: TaskHandler, payload: Payload) -> Result<Payload, BridgeError> {
    let outcome = AssertUnwindSafe(handler(payload)).catch_unwind().await;
    match outcome {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(BridgeError::TaskFailed {
            task: task.to_string(),
            message: format!("{e:#}"),
        }),
        Err(_) => Err(BridgeError::TaskFailed {
            task: task.to_string(),
            message: "handler panicked".to_string(),
        }),
    }
}

fn spawn_detached<F>(logger: &Logger, future: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => logger.error("No async runtime available, bridge work dropped"),
    }
}

/// Factory for `LocalBridge`.
///
/// Reads `buffer_capacity` from the bridge's config.
#[must_use]
pub fn local_bridge() -> BridgeFactory {
    std::sync::Arc::new(|options: BridgeOptions| {
        let capacity = options
            .config
            .get_or("buffer_capacity", DEFAULT_BUFFER_CAPACITY);
        if options.shadow_mode {
            options.logger.debug("Shadow mode: services will not listen");
        }
        let bridge: crate::DynBridge =
            std::sync::Arc::new(LocalBridge::with_capacity(options.logger, capacity));
        Ok(bridge)
    })
}
