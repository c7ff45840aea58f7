//! # Export Tables
//!
//! The handlers a service exposes on a bridge, built once when the service
//! starts. Validation is plain function composition over handlers.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

/// Task and event payloads.
pub type Payload = serde_json::Value;

/// Request/response handler.
pub type TaskHandler = Arc<dyn Fn(Payload) -> BoxFuture<'static, anyhow::Result<Payload>> + Send + Sync>;

/// Fire-and-forget handler.
pub type EventHandler = Arc<dyn Fn(Payload) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Payload check run before a handler.
pub type Validator = Arc<dyn Fn(&Payload) -> anyhow::Result<()> + Send + Sync>;

/// Wrap an async closure as a task handler.
pub fn task_handler<F, Fut>(handler: F) -> TaskHandler
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Payload>> + Send + 'static,
{
    Arc::new(move |payload| handler(payload).boxed())
}

/// Wrap an async closure as an event handler.
pub fn event_handler<F, Fut>(handler: F) -> EventHandler
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |payload| handler(payload).boxed())
}

/// Run `validator` on the payload before `handler`; a rejected payload never
/// reaches the handler.
pub fn with_validation<V>(validator: V, handler: TaskHandler) -> TaskHandler
where
    V: Fn(&Payload) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(move |payload| match validator(&payload) {
        Ok(()) => handler(payload),
        Err(e) => futures::future::ready(Err(e)).boxed(),
    })
}

/// Event counterpart of [`with_validation`].
pub fn with_event_validation<V>(validator: V, handler: EventHandler) -> EventHandler
where
    V: Fn(&Payload) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(move |payload| match validator(&payload) {
        Ok(()) => handler(payload),
        Err(e) => futures::future::ready(Err(e)).boxed(),
    })
}

/// Tasks and event listeners of one service.
#[derive(Clone, Default)]
pub struct ExportTable {
    tasks: BTreeMap<String, TaskHandler>,
    events: BTreeMap<String, Vec<EventHandler>>,
}

impl ExportTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Export a task. A second task with the same name replaces the first.
    #[must_use]
    pub fn task(mut self, name: impl Into<String>, handler: TaskHandler) -> Self {
        self.tasks.insert(name.into(), handler);
        self
    }

    /// Listen to an event.
    #[must_use]
    pub fn event(mut self, name: impl Into<String>, handler: EventHandler) -> Self {
        self.events.entry(name.into()).or_default().push(handler);
        self
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.events.is_empty()
    }

    #[must_use]
    pub fn into_parts(self) -> (BTreeMap<String, TaskHandler>, BTreeMap<String, Vec<EventHandler>>) {
        (self.tasks, self.events)
    }
}

impl fmt::Debug for ExportTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportTable")
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn positive(payload: &Payload) -> anyhow::Result<()> {
        match payload.get("num").and_then(Payload::as_i64) {
            Some(n) if n > 0 => Ok(()),
            _ => anyhow::bail!("`num` must be a positive integer"),
        }
    }

    #[tokio::test]
    async fn test_validation_guards_handler() {
        let handler = with_validation(
            positive,
            task_handler(|payload: Payload| async move {
                let n = payload["num"].as_i64().unwrap_or_default();
                anyhow::Ok(json!(n * 2))
            }),
        );

        assert_eq!(handler(json!({ "num": 21 })).await.unwrap(), json!(42));
        let err = handler(json!({ "num": -1 })).await.unwrap_err();
        assert!(err.to_string().contains("positive"));
    }

    #[test]
    fn test_export_table_names() {
        let noop = event_handler(|_| async { anyhow::Ok(()) });
        let table = ExportTable::new()
            .task("b", task_handler(|p| async move { anyhow::Ok(p) }))
            .task("a", task_handler(|p| async move { anyhow::Ok(p) }))
            .event("created", noop.clone())
            .event("created", noop);

        assert_eq!(table.task_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(table.event_names().collect::<Vec<_>>(), vec!["created"]);

        let (_, events) = table.into_parts();
        assert_eq!(events["created"].len(), 2);
    }
}
