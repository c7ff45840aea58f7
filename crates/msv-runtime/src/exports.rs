//! Builder for a service's export table.
//!
//! Every handler receives a `HandlerContext` whose logger is tagged
//! `Task:<name>` or `Event:<name>` under the service's logger. Failures are
//! logged there before the bridge sees them: task errors are then returned to
//! the caller unchanged, event errors stop at the log.

use std::future::Future;
use std::sync::Arc;

use msv_bridge::{event_handler, task_handler, with_event_validation, with_validation, ExportTable, Payload, Validator};
use msv_telemetry::Logger;

/// Per-handler context.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub logger: Logger,
}

/// Collects tasks and events of one service.
#[derive(Debug)]
pub struct ExportsBuilder {
    logger: Logger,
    table: ExportTable,
}

impl ExportsBuilder {
    /// `logger` is the owning service's logger.
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            table: ExportTable::new(),
        }
    }

    /// Register a task.
    #[must_use]
    pub fn task<F, Fut>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Payload, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Payload>> + Send + 'static,
    {
        self.add_task(name.into(), None, handler)
    }

    /// Register a task whose payload must pass `validator` first.
    #[must_use]
    pub fn validated_task<V, F, Fut>(self, name: impl Into<String>, validator: V, handler: F) -> Self
    where
        V: Fn(&Payload) -> anyhow::Result<()> + Send + Sync + 'static,
        F: Fn(Payload, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Payload>> + Send + 'static,
    {
        self.add_task(name.into(), Some(Arc::new(validator)), handler)
    }

    /// Register an event listener.
    #[must_use]
    pub fn event<F, Fut>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Payload, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_event(name.into(), None, handler)
    }

    /// Register an event listener whose payload must pass `validator` first.
    #[must_use]
    pub fn validated_event<V, F, Fut>(self, name: impl Into<String>, validator: V, handler: F) -> Self
    where
        V: Fn(&Payload) -> anyhow::Result<()> + Send + Sync + 'static,
        F: Fn(Payload, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_event(name.into(), Some(Arc::new(validator)), handler)
    }

    #[must_use]
    pub fn build(self) -> ExportTable {
        self.table
    }

    fn add_task<F, Fut>(mut self, name: String, validator: Option<Validator>, handler: F) -> Self
    where
        F: Fn(Payload, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Payload>> + Send + 'static,
    {
        let ctx = HandlerContext {
            logger: self.logger.sub(format!("Task:{name}"), None),
        };

        let inner = {
            let ctx = ctx.clone();
            task_handler(move |payload| handler(payload, ctx.clone()))
        };
        let inner = match validator {
            Some(validator) => with_validation(move |payload: &Payload| validator(payload), inner),
            None => inner,
        };

        let logged = task_handler(move |payload| {
            let inner = inner.clone();
            let logger = ctx.logger.clone();
            async move {
                inner(payload).await.map_err(|e| {
                    logger.error(format!("{e:#}"));
                    e
                })
            }
        });

        self.table = self.table.task(name, logged);
        self
    }

    fn add_event<F, Fut>(mut self, name: String, validator: Option<Validator>, handler: F) -> Self
    where
        F: Fn(Payload, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let ctx = HandlerContext {
            logger: self.logger.sub(format!("Event:{name}"), None),
        };

        let inner = {
            let ctx = ctx.clone();
            event_handler(move |payload| handler(payload, ctx.clone()))
        };
        let inner = match validator {
            Some(validator) => with_event_validation(move |payload: &Payload| validator(payload), inner),
            None => inner,
        };

        let logged = event_handler(move |payload| {
            let inner = inner.clone();
            let logger = ctx.logger.clone();
            async move {
                if let Err(e) = inner(payload).await {
                    logger.error(format!("{e:#}"));
                }
                anyhow::Ok(())
            }
        });

        self.table = self.table.event(name, logged);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, ensure};
    use msv_telemetry::LogLevel;
    use serde_json::json;

    fn builder() -> ExportsBuilder {
        ExportsBuilder::new(Logger::new("Service:test", LogLevel::Off))
    }

    #[tokio::test]
    async fn test_task_errors_are_returned_unchanged() {
        let (tasks, _) = builder()
            .task("fail", |_, _| async { Err::<Payload, _>(anyhow!("boom")) })
            .build()
            .into_parts();

        let err = tasks["fail"](json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_event_errors_are_swallowed() {
        let (_, events) = builder()
            .event("tick", |_, _| async { Err::<(), _>(anyhow!("listener bug")) })
            .build()
            .into_parts();

        assert!(events["tick"][0](json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn test_validation_runs_before_handler() {
        let (tasks, _) = builder()
            .validated_task(
                "square",
                |payload: &Payload| {
                    ensure!(payload["n"].is_i64(), "n must be an integer");
                    Ok(())
                },
                |payload, _| async move {
                    let n = payload["n"].as_i64().unwrap_or_default();
                    anyhow::Ok(json!(n * n))
                },
            )
            .build()
            .into_parts();

        assert_eq!(tasks["square"](json!({ "n": 4 })).await.unwrap(), json!(16));
        let err = tasks["square"](json!({ "n": "4" })).await.unwrap_err();
        assert!(err.to_string().contains("n must be an integer"));
    }

    #[tokio::test]
    async fn test_handler_logger_is_tagged() {
        let (tasks, _) = builder()
            .task("whoami", |_, ctx| async move { anyhow::Ok(json!(ctx.logger.tag())) })
            .build()
            .into_parts();

        assert_eq!(
            tasks["whoami"](json!(null)).await.unwrap(),
            json!("Service:test/Task:whoami")
        );
    }
}
