//! Components bundled with the `msv` binary.
//!
//! - `module:clock`: process clock with a configurable label.
//! - `service:echo`: `echo`, `add` and `uptime` tasks, `ping` event.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use msv_runtime::{
    ApplicationOptions, ExportsBuilder, Logger, Module, ModuleContext, ModuleDescription, Service,
    ServiceContext, ServiceDescription,
};
use serde::Deserialize;
use serde_json::json;

pub struct Clock {
    label: String,
    started: Instant,
    logger: Logger,
}

impl Clock {
    fn new(ctx: ModuleContext) -> anyhow::Result<Self> {
        Ok(Self {
            label: ctx.config.get_or("label", "msv".to_string()),
            started: Instant::now(),
            logger: ctx.logger,
        })
    }

    pub fn uptime_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

#[async_trait]
impl Module for Clock {
    async fn init(&self) -> anyhow::Result<()> {
        self.logger.debug(format!("Clock \"{}\" started", self.label));
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct AddRequest {
    a: i64,
    b: i64,
}

pub struct Echo {
    clock: Option<Arc<Clock>>,
}

impl Echo {
    fn new(ctx: ServiceContext) -> anyhow::Result<Self> {
        Ok(Self {
            clock: ctx.modules.get::<Clock>("clock"),
        })
    }
}

#[async_trait]
impl Service for Echo {
    fn exports(self: Arc<Self>, exports: ExportsBuilder) -> ExportsBuilder {
        exports
            .task("echo", |payload, _| async move { anyhow::Ok(payload) })
            .task("add", |payload, _| async move {
                let request: AddRequest =
                    serde_json::from_value(payload).context("expected {\"a\": int, \"b\": int}")?;
                let sum = request
                    .a
                    .checked_add(request.b)
                    .context("sum overflows a 64-bit integer")?;
                anyhow::Ok(json!(sum))
            })
            .task("uptime", move |_, _| {
                let clock = self.clock.clone();
                async move {
                    let clock = clock.context("clock module is not available")?;
                    anyhow::Ok(json!({ "label": clock.label, "uptime_ms": clock.uptime_ms() }))
                }
            })
            .event("ping", |payload, ctx| async move {
                ctx.logger.log(format!("ping {payload}"));
                anyhow::Ok(())
            })
    }
}

/// Demo application: the `echo` service using the `clock` module.
pub fn options() -> ApplicationOptions {
    ApplicationOptions::new()
        .module("clock", ModuleDescription::new(Clock::new))
        .service("echo", ServiceDescription::new(Echo::new).uses(["clock"]))
}
