//! # MSV Runtime
//!
//! Builds a process out of one bridge, a set of services and a set of
//! modules, and runs them as one dependency graph.
//!
//! ## Node Layout
//!
//! ```text
//!                 ┌──────────┐
//!                 │  bridge  │  mandatory, starts first, stops last
//!                 └────▲─────┘
//!          ┌───────────┴───────────┐
//!   ┌──────┴──────┐         ┌──────┴──────┐
//!   │ service:api │         │ service:job │  mandatory
//!   └──────┬──────┘         └──────┬──────┘
//!          └───────────┬───────────┘
//!               ┌──────▼──────┐
//!               │  module:db  │  optional
//!               └─────────────┘
//! ```
//!
//! ## Startup
//!
//! 1. The bridge initializes and `run`/`send` become callable. Calls made
//!    from here on are buffered.
//! 2. Modules, then services, initialize as their dependencies become Ready.
//!    Each service registers its exports with the bridge.
//! 3. Once every node settled, the bridge is enabled and the buffered calls
//!    are delivered.
//!
//! Shutdown runs the same graph in reverse.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use msv_runtime::{run_app, ApplicationOptions, ModuleDescription, ServiceDescription};
//!
//! let options = ApplicationOptions::new()
//!     .module("db", ModuleDescription::new(|ctx| Database::connect(&ctx.config)))
//!     .service("users", ServiceDescription::new(Users::new).uses(["db"]));
//!
//! run_app(options).await?;
//! ```

mod application;
pub mod cli;
mod error;
mod exports;
mod launcher;
mod module;
mod nodes;
mod service;

pub use application::{log_level, Application, ApplicationOptions, DEFAULT_LOG_LEVEL};
pub use error::ApplicationError;
pub use exports::{ExportsBuilder, HandlerContext};
pub use launcher::{run_app, scoped_app, shadow_app};
pub use module::{Module, ModuleContext, ModuleDescription, ModuleMap, ModuleRef, MODULE_PREFIX};
pub use nodes::BRIDGE_NODE;
pub use service::{Service, ServiceContext, ServiceDescription, SERVICE_PREFIX};

pub use msv_bridge::{BridgeClient, BridgeError, EventOptions, Payload, TaskOptions};
pub use msv_config::Config;
pub use msv_graph::{GraphError, GraphEvent, GraphState, NodeState};
pub use msv_telemetry::{LogLevel, Logger};
