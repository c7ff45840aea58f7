//! # MSV Telemetry
//!
//! Logging for MSV processes.
//!
//! ## Components
//!
//! - **Subscriber setup**: `init_tracing` installs a `tracing-subscriber`
//!   registry with an env filter and a pretty or JSON formatter.
//! - **Tagged loggers**: `Logger` is the leveled, tagged front-end handed to
//!   every bridge, service and module. Each component gets its own child
//!   logger whose level comes from that component's configuration.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use msv_telemetry::{init_tracing, Logger, LogLevel, TelemetryConfig};
//!
//! init_tracing(&TelemetryConfig::from_env())?;
//!
//! let root = Logger::root(LogLevel::Debug);
//! let service = root.sub("Service:users", Some(LogLevel::Info));
//! service.log("ready");
//! service.debug("suppressed, level is info");
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MSV_SERVICE_NAME` | `msv` | Service name attached to logs |
//! | `MSV_LOG_LEVEL` | `info` | Log level filter (`RUST_LOG` also honored) |
//! | `MSV_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `MSV_JSON_LOGS` | `false` | JSON formatted logs |

mod config;
mod logging;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use logging::{LogLevel, Logger};
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
