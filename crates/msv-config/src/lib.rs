//! # MSV Config
//!
//! Hierarchical key/value configuration consumed by the runtime.
//!
//! ## Layering
//!
//! The runtime never reads a raw file directly. It builds one `Config` for the
//! whole process and then projects per-component views out of it:
//!
//! ```text
//! [common]            shared by every component
//! [app]               application-level keys (bridge type, log level)
//! [bridge.<type>]     one table per bridge implementation
//! [service.<name>]    one table per service
//! [module.<name>]     one table per module
//! ```
//!
//! A component's effective config is `common` merged with its own table,
//! with the component's table winning on conflicts.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = Config::load("msv.toml")?.with_env_overrides("MSV");
//! let common = config.sub("common");
//! let service = common.merge(&config.sub("service.users"));
//! let level: u8 = service.get_or("log_level", 3);
//! ```

mod error;
mod store;

pub use error::ConfigError;
pub use store::Config;

/// Separator between path segments in configuration keys.
pub const KEY_SEPARATOR: char = '.';

/// Separator between path segments in environment variable overrides.
pub const ENV_SEPARATOR: &str = "__";
