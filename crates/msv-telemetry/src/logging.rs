//! Tagged, leveled loggers.
//!
//! Every component gets a `Logger` carrying a tag path (`Service:users/Task:create`)
//! and its own level threshold. Events are emitted through `tracing` with the
//! tag as a structured field, so the global subscriber's filter still applies
//! on top of the per-component threshold.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Separator between tag segments of nested loggers.
const TAG_SEPARATOR: char = '/';

/// Log level threshold.
///
/// Configuration expresses levels as integers (`0` = off ... `5` = trace) or
/// by name. Anything above `5` is treated as trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Map a numeric threshold to a level.
    #[must_use]
    pub fn from_number(value: u64) -> Self {
        match value {
            0 => Self::Off,
            1 => Self::Error,
            2 => Self::Warn,
            3 => Self::Info,
            4 => Self::Debug,
            _ => Self::Trace,
        }
    }

    /// Parse a level from a number or a name. Returns `None` if unrecognized.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(value) = raw.parse::<u64>() {
            return Some(Self::from_number(value));
        }

        match raw.to_ascii_lowercase().as_str() {
            "off" | "none" => Some(Self::Off),
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" | "log" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }

    /// Name usable in an `EnvFilter` directive.
    #[must_use]
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Whether a message at `level` passes this threshold.
    #[must_use]
    pub fn allows(self, level: LogLevel) -> bool {
        level != Self::Off && level <= self
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_filter())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown log level `{s}`"))
    }
}

/// Tagged logger handed to runtime components.
///
/// Cheap to clone; children share nothing mutable with their parent.
#[derive(Debug, Clone)]
pub struct Logger {
    tag: Arc<str>,
    level: LogLevel,
}

impl Logger {
    /// Create a logger with a tag and threshold.
    pub fn new(tag: impl Into<String>, level: LogLevel) -> Self {
        Self {
            tag: Arc::from(tag.into()),
            level,
        }
    }

    /// Create an untagged root logger.
    #[must_use]
    pub fn root(level: LogLevel) -> Self {
        Self::new(String::new(), level)
    }

    /// Derive a child logger.
    ///
    /// The child's tag is appended to the parent's; `level` of `None`
    /// inherits the parent's threshold.
    #[must_use]
    pub fn sub(&self, tag: impl AsRef<str>, level: Option<LogLevel>) -> Logger {
        let tag = tag.as_ref();
        let full = if self.tag.is_empty() {
            tag.to_string()
        } else {
            format!("{}{}{}", self.tag, TAG_SEPARATOR, tag)
        };

        Self {
            tag: Arc::from(full),
            level: level.unwrap_or(self.level),
        }
    }

    /// The full tag path.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The threshold of this logger.
    #[must_use]
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Whether a message at `level` would be emitted.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        self.level.allows(level)
    }

    /// Informational message.
    pub fn log(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Info) {
            tracing::info!(tag = %self.tag, "{}", message);
        }
    }

    pub fn error(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Error) {
            tracing::error!(tag = %self.tag, "{}", message);
        }
    }

    pub fn warn(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Warn) {
            tracing::warn!(tag = %self.tag, "{}", message);
        }
    }

    pub fn debug(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Debug) {
            tracing::debug!(tag = %self.tag, "{}", message);
        }
    }

    pub fn trace(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Trace) {
            tracing::trace!(tag = %self.tag, "{}", message);
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::root(LogLevel::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_number() {
        assert_eq!(LogLevel::from_number(0), LogLevel::Off);
        assert_eq!(LogLevel::from_number(4), LogLevel::Debug);
        assert_eq!(LogLevel::from_number(42), LogLevel::Trace);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse(" 2 "), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("log"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("loud"), None);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_threshold() {
        assert!(LogLevel::Info.allows(LogLevel::Error));
        assert!(LogLevel::Info.allows(LogLevel::Info));
        assert!(!LogLevel::Info.allows(LogLevel::Debug));
        assert!(!LogLevel::Off.allows(LogLevel::Error));
        assert!(!LogLevel::Trace.allows(LogLevel::Off));
    }

    #[test]
    fn test_sub_logger_tags_and_levels() {
        let root = Logger::root(LogLevel::Debug);
        let service = root.sub("Service:users", Some(LogLevel::Warn));
        let task = service.sub("Task:create", None);

        assert_eq!(service.tag(), "Service:users");
        assert_eq!(task.tag(), "Service:users/Task:create");
        assert_eq!(task.level(), LogLevel::Warn);
        assert!(!task.enabled(LogLevel::Info));
        assert_eq!(root.level(), LogLevel::Debug);
    }
}
