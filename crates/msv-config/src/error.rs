//! # Error Types

use thiserror::Error;

/// Errors that can occur while loading or reading configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// File I/O error.
    #[error("Failed to read {path}: {error}")]
    Io { path: String, error: String },

    /// TOML parsing error.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// The configuration root must be a table.
    #[error("Configuration root must be a table, found {0}")]
    NotATable(&'static str),

    /// A value exists but cannot be converted to the requested type.
    #[error("Invalid value for `{key}`: {message}")]
    InvalidValue { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::InvalidValue {
            key: "common.log_level".to_string(),
            message: "expected u8".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("common.log_level"));
        assert!(display.contains("expected u8"));
    }
}
