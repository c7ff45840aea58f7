//! # Error Types

use thiserror::Error;

use crate::CallKind;

/// Errors returned to `run`/`send` callers and bridge owners.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// No service registered a handler for the task.
    #[error("No handler for task \"{0}\"")]
    UnknownTask(String),

    /// The task handler returned an error.
    #[error("Task \"{task}\" failed: {message}")]
    TaskFailed { task: String, message: String },

    /// The caller's wait limit elapsed before the task resolved.
    #[error("Task \"{task}\" timed out after {waited_ms}ms")]
    Timeout { task: String, waited_ms: u64 },

    /// Too many calls queued while the bridge is buffering.
    #[error("Bridge {kind} buffer is full ({capacity} calls pending)")]
    BufferFull { kind: CallKind, capacity: usize },

    /// The bridge is detached or shut down.
    #[error("Bridge is not available")]
    Unavailable,

    /// A service awaited a task from its own `init`. Tasks are delivered
    /// only after every service is initialized.
    #[error("Task \"{0}\" cannot be run while the calling service is initializing")]
    RunDuringInit(String),

    /// A buffered task was dropped because the bridge shut down first.
    #[error("Task \"{0}\" cancelled: bridge shut down before it was delivered")]
    Cancelled(String),

    /// Transport-level failure of a bridge implementation.
    #[error("Transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_failed_display() {
        let err = BridgeError::TaskFailed {
            task: "create".to_string(),
            message: "duplicate email".to_string(),
        };
        assert_eq!(err.to_string(), "Task \"create\" failed: duplicate email");
    }

    #[test]
    fn test_buffer_full_display() {
        let err = BridgeError::BufferFull {
            kind: CallKind::Event,
            capacity: 2,
        };
        assert_eq!(err.to_string(), "Bridge event buffer is full (2 calls pending)");
    }
}
