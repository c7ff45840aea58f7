//! Error types for the application orchestrator.

use msv_bridge::BridgeError;
use msv_graph::GraphError;
use thiserror::Error;

/// Errors raised by `Application` and the launchers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApplicationError {
    /// `app.bridge` names a bridge type with no registered factory.
    #[error("Unknown bridge type \"{0}\"")]
    UnknownBridge(String),

    #[error("Unknown service {0}")]
    UnknownService(String),

    #[error("Unknown module {0}")]
    UnknownModule(String),

    /// The instance exists but is not of the requested concrete type.
    #[error("{kind} \"{name}\" is not of the requested type")]
    TypeMismatch { kind: &'static str, name: String },

    #[error("Application has already been started")]
    AlreadyStarted,

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            ApplicationError::UnknownService("users".to_string()).to_string(),
            "Unknown service users"
        );
        assert_eq!(
            ApplicationError::TypeMismatch {
                kind: "Module",
                name: "clock".to_string(),
            }
            .to_string(),
            "Module \"clock\" is not of the requested type"
        );
    }

    #[test]
    fn test_graph_errors_are_transparent() {
        let err: ApplicationError = GraphError::Cycle(vec!["a".into(), "b".into(), "a".into()]).into();
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }
}
