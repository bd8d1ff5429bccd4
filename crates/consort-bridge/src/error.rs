//! Error types for plugin bridges

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to spawn bridge process '{path}': {reason}")]
    Spawn { path: String, reason: String },

    #[error("Bridge did not complete its handshake within {0}ms")]
    HandshakeTimeout(u64),

    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Bridge process exited: {0}")]
    ChildExited(String),

    #[error("Bridge reported an error: {0}")]
    Remote(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("No control channel to talk to the bridge")]
    NoChannel,

    #[error("OSC error: {0}")]
    Osc(#[from] consort_osc::OscError),

    #[error("Engine error: {0}")]
    Core(#[from] consort_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Loaders report through the engine's error type.
impl From<BridgeError> for consort_core::Error {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Core(inner) => inner,
            BridgeError::HandshakeTimeout(_) | BridgeError::Timeout { .. } => {
                consort_core::Error::Timeout(err.to_string())
            }
            other => consort_core::Error::BridgeUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::Timeout {
            operation: "save".to_string(),
            duration_ms: 10000,
        };
        assert!(err.to_string().contains("10000ms"));
        assert!(err.to_string().contains("save"));

        let err = BridgeError::HandshakeTimeout(50);
        assert_eq!(
            err.to_string(),
            "Bridge did not complete its handshake within 50ms"
        );
    }

    #[test]
    fn test_into_core_error() {
        let core: consort_core::Error = BridgeError::HandshakeTimeout(10).into();
        assert!(matches!(core, consort_core::Error::Timeout(_)));

        let core: consort_core::Error = BridgeError::Remote("no such plugin".into()).into();
        match core {
            consort_core::Error::BridgeUnavailable(message) => {
                assert!(message.contains("no such plugin"))
            }
            other => panic!("unexpected {:?}", other),
        }

        let core: consort_core::Error =
            BridgeError::Core(consort_core::Error::PluginNotFound(3)).into();
        assert!(matches!(core, consort_core::Error::PluginNotFound(3)));
    }
}
