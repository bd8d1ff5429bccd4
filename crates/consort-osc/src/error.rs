//! Error types for the control channel.

use consort_core::PluginId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OscError {
    #[error("Malformed packet: {0}")]
    Decode(String),

    #[error("Argument mismatch for {path}: expected '{expected}', got '{got}'")]
    ArgumentMismatch {
        path: String,
        expected: String,
        got: String,
    },

    #[error("Invalid OSC URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid OSC path: {0}")]
    InvalidPath(String),

    #[error("Path '{path}' is not addressed to client '{client}'")]
    WrongClient { path: String, client: String },

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("No bridge is listening for plugin {0}")]
    NoBridge(PluginId),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("OSC send queue is full")]
    SendQueueFull,

    #[error("Control channel is not running")]
    NotRunning,

    #[error("Engine error: {0}")]
    Engine(#[from] consort_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OscError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OscError::ArgumentMismatch {
            path: "/Consort/00/set_volume".into(),
            expected: "d".into(),
            got: "s".into(),
        };
        assert!(err.to_string().contains("set_volume"));
        assert!(err.to_string().contains("expected 'd'"));

        let err: OscError = consort_core::Error::PluginNotFound(3).into();
        assert_eq!(err.to_string(), "Engine error: Plugin 3 not found");
    }
}
