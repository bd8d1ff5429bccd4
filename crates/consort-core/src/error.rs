//! Error types for consort-core.

use crate::types::{PluginId, PluginType};
use std::cell::RefCell;
use thiserror::Error;

/// Error type for consort-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Maximum number of plugins reached ({0})")]
    MaxPluginsReached(usize),

    #[error("Plugin {0} not found")]
    PluginNotFound(PluginId),

    #[error("Unsupported plugin type: {0}")]
    UnsupportedType(PluginType),

    #[error("Failed to load plugin: {0}")]
    LoadFailed(String),

    #[error("Bridge unavailable: {0}")]
    BridgeUnavailable(String),

    #[error("Invalid parameter index {0}")]
    InvalidParameter(i32),

    #[error("Invalid program index {0}")]
    InvalidProgram(i32),

    #[error("Invalid custom data: {0}")]
    InvalidCustomData(String),

    #[error("Engine is not running")]
    NotRunning,

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Record the last error of the calling thread. Overwritten by the next
/// failing call on the same thread.
pub fn set_last_error(message: impl Into<String>) {
    let message = message.into();
    LAST_ERROR.with(|last| *last.borrow_mut() = message);
}

/// The message of the most recent failing engine operation on this thread.
pub fn last_error() -> String {
    LAST_ERROR.with(|last| last.borrow().clone())
}

/// Record `err` as the last error and pass it through.
pub(crate) fn record<T>(result: Result<T>) -> Result<T> {
    if let Err(ref err) = result {
        set_last_error(err.to_string());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sets_last_error() {
        let result: Result<()> = record(Err(Error::MaxPluginsReached(16)));
        assert!(result.is_err());
        assert_eq!(last_error(), "Maximum number of plugins reached (16)");

        set_last_error("other");
        assert_eq!(last_error(), "other");
    }
}
