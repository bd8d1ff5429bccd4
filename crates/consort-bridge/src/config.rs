//! Bridge configuration.

use crate::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Name of the child binary looked up next to the host executable.
pub const BRIDGE_BINARY: &str = "consort-bridge";

/// Engine sample rate handed to the child.
pub const ENV_SAMPLE_RATE: &str = "CONSORT_BRIDGE_SAMPLE_RATE";
/// Engine buffer size handed to the child.
pub const ENV_BUFFER_SIZE: &str = "CONSORT_BRIDGE_BUFFER_SIZE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Child executable. `None` looks for `consort-bridge` next to the
    /// current executable.
    pub executable: Option<PathBuf>,
    pub handshake_timeout_ms: u64,
    pub handshake_step_ms: u64,
    pub save_timeout_ms: u64,
    pub save_step_ms: u64,
    /// How long a closing child gets to exit on its own before it is killed.
    pub close_grace_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            executable: None,
            handshake_timeout_ms: 10_000,
            handshake_step_ms: 50,
            save_timeout_ms: 10_000,
            save_step_ms: 100,
            close_grace_ms: 1_000,
        }
    }
}

impl BridgeConfig {
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn handshake_step(&self) -> Duration {
        Duration::from_millis(self.handshake_step_ms)
    }

    pub fn save_timeout(&self) -> Duration {
        Duration::from_millis(self.save_timeout_ms)
    }

    pub fn save_step(&self) -> Duration {
        Duration::from_millis(self.save_step_ms)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    /// The configured executable, or `consort-bridge` beside the running
    /// binary.
    pub fn resolve_executable(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.executable {
            return Ok(path.clone());
        }
        let mut path = std::env::current_exe()?;
        path.pop();
        path.push(format!("{}{}", BRIDGE_BINARY, std::env::consts::EXE_SUFFIX));
        Ok(path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.handshake_step_ms == 0 || self.save_step_ms == 0 {
            return Err(BridgeError::InvalidArgs("poll steps must be > 0".into()));
        }
        if self.handshake_timeout_ms < self.handshake_step_ms {
            return Err(BridgeError::InvalidArgs(
                "handshake_timeout_ms must be at least one step".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.handshake_step(), Duration::from_millis(50));
        assert_eq!(config.save_timeout(), Duration::from_secs(10));
        assert_eq!(config.save_step(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_executable() {
        let config = BridgeConfig::default().with_executable("/opt/bridge");
        assert_eq!(config.resolve_executable().unwrap(), PathBuf::from("/opt/bridge"));

        let sibling = BridgeConfig::default().resolve_executable().unwrap();
        assert!(sibling
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(BRIDGE_BINARY));
    }

    #[test]
    fn test_deserialize_and_validate() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{"handshake_timeout_ms":200,"close_grace_ms":0}"#).unwrap();
        assert_eq!(config.handshake_timeout_ms, 200);
        assert_eq!(config.save_step_ms, 100);

        let bad = BridgeConfig {
            handshake_step_ms: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
