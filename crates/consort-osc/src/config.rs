//! Control channel configuration.

use crate::{OscError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscConfig {
    /// Interface to bind; also the host part of the published URLs.
    pub host: String,
    /// 0 picks an ephemeral port.
    pub udp_port: u16,
    /// Also listen for length-prefixed OSC over TCP. `Some(0)` picks an
    /// ephemeral port.
    pub tcp_port: Option<u16>,
    /// Inbound commands waiting for the command worker; overflow is dropped.
    pub command_queue: usize,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            udp_port: 0,
            tcp_port: None,
            command_queue: 1024,
        }
    }
}

impl OscConfig {
    pub fn with_tcp(mut self, port: u16) -> Self {
        self.tcp_port = Some(port);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(OscError::InvalidConfig("host must not be empty".into()));
        }
        if self.command_queue == 0 {
            return Err(OscError::InvalidConfig("command_queue must be > 0".into()));
        }
        Ok(())
    }
}
