//! Bridge lifecycle.
//!
//! ```text
//! Spawned -> Handshaking -> Ready -> Running -> Closing -> Terminated
//!    |            |
//!    +------------+-> Failed -> Terminated
//! ```
//!
//! A bridge that never gets attached goes straight from Ready to Closing.

use crate::{BridgeError, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Child launched, nothing heard yet.
    Spawned,
    /// Waiting for the introspection dump to finish.
    Handshaking,
    /// Introspection complete; the host has not built the plugin yet.
    Ready,
    /// Attached to a plugin slot.
    Running,
    Closing,
    Terminated,
    /// Handshake timed out, the child exited or reported an error.
    Failed,
}

impl BridgeState {
    pub fn can_transition(self, to: BridgeState) -> bool {
        use BridgeState::*;
        matches!(
            (self, to),
            (Spawned, Handshaking)
                | (Spawned, Failed)
                | (Handshaking, Ready)
                | (Handshaking, Failed)
                | (Ready, Running)
                | (Ready, Closing)
                | (Running, Closing)
                | (Closing, Terminated)
                | (Failed, Terminated)
        )
    }

    /// Move to `to`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, to: BridgeState) -> Result<()> {
        if !self.can_transition(to) {
            return Err(BridgeError::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        tracing::trace!(from = %self, %to, "bridge state");
        *self = to;
        Ok(())
    }

    /// Still talking to a live child.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            BridgeState::Handshaking | BridgeState::Ready | BridgeState::Running
        )
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BridgeState::Spawned => "spawned",
            BridgeState::Handshaking => "handshaking",
            BridgeState::Ready => "ready",
            BridgeState::Running => "running",
            BridgeState::Closing => "closing",
            BridgeState::Terminated => "terminated",
            BridgeState::Failed => "failed",
        };
        f.write_str(name)
    }
}
