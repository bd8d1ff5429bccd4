//! Centralized error type for the consort umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] consort_core::Error),

    #[error("OSC: {0}")]
    Osc(#[from] consort_osc::OscError),

    #[cfg(feature = "bridge")]
    #[error("Bridge: {0}")]
    Bridge(#[from] consort_bridge::BridgeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
