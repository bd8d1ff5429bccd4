//! Integration test modules for Consort
//!
//! - host: builder options, lifecycle, slot bookkeeping
//! - rack: rack-mode signal flow
//! - parameters: parameter pipeline and programs
//! - persistence: saved state
//! - control: OSC control channel
//! - bridge: bridge failures seen from the host

pub mod bridge;
pub mod control;
pub mod host;
pub mod parameters;
pub mod persistence;
pub mod rack;
