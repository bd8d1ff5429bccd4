//! OSC control channel for the Consort plugin host.
//!
//! - [`ControlChannel`]: binds UDP (and optionally TCP), dispatches inbound
//!   commands to the engine and publishes engine state to a registered UI
//! - [`OscMessage`]: the wire codec
//! - [`Route`]: `/<client>/<NN>/<method>` addressing
//! - [`BridgeRouter`]: where `bridge_*` reports from bridge processes go
//!
//! ```ignore
//! use consort_core::{Engine, EngineConfig};
//! use consort_osc::{ControlChannel, OscConfig};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let channel = ControlChannel::start(&engine, &OscConfig::default())?;
//! println!("control UI can register at {}", channel.url());
//! ```

pub mod address;
mod channel;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod server;
pub mod url;

pub use address::{plugin_path, plugin_prefix, Route};
pub use channel::{ChannelHandle, ControlChannel};
pub use client::ControlClient;
pub use config::OscConfig;
pub use dispatch::{BridgeRouter, Dispatcher};
pub use error::{OscError, Result};
pub use message::{decode_packet, encode_bundle, OscArg, OscMessage};
pub use server::{ControlServer, MessageHandler, OscSender};
pub use url::{OscUrl, Protocol};
