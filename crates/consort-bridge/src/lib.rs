//! Out-of-process plugin hosting for Consort.
//!
//! A bridged plugin runs in a `consort-bridge` child process with its own
//! engine. The host side is a [`BridgeBackend`] that forwards every change
//! over OSC and mirrors what the child reports back.
//!
//! - [`BridgeLoader`]: install as the engine's loader and the control
//!   channel's bridge router
//! - [`Supervisor`]: spawns the child, runs the handshake, saves and stops it
//! - [`BridgeChild`]: the child side, used by the `consort-bridge` binary
//!
//! ```ignore
//! use consort_bridge::{BridgeConfig, BridgeLoader};
//! use consort_core::{Engine, EngineConfig, LoadRequest, PluginType};
//! use consort_osc::{ControlChannel, OscConfig};
//! use std::sync::Arc;
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let channel = ControlChannel::start(&engine, &OscConfig::default())?;
//! let loader = Arc::new(BridgeLoader::new(BridgeConfig::default()));
//! loader.set_channel(Some(channel.handle()));
//! channel.set_bridge_router(Some(loader.clone()));
//! engine.set_loader(loader);
//!
//! let id = engine.add_plugin(LoadRequest::new(PluginType::Bridge, "", "sine"))?;
//! ```

pub mod backend;
pub mod child;
pub mod config;
pub mod error;
pub mod loader;
pub mod protocol;
pub mod shared;
pub mod state;
pub mod supervisor;

pub use backend::BridgeBackend;
pub use child::{engine_config_from_env, BridgeChild, ChildReporter, QuitHandle};
pub use config::{BridgeConfig, BRIDGE_BINARY};
pub use error::{BridgeError, Result};
pub use loader::{BridgeLoader, RouteTable};
pub use protocol::{BridgeArgs, BridgeReport, HostCommand, USAGE};
pub use shared::{BridgeInfo, BridgeParameter, BridgeShared};
pub use state::BridgeState;
pub use supervisor::Supervisor;
