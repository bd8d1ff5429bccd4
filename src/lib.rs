//! # Consort - Real-time Audio Plugin Host
//!
//! Plugin host built from modular subsystems.
//!
//! ## Architecture
//!
//! Consort is an umbrella crate that coordinates:
//! - **consort-core** - Engine, plugin state, parameter pipeline, drivers, internal plugins
//! - **consort-osc** - OSC control channel (UDP/TCP server, UI client, dispatcher)
//! - **consort-bridge** - Out-of-process plugins (supervisor, loader, `consort-bridge` child)
//!
//! ## Quick Start
//!
//! ```ignore
//! use consort::prelude::*;
//!
//! let host = ConsortHost::builder()
//!     .process_mode(ProcessMode::ContinuousRack)
//!     .dummy_driver()
//!     .build()?;
//!
//! let sine = host.add_plugin(LoadRequest::internal("sine"))?;
//! let gain = host.add_plugin(LoadRequest::internal("gain"))?;
//! host.with_plugin(gain, |plugin| plugin.set_parameter_value(0, 0.5, true, true, true))?;
//!
//! // Run a plugin out of process
//! let bridged = host.add_plugin(LoadRequest::new(PluginType::Bridge, "", "sine"))?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Engine, control channel and bridges
//! - `bridge` - Out-of-process plugins
//! - `cpal` - System audio output driver

/// Re-export of consort-core for direct access
pub use consort_core as core;

/// Re-export of consort-osc for direct access
pub use consort_osc as osc;

/// Re-export of consort-bridge for direct access
#[cfg(feature = "bridge")]
pub use consort_bridge as bridge;

// Core types
pub use consort_core::{
    last_error,
    AudioDriver,
    BinaryType,
    CallbackAction,
    ControlSink,
    CustomData,
    DummyDriver,
    Engine,
    EngineConfig,
    HostCallback,
    HostEvent,
    LoadRequest,
    ParameterHints,
    ParameterRanges,
    PluginBackend,
    PluginCategory,
    PluginHints,
    PluginId,
    PluginLoader,
    PluginState,
    PluginType,
    ProcessMode,
    SavedState,
    TimeInfo,
    Transport,
    INVALID_PLUGIN_ID,
};

#[cfg(feature = "cpal")]
pub use consort_core::driver::CpalDriver;

// Control channel
pub use consort_osc::{ControlChannel, OscConfig, OscMessage, OscUrl};

// Bridges
#[cfg(feature = "bridge")]
pub use consort_bridge::{BridgeConfig, BridgeLoader, BridgeState};

mod builder;
mod error;
mod host;

pub use builder::ConsortHostBuilder;
pub use error::{Error, Result};
pub use host::ConsortHost;

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        ConsortHost, ConsortHostBuilder, EngineConfig, Error, LoadRequest, OscConfig, PluginHints,
        PluginId, PluginType, ProcessMode, Result,
    };

    #[cfg(feature = "bridge")]
    pub use crate::BridgeConfig;
}
