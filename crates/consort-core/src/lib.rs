//! Plugin host engine kernel.
//!
//! # Primary API
//!
//! - [`Engine`]: plugin registry, per-block processing, poll thread
//! - [`PluginState`]: per-plugin parameters, programs, custom data and
//!   postponed events
//! - [`PluginBackend`] / [`PluginLoader`]: the format-adapter boundary
//! - [`ControlSink`]: what the engine publishes to a remote control UI
//! - [`HostCallback`]: typed host-callback channel
//!
//! # Feature-gated APIs
//!
//! - `"cpal"`: [`driver::CpalDriver`], a system audio output driver
//!
//! # Example
//!
//! ```ignore
//! use consort_core::{Engine, EngineConfig, LoadRequest};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let id = engine.add_plugin(LoadRequest::internal("gain"))?;
//! engine.with_plugin(id, |plugin| plugin.set_parameter_value(0, 0.5, true, true, true))?;
//! ```

#[macro_use]
mod macros;

pub mod error;
pub use error::{last_error, set_last_error, Error, Result};

pub mod types;
pub use types::{
    BinaryType, InternalParameter, ParameterHints, PluginCategory, PluginHints, PluginId,
    PluginInfo, PluginType, PortCounts, INVALID_PLUGIN_ID, MAX_VOLUME,
};

pub mod config;
pub use config::{EngineConfig, ProcessMode};

pub(crate) mod lockfree;
pub use lockfree::{AtomicFlag, AtomicFloat, PeakMeters};

pub mod midi;
pub use midi::{ExternalNote, ExternalNoteQueue, MidiData};

pub mod port;
pub use port::{ControlEvent, ControlEventType, EngineClient, EventBuffer, MidiEvent};

pub mod parameter;
pub use parameter::{Parameter, ParameterData, ParameterDescription, ParameterRanges, ParameterType};

pub mod program;
pub use program::{MidiProgramData, MidiProgramList, ProgramList};

pub mod custom_data;
pub use custom_data::{CustomData, CustomDataList};

pub mod postponed;
pub use postponed::{PostponedEvent, PostponedEventType, PostponedEvents};

pub mod callback;
pub use callback::{CallbackAction, HostCallback, HostEvent, Notifier};

pub mod control;
pub use control::ControlSink;

pub mod time;
pub use time::{Bbt, TimeInfo, Transport};

pub mod backend;
pub use backend::{PluginBackend, PluginLayout, ProcessContext};

pub mod loader;
pub use loader::{InternalLoader, LoadContext, LoadRequest, PluginLoader};

pub mod internal;

pub mod plugin;
pub use plugin::{PluginState, ProcessIo, SavedParameter, SavedState};

mod engine;
pub use engine::Engine;

pub mod driver;
pub use driver::{AudioDriver, DummyDriver};
