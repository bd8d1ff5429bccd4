//! Per-plugin state.
//!
//! [`PluginState`] wraps a [`PluginBackend`] with everything the host keeps
//! for every plugin regardless of format: the parameter/program/custom-data
//! tables, the macro controls, the ports, and the postponed-event queue.
//!
//! The engine owns each state exclusively through its registry slot.
//! Structural changes (`reload`, state loading) require `&mut self`, which
//! the engine only hands out while the audio thread cannot see the plugin.

mod events;
mod params;
mod process;
mod saved;
mod state;

pub use process::ProcessIo;
pub use saved::{SavedParameter, SavedState};

use crate::backend::PluginBackend;
use crate::callback::{CallbackAction, Notifier};
use crate::custom_data::CustomDataList;
use crate::loader::LoadRequest;
use crate::midi::ExternalNoteQueue;
use crate::parameter::Parameter;
use crate::port::{EngineClient, EventBuffer, MidiEvent};
use crate::postponed::PostponedEvents;
use crate::program::{MidiProgramList, ProgramList};
use crate::types::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Audio-thread scratch storage, sized at reload and on buffer-size changes.
#[derive(Debug, Default)]
pub(crate) struct Scratch {
    /// MIDI delivered to the backend this block.
    midi: EventBuffer<MidiEvent>,
    /// Output target for plugins without a MIDI output port.
    midi_discard: EventBuffer<MidiEvent>,
    /// Left channel copy for the balance stage.
    old_left: Vec<f32>,
    /// Rack mode: inputs beyond the two rack channels (silence).
    extra_in: Vec<Vec<f32>>,
    /// Rack mode: outputs beyond the two rack channels (discarded).
    extra_out: Vec<Vec<f32>>,
    /// Dedicated ports: holds the port buffers while the plugin runs.
    /// Capacity reserved at reload.
    port_in: Vec<Vec<f32>>,
    port_out: Vec<Vec<f32>>,
}

impl Scratch {
    fn reserve_ports(&mut self, ins: usize, outs: usize) {
        self.port_in = Vec::with_capacity(ins);
        self.port_out = Vec::with_capacity(outs);
    }

    fn resize(&mut self, frames: usize, extra_ins: usize, extra_outs: usize) {
        self.old_left.resize(frames, 0.0);
        self.extra_in.resize_with(extra_ins, Vec::new);
        self.extra_out.resize_with(extra_outs, Vec::new);
        for buffer in self.extra_in.iter_mut().chain(self.extra_out.iter_mut()) {
            buffer.clear();
            buffer.resize(frames, 0.0);
        }
    }
}

/// Everything needed to construct a [`PluginState`].
pub struct PluginSetup {
    pub id: PluginId,
    pub request: LoadRequest,
    /// Already de-duplicated display name.
    pub name: String,
    pub backend: Box<dyn PluginBackend>,
    pub notifier: Arc<Notifier>,
    pub postponed: Arc<PostponedEvents>,
    pub client: EngineClient,
    pub sample_rate: f64,
    pub buffer_size: usize,
    pub high_precision: bool,
    pub bridged: bool,
}

pub struct PluginState {
    id: PluginId,
    plugin_type: PluginType,
    filename: PathBuf,
    name: String,
    label: String,
    hints: PluginHints,
    category: PluginCategory,

    enabled: bool,
    active: bool,
    active_before: bool,
    ctrl_in_channel: i8,

    dry_wet: f64,
    volume: f64,
    balance_left: f64,
    balance_right: f64,

    params: Vec<Parameter>,
    programs: ProgramList,
    midi_programs: MidiProgramList,
    custom_data: CustomDataList,
    /// Bank selected by the last bank-select control event.
    next_bank: u32,

    postponed: Arc<PostponedEvents>,
    ext_notes: ExternalNoteQueue,

    client: EngineClient,
    backend: Box<dyn PluginBackend>,
    notifier: Arc<Notifier>,
    scratch: Scratch,

    sample_rate: f64,
    buffer_size: usize,
    high_precision: bool,
    gui_visible: bool,
}

impl std::fmt::Debug for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginState")
            .field("id", &self.id)
            .field("type", &self.plugin_type)
            .field("name", &self.name)
            .field("label", &self.label)
            .field("enabled", &self.enabled)
            .field("active", &self.active)
            .field("parameters", &self.params.len())
            .finish_non_exhaustive()
    }
}

impl PluginState {
    /// Wrap a freshly loaded backend. The state starts disabled with empty
    /// tables; call [`reload`](Self::reload) before publishing it.
    pub fn new(setup: PluginSetup) -> Self {
        let mut hints = PluginHints::empty();
        hints.set(PluginHints::IS_BRIDGE, setup.bridged);
        let label = if setup.request.label.is_empty() {
            setup.backend.label().to_string()
        } else {
            setup.request.label.clone()
        };
        Self {
            id: setup.id,
            plugin_type: setup.request.plugin_type,
            filename: setup.request.filename.clone(),
            name: setup.name,
            label,
            hints,
            category: PluginCategory::None,
            enabled: false,
            active: false,
            active_before: false,
            ctrl_in_channel: 0,
            dry_wet: 1.0,
            volume: 1.0,
            balance_left: -1.0,
            balance_right: 1.0,
            params: Vec::new(),
            programs: ProgramList::default(),
            midi_programs: MidiProgramList::default(),
            custom_data: CustomDataList::new(),
            next_bank: 0,
            postponed: setup.postponed,
            ext_notes: ExternalNoteQueue::new(),
            client: setup.client,
            backend: setup.backend,
            notifier: setup.notifier,
            scratch: Scratch::default(),
            sample_rate: setup.sample_rate,
            buffer_size: setup.buffer_size,
            high_precision: setup.high_precision,
            gui_visible: false,
        }
    }

    pub fn id(&self) -> PluginId {
        self.id
    }

    /// Renumber after a rack-mode removal shift.
    pub(crate) fn set_id(&mut self, id: PluginId) {
        self.id = id;
        self.backend.id_changed(id);
    }

    pub fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set an already de-duplicated display name.
    pub(crate) fn set_name(&mut self, name: String) {
        self.client.set_name(name.as_str());
        self.name = name;
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn maker(&self) -> &str {
        self.backend.maker()
    }

    pub fn copyright(&self) -> &str {
        self.backend.copyright()
    }

    pub fn real_name(&self) -> &str {
        self.backend.real_name()
    }

    pub fn unique_id(&self) -> i64 {
        self.backend.unique_id()
    }

    pub fn hints(&self) -> PluginHints {
        self.hints
    }

    pub fn category(&self) -> PluginCategory {
        self.category
    }

    pub fn is_bridge(&self) -> bool {
        self.hints.contains(PluginHints::IS_BRIDGE)
    }

    pub fn info(&self) -> PluginInfo {
        PluginInfo {
            plugin_type: Some(self.plugin_type),
            category: self.category,
            hints: self.hints,
            name: self.name.clone(),
            label: self.label.clone(),
            maker: self.backend.maker().to_string(),
            copyright: self.backend.copyright().to_string(),
            real_name: self.backend.real_name().to_string(),
            unique_id: self.backend.unique_id(),
        }
    }

    pub fn port_counts(&self) -> PortCounts {
        let parameter_ins = self.params.iter().filter(|p| p.is_input()).count() as u32;
        let parameter_outs = self.params.iter().filter(|p| p.is_output()).count() as u32;
        PortCounts {
            audio_ins: self.client.audio_in.len() as u32,
            audio_outs: self.client.audio_out.len() as u32,
            midi_ins: self.client.midi_in.is_some() as u32,
            midi_outs: self.client.midi_out.is_some() as u32,
            parameter_ins,
            parameter_outs,
            parameter_total: self.params.len() as u32,
        }
    }

    pub fn audio_in_count(&self) -> usize {
        self.client.audio_in.len()
    }

    pub fn audio_out_count(&self) -> usize {
        self.client.audio_out.len()
    }

    pub fn has_midi_in(&self) -> bool {
        self.client.midi_in.is_some()
    }

    pub fn has_midi_out(&self) -> bool {
        self.client.midi_out.is_some()
    }

    pub fn has_control_in(&self) -> bool {
        self.client.control_in.is_some()
    }

    pub fn has_control_out(&self) -> bool {
        self.client.control_out.is_some()
    }

    pub fn client(&self) -> &EngineClient {
        &self.client
    }

    pub(crate) fn client_mut(&mut self) -> &mut EngineClient {
        &mut self.client
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disabled plugins are skipped by the audio and poll threads.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool, send_osc: bool, send_callback: bool) {
        if self.active == active {
            return;
        }
        self.active = active;
        let value = if active { 1.0 } else { 0.0 };
        self.notify_parameter(PARAMETER_ACTIVE, value, send_osc, send_callback);
    }

    pub fn dry_wet(&self) -> f64 {
        self.dry_wet
    }

    pub fn set_dry_wet(&mut self, value: f64, send_osc: bool, send_callback: bool) {
        self.dry_wet = clamp_or(value, 0.0, 1.0, 1.0);
        self.notify_parameter(PARAMETER_DRYWET, self.dry_wet, send_osc, send_callback);
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn set_volume(&mut self, value: f64, send_osc: bool, send_callback: bool) {
        self.volume = clamp_or(value, 0.0, MAX_VOLUME, 1.0);
        self.notify_parameter(PARAMETER_VOLUME, self.volume, send_osc, send_callback);
    }

    pub fn balance_left(&self) -> f64 {
        self.balance_left
    }

    pub fn set_balance_left(&mut self, value: f64, send_osc: bool, send_callback: bool) {
        self.balance_left = clamp_or(value, -1.0, 1.0, -1.0);
        self.notify_parameter(PARAMETER_BALANCE_LEFT, self.balance_left, send_osc, send_callback);
    }

    pub fn balance_right(&self) -> f64 {
        self.balance_right
    }

    pub fn set_balance_right(&mut self, value: f64, send_osc: bool, send_callback: bool) {
        self.balance_right = clamp_or(value, -1.0, 1.0, 1.0);
        self.notify_parameter(PARAMETER_BALANCE_RIGHT, self.balance_right, send_osc, send_callback);
    }

    /// -1 disables control input; otherwise 0-15.
    pub fn ctrl_in_channel(&self) -> i8 {
        self.ctrl_in_channel
    }

    pub fn set_ctrl_in_channel(&mut self, channel: i8) {
        self.ctrl_in_channel = channel.clamp(-1, 15);
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn is_gui_visible(&self) -> bool {
        self.gui_visible
    }

    pub fn show_gui(&mut self, visible: bool) -> crate::Result<()> {
        if !self.hints.contains(PluginHints::HAS_GUI) {
            return Ok(());
        }
        self.backend.show_gui(visible)?;
        self.gui_visible = visible;
        self.notifier
            .callback(CallbackAction::ShowGui, self.id, visible as i32, 0, 0.0);
        Ok(())
    }

    /// Shared postponed queue; the bridge writes into it from the OSC thread.
    pub fn postponed(&self) -> &Arc<PostponedEvents> {
        &self.postponed
    }

    pub fn external_notes(&self) -> &ExternalNoteQueue {
        &self.ext_notes
    }

    pub(crate) fn backend(&self) -> &dyn PluginBackend {
        self.backend.as_ref()
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn PluginBackend {
        self.backend.as_mut()
    }

    /// Peaks measured by the backend itself (bridges).
    pub fn reported_peaks(&self) -> Option<[f32; 4]> {
        self.backend.reported_peaks()
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Publish a value change of a parameter or macro control.
    fn notify_parameter(&self, index: i32, value: f64, send_osc: bool, send_callback: bool) {
        if send_osc {
            if let Some(sink) = self.notifier.control() {
                sink.set_parameter_value(self.id, index, value);
            }
        }
        if send_callback {
            self.notifier.callback(
                CallbackAction::ParameterValueChanged,
                self.id,
                index,
                0,
                value,
            );
        }
    }
}

#[inline]
fn clamp_or(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::callback::HostCallback;
    use crate::internal;

    pub fn make_state(label: &str, rack: bool) -> PluginState {
        make_state_with(label, rack, Arc::new(Notifier::new(HostCallback::new(4096))))
    }

    pub fn make_state_with(label: &str, rack: bool, notifier: Arc<Notifier>) -> PluginState {
        build_state(label, rack, notifier, false)
    }

    /// Runs the plugin in sub-blocks of [`HIGH_PRECISION_FRAMES`](super::process::HIGH_PRECISION_FRAMES).
    pub fn make_high_precision_state(label: &str) -> PluginState {
        build_state(label, true, Arc::new(Notifier::new(HostCallback::new(4096))), true)
    }

    fn build_state(label: &str, rack: bool, notifier: Arc<Notifier>, high_precision: bool) -> PluginState {
        let backend = internal::create(label, 48000.0).expect("internal plugin");
        let mut state = PluginState::new(PluginSetup {
            id: 0,
            request: LoadRequest::internal(label),
            name: label.to_string(),
            backend,
            notifier,
            postponed: Arc::new(PostponedEvents::new(150)),
            client: EngineClient::new(label, rack, 64),
            sample_rate: 48000.0,
            buffer_size: 64,
            high_precision,
            bridged: false,
        });
        state.reload(true).expect("reload");
        state.set_active(true, false, false);
        state.set_enabled(true);
        state
    }
}
