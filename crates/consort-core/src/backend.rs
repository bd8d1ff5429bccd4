//! Format-adapter boundary.
//!
//! Every plugin format (and the bridge) implements [`PluginBackend`]. The
//! engine and [`PluginState`](crate::plugin::PluginState) only ever talk to
//! plugins through this trait.

use crate::custom_data::CustomData;
use crate::parameter::ParameterDescription;
use crate::port::{EventBuffer, MidiEvent};
use crate::postponed::PostponedEvent;
use crate::program::MidiProgramData;
use crate::time::TimeInfo;
use crate::types::{PluginCategory, PluginHints, PluginId};
use crate::Result;

/// Everything a backend needs for one (sub-)block besides audio.
pub struct ProcessContext<'a> {
    pub frames: usize,
    /// Offset of this sub-block within the engine block.
    pub frame_offset: usize,
    /// Events for this sub-block, times relative to the engine block.
    pub midi_in: &'a [MidiEvent],
    pub midi_out: &'a mut EventBuffer<MidiEvent>,
    pub time: &'a TimeInfo,
    pub sample_rate: f64,
}

/// Tables rebuilt by a reload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginLayout {
    pub audio_ins: usize,
    pub audio_outs: usize,
    pub midi_in: bool,
    pub midi_out: bool,
    pub parameters: Vec<ParameterDescription>,
    pub programs: Vec<String>,
    pub midi_programs: Vec<MidiProgramData>,
    /// Format-specific hints. The host adds the dry/wet, volume and balance
    /// capabilities itself.
    pub hints: PluginHints,
    pub category: PluginCategory,
}

pub trait PluginBackend: Send {
    fn label(&self) -> &str;

    fn maker(&self) -> &str {
        ""
    }

    fn copyright(&self) -> &str {
        ""
    }

    fn real_name(&self) -> &str {
        self.label()
    }

    fn unique_id(&self) -> i64 {
        0
    }

    /// Introspect the plugin and describe its ports, parameters and
    /// programs. Never called concurrently with `process`.
    fn reload(&mut self) -> Result<PluginLayout>;

    /// Current value of table entry `index`.
    fn parameter_value(&self, index: usize) -> f64;

    /// `value` is already clamped into the parameter's range.
    fn set_parameter_value(&mut self, index: usize, value: f64);

    fn parameter_text(&self, _index: usize) -> Option<String> {
        None
    }

    fn set_program(&mut self, _index: i32) {}

    fn set_midi_program(&mut self, _index: i32) {}

    fn set_custom_data(&mut self, _data: &CustomData) -> Result<()> {
        Ok(())
    }

    fn chunk(&mut self) -> Option<Vec<u8>> {
        None
    }

    fn set_chunk(&mut self, _chunk: &[u8]) -> Result<()> {
        Ok(())
    }

    fn activate(&mut self) {}

    fn deactivate(&mut self) {}

    /// Audio thread. `inputs` and `outputs` hold `ctx.frames` samples each.
    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], ctx: &mut ProcessContext<'_>);

    fn buffer_size_changed(&mut self, _frames: usize) {}

    fn sample_rate_changed(&mut self, _rate: f64) {}

    fn show_gui(&mut self, _visible: bool) -> Result<()> {
        Ok(())
    }

    /// Main/poll thread, periodically while the GUI is visible.
    fn idle_gui(&mut self) {}

    fn ui_parameter_change(&mut self, _index: usize, _value: f64) {}

    fn ui_program_change(&mut self, _index: i32) {}

    fn ui_midi_program_change(&mut self, _index: i32) {}

    fn ui_note_on(&mut self, _channel: u8, _note: u8, _velocity: u8) {}

    fn ui_note_off(&mut self, _channel: u8, _note: u8) {}

    /// Called before state is read for saving. May block for a bounded time.
    fn prepare_for_save(&mut self) {}

    /// Peaks measured elsewhere (input L/R, output L/R). When `Some`, the
    /// engine meters with these instead of the local buffers.
    fn reported_peaks(&self) -> Option<[f32; 4]> {
        None
    }

    /// Handle a `Custom` postponed event. Returns true when consumed.
    fn handle_custom_event(&mut self, _event: &PostponedEvent) -> bool {
        false
    }

    /// Deliver an injected note out of band. Returns true when handled, in
    /// which case it is not queued for the audio thread.
    fn forward_note(&mut self, _channel: u8, _note: u8, _velocity: u8) -> bool {
        false
    }

    /// The plugin was renumbered by a rack removal.
    fn id_changed(&mut self, _new_id: PluginId) {}
}
