//! Outbound state publication.
//!
//! A [`ControlSink`] receives every state change the engine publishes: on the
//! host it is the OSC client of the registered control UI, inside a bridge
//! process it is the reporter talking back to the host. All calls happen off
//! the audio thread, often with a plugin slot locked: implementations must
//! only enqueue, never wait on a socket.

use crate::custom_data::CustomData;
use crate::parameter::{ParameterData, ParameterRanges};
use crate::program::MidiProgramData;
use crate::types::{PluginId, PluginInfo, PortCounts};

pub trait ControlSink: Send + Sync {
    fn add_plugin(&self, id: PluginId, name: &str);
    fn remove_plugin(&self, id: PluginId);

    fn set_plugin_data(&self, id: PluginId, info: &PluginInfo);
    fn set_plugin_ports(&self, id: PluginId, counts: &PortCounts);

    fn set_parameter_data(&self, id: PluginId, index: i32, data: &ParameterData, name: &str, unit: &str);
    fn set_parameter_ranges(&self, id: PluginId, index: i32, ranges: &ParameterRanges);
    fn set_parameter_midi_cc(&self, id: PluginId, index: i32, cc: i16);
    fn set_parameter_midi_channel(&self, id: PluginId, index: i32, channel: u8);
    /// `index` may be negative for the macro controls.
    fn set_parameter_value(&self, id: PluginId, index: i32, value: f64);
    fn set_default_value(&self, id: PluginId, index: i32, value: f64);

    fn set_program(&self, id: PluginId, index: i32);
    fn set_program_count(&self, id: PluginId, count: u32);
    fn set_program_name(&self, id: PluginId, index: i32, name: &str);

    fn set_midi_program(&self, id: PluginId, index: i32);
    fn set_midi_program_count(&self, id: PluginId, count: u32);
    fn set_midi_program_data(&self, id: PluginId, index: i32, data: &MidiProgramData);

    fn note_on(&self, id: PluginId, channel: u8, note: u8, velocity: u8);
    fn note_off(&self, id: PluginId, channel: u8, note: u8);

    /// `port` is 1 or 2.
    fn set_input_peak_value(&self, id: PluginId, port: u8, value: f32);
    fn set_output_peak_value(&self, id: PluginId, port: u8, value: f32);

    fn exit(&self);

    fn set_custom_data(&self, _id: PluginId, _data: &CustomData) {}

    fn set_chunk_data(&self, _id: PluginId, _chunk: &[u8]) {}

    /// End of a full state dump.
    fn dump_finished(&self, _id: PluginId) {}

    /// Acknowledges a save request.
    fn saved(&self, _id: PluginId) {}
}

/// Records every call, for tests.
#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        AddPlugin(PluginId, String),
        RemovePlugin(PluginId),
        PluginData(PluginId, String),
        PluginPorts(PluginId, PortCounts),
        ParameterData(PluginId, i32, String),
        ParameterRanges(PluginId, i32),
        ParameterMidiCc(PluginId, i32, i16),
        ParameterMidiChannel(PluginId, i32, u8),
        ParameterValue(PluginId, i32, f64),
        DefaultValue(PluginId, i32, f64),
        Program(PluginId, i32),
        ProgramCount(PluginId, u32),
        ProgramName(PluginId, i32, String),
        MidiProgram(PluginId, i32),
        MidiProgramCount(PluginId, u32),
        MidiProgramData(PluginId, i32),
        NoteOn(PluginId, u8, u8, u8),
        NoteOff(PluginId, u8, u8),
        InputPeak(PluginId, u8, f32),
        OutputPeak(PluginId, u8, f32),
        CustomData(PluginId, String, String),
        Chunk(PluginId, usize),
        DumpFinished(PluginId),
        Saved(PluginId),
        Exit,
    }

    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub calls: Mutex<Vec<Call>>,
    }

    impl RecordingSink {
        pub fn take(&self) -> Vec<Call> {
            std::mem::take(&mut *self.calls.lock())
        }

        fn push(&self, call: Call) {
            self.calls.lock().push(call);
        }
    }

    impl ControlSink for RecordingSink {
        fn add_plugin(&self, id: PluginId, name: &str) {
            self.push(Call::AddPlugin(id, name.to_string()));
        }
        fn remove_plugin(&self, id: PluginId) {
            self.push(Call::RemovePlugin(id));
        }
        fn set_plugin_data(&self, id: PluginId, info: &PluginInfo) {
            self.push(Call::PluginData(id, info.name.clone()));
        }
        fn set_plugin_ports(&self, id: PluginId, counts: &PortCounts) {
            self.push(Call::PluginPorts(id, *counts));
        }
        fn set_parameter_data(&self, id: PluginId, index: i32, _data: &ParameterData, name: &str, _unit: &str) {
            self.push(Call::ParameterData(id, index, name.to_string()));
        }
        fn set_parameter_ranges(&self, id: PluginId, index: i32, _ranges: &ParameterRanges) {
            self.push(Call::ParameterRanges(id, index));
        }
        fn set_parameter_midi_cc(&self, id: PluginId, index: i32, cc: i16) {
            self.push(Call::ParameterMidiCc(id, index, cc));
        }
        fn set_parameter_midi_channel(&self, id: PluginId, index: i32, channel: u8) {
            self.push(Call::ParameterMidiChannel(id, index, channel));
        }
        fn set_parameter_value(&self, id: PluginId, index: i32, value: f64) {
            self.push(Call::ParameterValue(id, index, value));
        }
        fn set_default_value(&self, id: PluginId, index: i32, value: f64) {
            self.push(Call::DefaultValue(id, index, value));
        }
        fn set_program(&self, id: PluginId, index: i32) {
            self.push(Call::Program(id, index));
        }
        fn set_program_count(&self, id: PluginId, count: u32) {
            self.push(Call::ProgramCount(id, count));
        }
        fn set_program_name(&self, id: PluginId, index: i32, name: &str) {
            self.push(Call::ProgramName(id, index, name.to_string()));
        }
        fn set_midi_program(&self, id: PluginId, index: i32) {
            self.push(Call::MidiProgram(id, index));
        }
        fn set_midi_program_count(&self, id: PluginId, count: u32) {
            self.push(Call::MidiProgramCount(id, count));
        }
        fn set_midi_program_data(&self, id: PluginId, index: i32, _data: &MidiProgramData) {
            self.push(Call::MidiProgramData(id, index));
        }
        fn note_on(&self, id: PluginId, channel: u8, note: u8, velocity: u8) {
            self.push(Call::NoteOn(id, channel, note, velocity));
        }
        fn note_off(&self, id: PluginId, channel: u8, note: u8) {
            self.push(Call::NoteOff(id, channel, note));
        }
        fn set_input_peak_value(&self, id: PluginId, port: u8, value: f32) {
            self.push(Call::InputPeak(id, port, value));
        }
        fn set_output_peak_value(&self, id: PluginId, port: u8, value: f32) {
            self.push(Call::OutputPeak(id, port, value));
        }
        fn exit(&self) {
            self.push(Call::Exit);
        }
        fn set_custom_data(&self, id: PluginId, data: &CustomData) {
            self.push(Call::CustomData(id, data.key.clone(), data.value.clone()));
        }
        fn set_chunk_data(&self, id: PluginId, chunk: &[u8]) {
            self.push(Call::Chunk(id, chunk.len()));
        }
        fn dump_finished(&self, id: PluginId) {
            self.push(Call::DumpFinished(id));
        }
        fn saved(&self, id: PluginId) {
            self.push(Call::Saved(id));
        }
    }
}
