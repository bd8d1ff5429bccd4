//! Parameter, program and custom-data operations.
//!
//! The `send_*` flags select which observers hear about a change. Inside
//! `process` all of them are false and the change is postponed instead.

use super::PluginState;
use crate::callback::CallbackAction;
use crate::custom_data::{CustomData, CustomDataList};
use crate::parameter::{Parameter, ParameterData, ParameterRanges};
use crate::program::{MidiProgramData, MidiProgramList, ProgramList};
use crate::types::*;
use crate::{Error, Result};

impl PluginState {
    pub fn parameter_count(&self) -> usize {
        self.params.len()
    }

    pub fn parameter(&self, index: usize) -> Option<&Parameter> {
        self.params.get(index)
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    pub fn parameter_data(&self, index: usize) -> Option<&ParameterData> {
        self.params.get(index).map(|p| &p.data)
    }

    pub fn parameter_ranges(&self, index: usize) -> Option<&ParameterRanges> {
        self.params.get(index).map(|p| &p.ranges)
    }

    /// Live value read back from the plugin; 0.0 for an unknown index.
    pub fn parameter_value(&self, index: usize) -> f64 {
        if index < self.params.len() {
            self.backend.parameter_value(index)
        } else {
            0.0
        }
    }

    pub fn parameter_text(&self, index: usize) -> Option<String> {
        if index < self.params.len() {
            self.backend.parameter_text(index)
        } else {
            None
        }
    }

    /// Clamp `value` into the parameter's range and apply it. Out-of-range
    /// values are never an error; an unknown index is ignored.
    pub fn set_parameter_value(
        &mut self,
        index: usize,
        value: f64,
        send_gui: bool,
        send_osc: bool,
        send_callback: bool,
    ) {
        let Some(param) = self.params.get(index) else {
            tracing::debug!(id = self.id, index, "ignoring unknown parameter");
            return;
        };
        let value = param.fix_value(value);
        self.backend.set_parameter_value(index, value);
        if send_gui {
            self.backend.ui_parameter_change(index, value);
        }
        self.notify_parameter(index as i32, value, send_osc, send_callback);
    }

    /// Negative indices address the macro controls; others are matched
    /// against the format-native index.
    pub fn set_parameter_value_by_rindex(
        &mut self,
        rindex: i32,
        value: f64,
        send_gui: bool,
        send_osc: bool,
        send_callback: bool,
    ) {
        match InternalParameter::from_index(rindex) {
            Some(InternalParameter::Active) => self.set_active(value > 0.0, send_osc, send_callback),
            Some(InternalParameter::DryWet) => self.set_dry_wet(value, send_osc, send_callback),
            Some(InternalParameter::Volume) => self.set_volume(value, send_osc, send_callback),
            Some(InternalParameter::BalanceLeft) => {
                self.set_balance_left(value, send_osc, send_callback)
            }
            Some(InternalParameter::BalanceRight) => {
                self.set_balance_right(value, send_osc, send_callback)
            }
            None => {
                if let Some(index) = self.params.iter().position(|p| p.data.rindex == rindex) {
                    self.set_parameter_value(index, value, send_gui, send_osc, send_callback);
                }
            }
        }
    }

    pub fn set_parameter_midi_channel(
        &mut self,
        index: usize,
        channel: u8,
        send_osc: bool,
        send_callback: bool,
    ) -> Result<()> {
        let param = self
            .params
            .get_mut(index)
            .ok_or(Error::InvalidParameter(index as i32))?;
        let channel = channel.min(15);
        param.data.midi_channel = channel;
        if send_osc {
            if let Some(sink) = self.notifier.control() {
                sink.set_parameter_midi_channel(self.id, index as i32, channel);
            }
        }
        if send_callback {
            self.notifier.callback(
                CallbackAction::ParameterMidiChannelChanged,
                self.id,
                index as i32,
                channel as i32,
                0.0,
            );
        }
        Ok(())
    }

    /// Bind a parameter to a MIDI controller; -1 (or any controller the host
    /// reserves) removes the binding.
    pub fn set_parameter_midi_cc(
        &mut self,
        index: usize,
        cc: i16,
        send_osc: bool,
        send_callback: bool,
    ) -> Result<()> {
        let param = self
            .params
            .get_mut(index)
            .ok_or(Error::InvalidParameter(index as i32))?;
        let cc = ParameterData::fix_midi_cc(cc);
        param.data.midi_cc = cc;
        if send_osc {
            if let Some(sink) = self.notifier.control() {
                sink.set_parameter_midi_cc(self.id, index as i32, cc);
            }
        }
        if send_callback {
            self.notifier.callback(
                CallbackAction::ParameterMidiCcChanged,
                self.id,
                index as i32,
                cc as i32,
                0.0,
            );
        }
        Ok(())
    }

    pub fn programs(&self) -> &ProgramList {
        &self.programs
    }

    pub fn current_program(&self) -> i32 {
        self.programs.current
    }

    pub fn midi_programs(&self) -> &MidiProgramList {
        &self.midi_programs
    }

    pub fn current_midi_program(&self) -> i32 {
        self.midi_programs.current
    }

    /// Select a program (-1 for none). On a real selection every
    /// parameter's default becomes the value the plugin reports right after
    /// loading the program.
    pub fn set_program(
        &mut self,
        index: i32,
        send_gui: bool,
        send_osc: bool,
        send_callback: bool,
    ) -> Result<()> {
        if !self.programs.is_valid_index(index) {
            return Err(Error::InvalidProgram(index));
        }
        self.programs.current = index;
        if index >= 0 {
            self.backend.set_program(index);
            self.refresh_defaults();
        }
        if send_gui {
            self.backend.ui_program_change(index);
        }
        if send_osc {
            if let Some(sink) = self.notifier.control() {
                sink.set_program(self.id, index);
                if index >= 0 {
                    self.publish_values_and_defaults(sink.as_ref());
                }
            }
        }
        if send_callback {
            self.notifier
                .callback(CallbackAction::ProgramChanged, self.id, index, 0, 0.0);
        }
        Ok(())
    }

    pub fn set_midi_program(
        &mut self,
        index: i32,
        send_gui: bool,
        send_osc: bool,
        send_callback: bool,
    ) -> Result<()> {
        if !self.midi_programs.is_valid_index(index) {
            return Err(Error::InvalidProgram(index));
        }
        self.midi_programs.current = index;
        if index >= 0 {
            self.backend.set_midi_program(index);
            self.refresh_defaults();
        }
        if send_gui {
            self.backend.ui_midi_program_change(index);
        }
        if send_osc {
            if let Some(sink) = self.notifier.control() {
                sink.set_midi_program(self.id, index);
                if index >= 0 {
                    self.publish_values_and_defaults(sink.as_ref());
                }
            }
        }
        if send_callback {
            self.notifier
                .callback(CallbackAction::MidiProgramChanged, self.id, index, 0, 0.0);
        }
        Ok(())
    }

    /// Select the MIDI program with this bank/program pair.
    pub fn set_midi_program_by_id(
        &mut self,
        bank: u32,
        program: u32,
        send_gui: bool,
        send_osc: bool,
        send_callback: bool,
    ) -> Result<()> {
        let index = self
            .midi_programs
            .find(bank, program)
            .ok_or(Error::InvalidProgram(program as i32))?;
        self.set_midi_program(index, send_gui, send_osc, send_callback)
    }

    pub fn midi_program_data(&self, index: i32) -> Option<&MidiProgramData> {
        self.midi_programs.get(index)
    }

    pub(super) fn refresh_defaults(&mut self) {
        for k in 0..self.params.len() {
            let live = self.backend.parameter_value(k);
            let param = &mut self.params[k];
            param.ranges.def = param.fix_value(live);
        }
    }

    pub(super) fn publish_values_and_defaults(&self, sink: &dyn crate::control::ControlSink) {
        for (k, param) in self.params.iter().enumerate() {
            sink.set_default_value(self.id, k as i32, param.ranges.def);
            sink.set_parameter_value(self.id, k as i32, self.backend.parameter_value(k));
        }
    }

    pub fn custom_data(&self) -> &CustomDataList {
        &self.custom_data
    }

    /// Store a key/value pair and hand it to the plugin. A key that already
    /// exists is replaced in place.
    pub fn set_custom_data(&mut self, kind: &str, key: &str, value: &str) -> Result<()> {
        let data = CustomData::new(kind, key, value);
        if data.kind.is_empty() || data.key.is_empty() {
            return Err(Error::InvalidCustomData(format!(
                "type '{}' and key '{}' must be non-empty",
                kind, key
            )));
        }
        self.backend.set_custom_data(&data)?;
        self.custom_data.set(data)
    }

    pub fn chunk_data(&mut self) -> Option<Vec<u8>> {
        if self.hints.contains(PluginHints::USES_CHUNKS) {
            self.backend.chunk()
        } else {
            None
        }
    }

    pub fn set_chunk_data(&mut self, chunk: &[u8]) -> Result<()> {
        if !self.hints.contains(PluginHints::USES_CHUNKS) {
            return Err(Error::InvalidCustomData(format!(
                "plugin '{}' does not use chunks",
                self.name
            )));
        }
        self.backend.set_chunk(chunk)
    }
}
