//! Reload, engine-setting changes and the full state dump.

use super::PluginState;
use crate::callback::CallbackAction;
use crate::control::ControlSink;
use crate::parameter::{Parameter, ParameterType};
use crate::program::{MidiProgramList, ProgramList};
use crate::types::*;
use crate::{Error, Result};

fn port_name(prefix: &str, index: usize, count: usize) -> String {
    if count > 1 {
        format!("{}_{:02}", prefix, index + 1)
    } else {
        prefix.to_string()
    }
}

impl PluginState {
    /// Rebuild ports and tables from the backend.
    ///
    /// With `init`, the first program (and MIDI program) is selected after
    /// the tables are built. Must not run concurrently with `process`.
    pub fn reload(&mut self, init: bool) -> Result<()> {
        let layout = self.backend.reload()?;
        if layout.audio_ins > MAX_AUDIO_PORTS || layout.audio_outs > MAX_AUDIO_PORTS {
            return Err(Error::LoadFailed(format!(
                "{} has {} inputs and {} outputs, at most {} per direction are supported",
                self.label, layout.audio_ins, layout.audio_outs, MAX_AUDIO_PORTS
            )));
        }
        tracing::debug!(
            id = self.id,
            label = %self.label,
            audio_ins = layout.audio_ins,
            audio_outs = layout.audio_outs,
            parameters = layout.parameters.len(),
            "reloading plugin"
        );

        self.client.clear_ports();
        for i in 0..layout.audio_ins {
            self.client
                .add_audio_port(true, port_name("input", i, layout.audio_ins));
        }
        for i in 0..layout.audio_outs {
            self.client
                .add_audio_port(false, port_name("output", i, layout.audio_outs));
        }
        if layout.midi_in {
            self.client.set_midi_port(true, "midi-in");
        }
        if layout.midi_out {
            self.client.set_midi_port(false, "midi-out");
        }

        self.params = layout
            .parameters
            .iter()
            .enumerate()
            .map(|(k, desc)| Parameter::from_description(k as i32, desc))
            .collect();
        for k in 0..self.params.len() {
            let param = &mut self.params[k];
            if param.data.hints.contains(ParameterHints::USES_SAMPLERATE) {
                param.ranges.min *= self.sample_rate;
                param.ranges.max *= self.sample_rate;
                param.ranges.def *= self.sample_rate;
                param.ranges.fixup();
            }
            if param.data.kind == ParameterType::SampleRate {
                let value = param.fix_value(self.sample_rate);
                self.backend.set_parameter_value(k, value);
            }
        }
        if self.params.iter().any(Parameter::is_input) {
            self.client.set_control_port(true, "control-in");
        }
        if self.params.iter().any(Parameter::is_output) {
            self.client.set_control_port(false, "control-out");
        }

        let ins = layout.audio_ins;
        let outs = layout.audio_outs;
        let bridged = self.hints.contains(PluginHints::IS_BRIDGE);
        let mut hints = layout.hints;
        hints.remove(PluginHints::CAN_DRYWET | PluginHints::CAN_VOLUME | PluginHints::CAN_BALANCE);
        hints.set(PluginHints::IS_BRIDGE, bridged);
        hints.set(PluginHints::CAN_DRYWET, outs > 0 && (ins == outs || ins == 1));
        hints.set(PluginHints::CAN_VOLUME, outs > 0);
        hints.set(PluginHints::CAN_BALANCE, outs >= 2 && outs % 2 == 0);
        self.hints = hints;
        self.category = layout.category;

        self.programs = ProgramList::new(layout.programs);
        self.midi_programs = MidiProgramList::new(layout.midi_programs);

        let rack = self.client.is_rack();
        let extra_ins = if rack { ins.saturating_sub(2) } else { 0 };
        let extra_outs = if rack { outs.saturating_sub(2) } else { 0 };
        self.scratch.resize(self.buffer_size, extra_ins, extra_outs);
        self.scratch.reserve_ports(ins, outs);

        if init {
            if !self.programs.is_empty() {
                self.set_program(0, false, false, false)?;
            }
            if !self.midi_programs.is_empty() {
                self.set_midi_program(0, false, false, false)?;
            }
        }

        self.notifier
            .callback(CallbackAction::ReloadAll, self.id, 0, 0, 0.0);
        Ok(())
    }

    pub fn buffer_size_changed(&mut self, frames: usize) {
        self.buffer_size = frames;
        self.client.buffer_size_changed(frames);
        let extra_ins = self.scratch.extra_in.len();
        let extra_outs = self.scratch.extra_out.len();
        self.scratch.resize(frames, extra_ins, extra_outs);
        self.backend.buffer_size_changed(frames);
    }

    pub fn sample_rate_changed(&mut self, rate: f64) {
        self.sample_rate = rate;
        self.backend.sample_rate_changed(rate);
        for k in 0..self.params.len() {
            if self.params[k].data.kind == ParameterType::SampleRate {
                let value = self.params[k].fix_value(rate);
                self.backend.set_parameter_value(k, value);
            }
        }
    }

    /// Send everything a freshly registered control UI needs to mirror this
    /// plugin, ending with `dump_finished`.
    pub fn send_control_dump(&mut self, sink: &dyn ControlSink) {
        let id = self.id;
        sink.add_plugin(id, &self.name);
        sink.set_plugin_data(id, &self.info());
        sink.set_plugin_ports(id, &self.port_counts());

        for (k, param) in self.params.iter().enumerate() {
            let index = k as i32;
            sink.set_parameter_data(id, index, &param.data, &param.name, &param.unit);
            sink.set_parameter_ranges(id, index, &param.ranges);
            sink.set_parameter_midi_cc(id, index, param.data.midi_cc);
            sink.set_parameter_midi_channel(id, index, param.data.midi_channel);
            sink.set_parameter_value(id, index, self.backend.parameter_value(k));
            sink.set_default_value(id, index, param.ranges.def);
        }

        sink.set_program_count(id, self.programs.count() as u32);
        for (i, name) in self.programs.names.iter().enumerate() {
            sink.set_program_name(id, i as i32, name);
        }
        sink.set_program(id, self.programs.current);

        sink.set_midi_program_count(id, self.midi_programs.count() as u32);
        for (i, data) in self.midi_programs.data.iter().enumerate() {
            sink.set_midi_program_data(id, i as i32, data);
        }
        sink.set_midi_program(id, self.midi_programs.current);

        for data in self.custom_data.iter() {
            sink.set_custom_data(id, data);
        }
        if self.hints.contains(PluginHints::USES_CHUNKS) {
            if let Some(chunk) = self.backend.chunk() {
                sink.set_chunk_data(id, &chunk);
            }
        }

        sink.set_parameter_value(id, PARAMETER_ACTIVE, if self.active { 1.0 } else { 0.0 });
        sink.set_parameter_value(id, PARAMETER_DRYWET, self.dry_wet);
        sink.set_parameter_value(id, PARAMETER_VOLUME, self.volume);
        sink.set_parameter_value(id, PARAMETER_BALANCE_LEFT, self.balance_left);
        sink.set_parameter_value(id, PARAMETER_BALANCE_RIGHT, self.balance_right);

        sink.dump_finished(id);
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::make_state;
    use super::super::{PluginSetup, PluginState};
    use crate::backend::{PluginBackend, PluginLayout, ProcessContext};
    use crate::callback::{HostCallback, Notifier};
    use crate::control::recording::{Call, RecordingSink};
    use crate::loader::LoadRequest;
    use crate::port::EngineClient;
    use crate::postponed::PostponedEvents;
    use crate::time::TimeInfo;
    use crate::types::*;
    use crate::{Error, Result};
    use std::sync::Arc;

    #[test]
    fn test_reload_capabilities() {
        let stereo = make_state("gain", true);
        assert!(stereo.hints().contains(PluginHints::CAN_DRYWET));
        assert!(stereo.hints().contains(PluginHints::CAN_VOLUME));
        assert!(stereo.hints().contains(PluginHints::CAN_BALANCE));
        assert!(stereo.has_control_in());
        assert!(stereo.has_control_out());

        let mono = make_state("passthrough-mono", true);
        assert!(mono.hints().contains(PluginHints::CAN_DRYWET));
        assert!(!mono.hints().contains(PluginHints::CAN_BALANCE));
        assert!(!mono.has_control_in());

        let generator = make_state("dc", true);
        assert!(!generator.hints().contains(PluginHints::CAN_DRYWET));
        assert!(generator.hints().contains(PluginHints::CAN_VOLUME));

        let midi = make_state("midi-transpose", true);
        assert!(!midi.hints().contains(PluginHints::CAN_VOLUME));
        assert!(midi.has_midi_in() && midi.has_midi_out());
    }

    #[test]
    fn test_initial_program_selected() {
        let state = make_state("sine", true);
        assert_eq!(state.current_program(), 0);
        assert_eq!(state.current_midi_program(), 0);
        assert_eq!(state.parameter_value(0), 110.0);
    }

    #[test]
    fn test_port_names() {
        let state = make_state("gain", false);
        let names: Vec<_> = state.client().audio_in.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["input_01", "input_02"]);
        assert_eq!(state.client().audio_in[0].buffer.len(), 64);

        let mono = make_state("passthrough-mono", false);
        assert_eq!(mono.client().audio_out[0].name, "output");
    }

    /// Silent plugin with a configurable number of outputs.
    struct Wide(usize);

    impl PluginBackend for Wide {
        fn label(&self) -> &str {
            "wide"
        }

        fn reload(&mut self) -> Result<PluginLayout> {
            Ok(PluginLayout {
                audio_ins: 1,
                audio_outs: self.0,
                ..Default::default()
            })
        }

        fn parameter_value(&self, _index: usize) -> f64 {
            0.0
        }

        fn set_parameter_value(&mut self, _index: usize, _value: f64) {}

        fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], ctx: &mut ProcessContext<'_>) {
            for output in outputs.iter_mut() {
                output[..ctx.frames].copy_from_slice(&inputs[0][..ctx.frames]);
            }
        }
    }

    fn wide_state(outs: usize) -> PluginState {
        PluginState::new(PluginSetup {
            id: 0,
            request: LoadRequest::internal("wide"),
            name: "wide".into(),
            backend: Box::new(Wide(outs)),
            notifier: Arc::new(Notifier::new(HostCallback::new(16))),
            postponed: Arc::new(PostponedEvents::new(16)),
            client: EngineClient::new("wide", false, 64),
            sample_rate: 48000.0,
            buffer_size: 64,
            high_precision: false,
            bridged: false,
        })
    }

    #[test]
    fn test_reload_rejects_too_many_ports() {
        let mut state = wide_state(MAX_AUDIO_PORTS + 1);
        let err = state.reload(true).unwrap_err();
        assert!(matches!(err, Error::LoadFailed(_)), "{}", err);
    }

    #[test]
    fn test_widest_plugin_runs_on_dedicated_ports() {
        let mut state = wide_state(MAX_AUDIO_PORTS);
        state.reload(true).unwrap();
        state.set_active(true, false, false);
        state.client_mut().audio_in[0].buffer.fill(0.5);
        state.process_dedicated(64, &TimeInfo::default());
        state.process_dedicated(64, &TimeInfo::default());

        let outputs = &state.client().audio_out;
        assert_eq!(outputs.len(), MAX_AUDIO_PORTS);
        assert!(outputs.iter().all(|p| p.buffer.len() == 64 && p.buffer[63] == 0.5));
    }

    #[test]
    fn test_control_dump_sequence() {
        let mut state = make_state("sine", true);
        let sink = RecordingSink::default();
        state.send_control_dump(&sink);
        let calls = sink.take();

        assert_eq!(calls.first(), Some(&Call::AddPlugin(0, "sine".into())));
        assert_eq!(calls.last(), Some(&Call::DumpFinished(0)));
        assert!(calls.contains(&Call::ProgramCount(0, 3)));
        assert!(calls.contains(&Call::ProgramName(0, 2, "High".into())));
        assert!(calls.contains(&Call::Program(0, 0)));
        assert!(calls.contains(&Call::MidiProgramCount(0, 3)));
        assert!(calls.contains(&Call::ParameterValue(0, PARAMETER_VOLUME, 1.0)));
        assert!(calls.contains(&Call::DefaultValue(0, 0, 110.0)));
    }
}
