//! Built-in plugins.
//!
//! Small, real-time safe processors that need no external binary. They back
//! the `Internal` plugin type and double as fixtures for the engine.

use crate::backend::{PluginBackend, PluginLayout, ProcessContext};
use crate::custom_data::{CustomData, CUSTOM_DATA_STRING};
use crate::midi::MidiData;
use crate::parameter::{ParameterDescription, ParameterRanges};
use crate::port::MidiEvent;
use crate::program::MidiProgramData;
use crate::types::{ParameterHints, PluginCategory, PluginHints};
use crate::{Error, Result};
use std::f64::consts::TAU;

/// Labels accepted by [`create`].
pub const INTERNAL_LABELS: &[&str] = &[
    "passthrough",
    "passthrough-mono",
    "gain",
    "sine",
    "dc",
    "midi-transpose",
];

/// Instantiate a built-in plugin by label.
pub fn create(label: &str, sample_rate: f64) -> Option<Box<dyn PluginBackend>> {
    let backend: Box<dyn PluginBackend> = match label {
        "passthrough" => Box::new(Passthrough::new(2)),
        "passthrough-mono" => Box::new(Passthrough::new(1)),
        "gain" => Box::new(Gain::new()),
        "sine" => Box::new(Sine::new(sample_rate)),
        "dc" => Box::new(Dc::new()),
        "midi-transpose" => Box::new(MidiTranspose::new()),
        _ => return None,
    };
    Some(backend)
}

const MAKER: &str = "Consort";
const COPYRIGHT: &str = "MIT OR Apache-2.0";

fn copy_through(inputs: &[&[f32]], outputs: &mut [&mut [f32]], frames: usize) {
    for (output, input) in outputs.iter_mut().zip(inputs.iter()) {
        output[..frames].copy_from_slice(&input[..frames]);
    }
}

/// Copies every input to the matching output.
pub struct Passthrough {
    channels: usize,
    label: &'static str,
}

impl Passthrough {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            label: if channels == 1 {
                "passthrough-mono"
            } else {
                "passthrough"
            },
        }
    }
}

impl PluginBackend for Passthrough {
    fn label(&self) -> &str {
        self.label
    }

    fn maker(&self) -> &str {
        MAKER
    }

    fn copyright(&self) -> &str {
        COPYRIGHT
    }

    fn real_name(&self) -> &str {
        "Passthrough"
    }

    fn reload(&mut self) -> Result<PluginLayout> {
        Ok(PluginLayout {
            audio_ins: self.channels,
            audio_outs: self.channels,
            hints: PluginHints::IS_RTSAFE,
            category: PluginCategory::Utility,
            ..Default::default()
        })
    }

    fn parameter_value(&self, _index: usize) -> f64 {
        0.0
    }

    fn set_parameter_value(&mut self, _index: usize, _value: f64) {}

    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], ctx: &mut ProcessContext<'_>) {
        copy_through(inputs, outputs, ctx.frames);
    }
}

/// Stereo gain with an output level meter parameter.
pub struct Gain {
    gain: f64,
    level: f64,
}

impl Gain {
    pub fn new() -> Self {
        Self {
            gain: 1.0,
            level: 0.0,
        }
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginBackend for Gain {
    fn label(&self) -> &str {
        "gain"
    }

    fn maker(&self) -> &str {
        MAKER
    }

    fn copyright(&self) -> &str {
        COPYRIGHT
    }

    fn real_name(&self) -> &str {
        "Gain"
    }

    fn unique_id(&self) -> i64 {
        0x6761_696e
    }

    fn reload(&mut self) -> Result<PluginLayout> {
        Ok(PluginLayout {
            audio_ins: 2,
            audio_outs: 2,
            parameters: vec![
                ParameterDescription::input(0, "Gain", ParameterRanges::new(0.0, 2.0, 1.0)),
                ParameterDescription::output(1, "Level", ParameterRanges::new(0.0, 1.0, 0.0)),
            ],
            hints: PluginHints::IS_RTSAFE,
            category: PluginCategory::Dynamics,
            ..Default::default()
        })
    }

    fn parameter_value(&self, index: usize) -> f64 {
        match index {
            0 => self.gain,
            1 => self.level,
            _ => 0.0,
        }
    }

    fn set_parameter_value(&mut self, index: usize, value: f64) {
        if index == 0 {
            self.gain = value;
        }
    }

    fn parameter_text(&self, index: usize) -> Option<String> {
        (index == 0).then(|| {
            if self.gain <= 0.0 {
                "-inf dB".to_string()
            } else {
                format!("{:.1} dB", 20.0 * self.gain.log10())
            }
        })
    }

    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], ctx: &mut ProcessContext<'_>) {
        let gain = self.gain as f32;
        let mut peak = 0.0f32;
        for (output, input) in outputs.iter_mut().zip(inputs.iter()) {
            for (out, sample) in output[..ctx.frames].iter_mut().zip(&input[..ctx.frames]) {
                *out = sample * gain;
                peak = peak.max(out.abs());
            }
        }
        self.level = (peak as f64).min(1.0);
    }
}

/// Sine generator. Programs select an octave, MIDI notes retune it.
pub struct Sine {
    frequency: f64,
    level: f64,
    phase: f64,
    sample_rate: f64,
}

const SINE_PROGRAMS: [(&str, f64); 3] = [("Low", 110.0), ("Middle", 440.0), ("High", 1760.0)];

impl Sine {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            frequency: 440.0,
            level: 0.5,
            phase: 0.0,
            sample_rate,
        }
    }

    fn note_frequency(note: u8) -> f64 {
        440.0 * 2f64.powf((note as f64 - 69.0) / 12.0)
    }
}

impl PluginBackend for Sine {
    fn label(&self) -> &str {
        "sine"
    }

    fn maker(&self) -> &str {
        MAKER
    }

    fn copyright(&self) -> &str {
        COPYRIGHT
    }

    fn real_name(&self) -> &str {
        "Sine"
    }

    fn unique_id(&self) -> i64 {
        0x7369_6e65
    }

    fn reload(&mut self) -> Result<PluginLayout> {
        Ok(PluginLayout {
            audio_ins: 0,
            audio_outs: 1,
            midi_in: true,
            midi_out: false,
            parameters: vec![
                ParameterDescription::input(
                    0,
                    "Frequency",
                    ParameterRanges::new(20.0, 20000.0, 440.0).with_steps(1.0, 0.1, 100.0),
                )
                .with_hints(ParameterHints::LOGARITHMIC)
                .with_unit("Hz"),
                ParameterDescription::input(1, "Level", ParameterRanges::new(0.0, 1.0, 0.5)),
            ],
            programs: SINE_PROGRAMS.iter().map(|(name, _)| name.to_string()).collect(),
            midi_programs: SINE_PROGRAMS
                .iter()
                .enumerate()
                .map(|(i, (name, _))| MidiProgramData::new(0, i as u32, name))
                .collect(),
            hints: PluginHints::IS_RTSAFE | PluginHints::IS_SYNTH,
            category: PluginCategory::Synth,
        })
    }

    fn parameter_value(&self, index: usize) -> f64 {
        match index {
            0 => self.frequency,
            1 => self.level,
            _ => 0.0,
        }
    }

    fn set_parameter_value(&mut self, index: usize, value: f64) {
        match index {
            0 => self.frequency = value,
            1 => self.level = value,
            _ => {}
        }
    }

    fn set_program(&mut self, index: i32) {
        if let Some((_, frequency)) = usize::try_from(index).ok().and_then(|i| SINE_PROGRAMS.get(i)) {
            self.frequency = *frequency;
        }
    }

    fn set_midi_program(&mut self, index: i32) {
        self.set_program(index);
    }

    fn process(&mut self, _inputs: &[&[f32]], outputs: &mut [&mut [f32]], ctx: &mut ProcessContext<'_>) {
        for event in ctx.midi_in {
            if event.data.is_note_on() {
                self.frequency = Self::note_frequency(event.data.data[1]);
            }
        }
        let increment = TAU * self.frequency / self.sample_rate;
        let Some(output) = outputs.first_mut() else {
            return;
        };
        for sample in output[..ctx.frames].iter_mut() {
            *sample = (self.phase.sin() * self.level) as f32;
            self.phase = (self.phase + increment) % TAU;
        }
    }

    fn sample_rate_changed(&mut self, rate: f64) {
        self.sample_rate = rate;
    }
}

/// Constant generator.
pub struct Dc {
    value: f64,
}

impl Dc {
    pub fn new() -> Self {
        Self { value: 0.5 }
    }
}

impl Default for Dc {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginBackend for Dc {
    fn label(&self) -> &str {
        "dc"
    }

    fn maker(&self) -> &str {
        MAKER
    }

    fn reload(&mut self) -> Result<PluginLayout> {
        Ok(PluginLayout {
            audio_ins: 0,
            audio_outs: 1,
            parameters: vec![ParameterDescription::input(
                0,
                "Value",
                ParameterRanges::new(-1.0, 1.0, 0.5),
            )],
            hints: PluginHints::IS_RTSAFE,
            category: PluginCategory::Utility,
            ..Default::default()
        })
    }

    fn parameter_value(&self, index: usize) -> f64 {
        if index == 0 {
            self.value
        } else {
            0.0
        }
    }

    fn set_parameter_value(&mut self, index: usize, value: f64) {
        if index == 0 {
            self.value = value;
        }
    }

    fn process(&mut self, _inputs: &[&[f32]], outputs: &mut [&mut [f32]], ctx: &mut ProcessContext<'_>) {
        for output in outputs.iter_mut() {
            output[..ctx.frames].fill(self.value as f32);
        }
    }
}

/// Transposes notes; state is also kept as a chunk.
pub struct MidiTranspose {
    semitones: f64,
    description: String,
}

impl MidiTranspose {
    pub fn new() -> Self {
        Self {
            semitones: 0.0,
            description: String::new(),
        }
    }
}

impl Default for MidiTranspose {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginBackend for MidiTranspose {
    fn label(&self) -> &str {
        "midi-transpose"
    }

    fn maker(&self) -> &str {
        MAKER
    }

    fn reload(&mut self) -> Result<PluginLayout> {
        Ok(PluginLayout {
            midi_in: true,
            midi_out: true,
            parameters: vec![ParameterDescription::input(
                0,
                "Semitones",
                ParameterRanges::new(-12.0, 12.0, 0.0).with_steps(1.0, 1.0, 12.0),
            )
            .with_hints(ParameterHints::INTEGER)],
            hints: PluginHints::IS_RTSAFE | PluginHints::USES_CHUNKS,
            category: PluginCategory::Utility,
            ..Default::default()
        })
    }

    fn parameter_value(&self, index: usize) -> f64 {
        if index == 0 {
            self.semitones
        } else {
            0.0
        }
    }

    fn set_parameter_value(&mut self, index: usize, value: f64) {
        if index == 0 {
            self.semitones = value;
        }
    }

    fn set_custom_data(&mut self, data: &CustomData) -> Result<()> {
        if data.kind != CUSTOM_DATA_STRING || data.key != "description" {
            return Err(Error::InvalidCustomData(format!(
                "unsupported key '{}' of type '{}'",
                data.key, data.kind
            )));
        }
        self.description = data.value.clone();
        Ok(())
    }

    fn chunk(&mut self) -> Option<Vec<u8>> {
        Some(format!("{}", self.semitones as i32).into_bytes())
    }

    fn set_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(chunk)
            .map_err(|e| Error::InvalidCustomData(format!("chunk is not utf-8: {}", e)))?;
        let semitones: i32 = text
            .trim()
            .parse()
            .map_err(|e| Error::InvalidCustomData(format!("bad chunk '{}': {}", text, e)))?;
        self.semitones = semitones.clamp(-12, 12) as f64;
        Ok(())
    }

    fn process(&mut self, _inputs: &[&[f32]], _outputs: &mut [&mut [f32]], ctx: &mut ProcessContext<'_>) {
        let shift = self.semitones as i32;
        for event in ctx.midi_in {
            let data = event.data;
            let out = if data.is_note_on() || data.is_note_off() || data.status() == 0xA0 {
                let note = data.data[1] as i32 + shift;
                if !(0..128).contains(&note) {
                    continue;
                }
                MidiData::new(&[data.data[0], note as u8, data.data[2]])
            } else {
                data
            };
            ctx.midi_out.push(MidiEvent {
                time: event.time,
                port: event.port,
                data: out,
            });
        }
    }
}
