//! Per-block processing: the linear rack chain and the dedicated-port
//! modes.

use super::registry::PluginSlot;
use super::Engine;
use crate::config::ProcessMode;
use crate::plugin::{PluginState, ProcessIo};
use crate::port::{ControlEvent, EventBuffer, MidiEvent};
use crate::time::TimeInfo;

/// Shared rack buffers, reused every block. Locked by the audio thread and,
/// briefly, by buffer-size changes and [`Engine::with_rack_output`].
#[derive(Debug)]
pub(crate) struct RackBuffers {
    audio_in: [Vec<f32>; 2],
    audio_out: [Vec<f32>; 2],
    control_in: EventBuffer<ControlEvent>,
    control_out: EventBuffer<ControlEvent>,
    midi_in: EventBuffer<MidiEvent>,
    midi_out: EventBuffer<MidiEvent>,
}

impl RackBuffers {
    pub(crate) fn new(frames: usize) -> Self {
        Self {
            audio_in: [vec![0.0; frames], vec![0.0; frames]],
            audio_out: [vec![0.0; frames], vec![0.0; frames]],
            control_in: EventBuffer::new(),
            control_out: EventBuffer::new(),
            midi_in: EventBuffer::new(),
            midi_out: EventBuffer::new(),
        }
    }

    pub(crate) fn resize(&mut self, frames: usize) {
        for buffer in self.audio_in.iter_mut().chain(self.audio_out.iter_mut()) {
            buffer.clear();
            buffer.resize(frames, 0.0);
        }
    }

    fn capacity(&self) -> usize {
        self.audio_in[0].len()
    }

    /// MIDI produced by the last plugin of the chain in the last block.
    pub(crate) fn midi_out(&self) -> &[MidiEvent] {
        self.midi_out.as_slice()
    }

    pub(crate) fn control_out(&self) -> &[ControlEvent] {
        self.control_out.as_slice()
    }

    /// The previous slot's outputs become this slot's inputs.
    fn advance(&mut self, frames: usize) {
        for ch in 0..2 {
            let (input, output) = (&mut self.audio_in[ch], &mut self.audio_out[ch]);
            input[..frames].copy_from_slice(&output[..frames]);
            output[..frames].fill(0.0);
        }
        self.control_in.copy_from(&self.control_out);
        self.midi_in.copy_from(&self.midi_out);
        self.control_out.clear();
        self.midi_out.clear();
    }
}

/// Max absolute sample over the block.
#[inline]
pub(crate) fn peak(buffer: &[f32]) -> f32 {
    buffer.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

impl Engine {
    /// Audio-thread entry point.
    ///
    /// In rack mode `inputs`/`outputs` are the two rack channels and
    /// `midi_in` is split into control and note events. In the other modes
    /// every plugin reads and writes its own ports; `outputs` is silenced.
    pub fn process(&self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], midi_in: &[MidiEvent], frames: usize) {
        match self.config.process_mode {
            ProcessMode::ContinuousRack => self.process_rack(inputs, outputs, midi_in, frames),
            ProcessMode::SingleClient | ProcessMode::MultipleClients => {
                for output in outputs.iter_mut() {
                    let n = frames.min(output.len());
                    output[..n].fill(0.0);
                }
                self.process_clients(frames);
            }
        }
    }

    fn process_rack(&self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], midi_in: &[MidiEvent], frames: usize) {
        let silence: &[f32] = &[];
        let input = |ch: usize| inputs.get(ch).copied().unwrap_or(silence);

        let mut rack = self.rack.lock();
        let frames = frames
            .min(rack.capacity())
            .min(outputs.iter().map(|b| b.len()).min().unwrap_or(frames));

        for ch in 0..2 {
            let source = input(ch);
            let n = frames.min(source.len());
            rack.audio_in[ch][..n].copy_from_slice(&source[..n]);
            rack.audio_in[ch][n..frames].fill(0.0);
            rack.audio_out[ch][..frames].fill(0.0);
        }
        rack.control_in.clear();
        rack.midi_in.clear();
        rack.control_out.clear();
        rack.midi_out.clear();
        for event in midi_in {
            match ControlEvent::from_midi(event.time, &event.data) {
                Some(control) => rack.control_in.push(control),
                None => rack.midi_in.push(*event),
            };
        }

        let time = self.transport.load();
        let mut processed = false;
        for slot in &self.registry.slots()[..self.registry.scan_len()] {
            let mut guard = slot.state.lock();
            let Some(state) = guard.as_deref_mut().filter(|s| s.is_enabled()) else {
                continue;
            };
            if processed {
                rack.advance(frames);
            }
            process_rack_slot(&mut rack, state, slot, &time, frames);
            processed = true;
        }

        if processed {
            for (ch, output) in outputs.iter_mut().take(2).enumerate() {
                output[..frames].copy_from_slice(&rack.audio_out[ch][..frames]);
            }
            for output in outputs.iter_mut().skip(2) {
                output[..frames].fill(0.0);
            }
        } else {
            let buffers = &mut *rack;
            buffers.midi_out.copy_from(&buffers.midi_in);
            buffers.control_out.copy_from(&buffers.control_in);
            drop(rack);
            copy_through(inputs, outputs, frames);
        }
    }

    /// Multi-client modes: every plugin on its own ports, in id order.
    pub fn process_clients(&self, frames: usize) {
        let time = self.transport.load();
        for slot in &self.registry.slots()[..self.registry.scan_len()] {
            let mut guard = slot.state.lock();
            let Some(state) = guard.as_deref_mut().filter(|s| s.is_enabled()) else {
                continue;
            };
            state.process_dedicated(frames, &time);

            let peaks = state.reported_peaks().unwrap_or_else(|| {
                let client = state.client();
                let n = frames.min(state.buffer_size());
                let port_peak = |ports: &[crate::port::AudioPort], ch: usize| {
                    ports.get(ch).map_or(0.0, |p| peak(&p.buffer[..n.min(p.buffer.len())]))
                };
                [
                    port_peak(&client.audio_in, 0),
                    port_peak(&client.audio_in, 1),
                    port_peak(&client.audio_out, 0),
                    port_peak(&client.audio_out, 1),
                ]
            });
            slot.peaks.store(peaks);
        }
    }
}

fn process_rack_slot(
    rack: &mut RackBuffers,
    state: &mut PluginState,
    slot: &PluginSlot,
    time: &TimeInfo,
    frames: usize,
) {
    let RackBuffers {
        audio_in,
        audio_out,
        control_in,
        control_out,
        midi_in,
        midi_out,
    } = rack;
    let [in_left, in_right] = audio_in;
    let [out_left, out_right] = audio_out;

    {
        let io = ProcessIo {
            control_in: control_in.as_slice(),
            midi_in: midi_in.as_slice(),
            control_out: &mut *control_out,
            midi_out: &mut *midi_out,
            time,
        };
        state.process_rack(
            [&in_left[..frames], &in_right[..frames]],
            [&mut out_left[..frames], &mut out_right[..frames]],
            io,
            frames,
        );
    }

    // Generators mix onto the carried signal.
    if state.audio_in_count() == 0 {
        for (out, carried) in out_left[..frames].iter_mut().zip(&in_left[..frames]) {
            *out += carried;
        }
        for (out, carried) in out_right[..frames].iter_mut().zip(&in_right[..frames]) {
            *out += carried;
        }
    }
    if !state.has_midi_out() {
        for event in midi_in.iter() {
            if !midi_out.push(*event) {
                break;
            }
        }
    }
    if !state.has_control_out() {
        for event in control_in.iter() {
            if !control_out.push(*event) {
                break;
            }
        }
    }

    let peaks = state.reported_peaks().unwrap_or_else(|| {
        [
            peak(&in_left[..frames]),
            peak(&in_right[..frames]),
            peak(&out_left[..frames]),
            peak(&out_right[..frames]),
        ]
    });
    slot.peaks.store(peaks);
}

fn copy_through(inputs: &[&[f32]], outputs: &mut [&mut [f32]], frames: usize) {
    for (ch, output) in outputs.iter_mut().enumerate() {
        let n = frames.min(output.len());
        match inputs.get(ch) {
            Some(input) => {
                let m = n.min(input.len());
                output[..m].copy_from_slice(&input[..m]);
                output[m..n].fill(0.0);
            }
            None => output[..n].fill(0.0),
        }
    }
}
