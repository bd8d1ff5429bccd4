//! Audio-thread processing of a single plugin.
//!
//! Nothing here allocates or blocks: buffers were sized at reload, the
//! external note queue is only try-locked, and every observer-facing change
//! goes through the postponed queue.

use super::PluginState;
use crate::backend::ProcessContext;
use crate::midi::{
    MidiData, MIDI_CONTROL_ALL_NOTES_OFF, MIDI_CONTROL_ALL_SOUND_OFF, MIDI_CONTROL_BALANCE,
    MIDI_CONTROL_BREATH, MIDI_CONTROL_VOLUME,
};
use crate::port::{ControlEvent, ControlEventType, EventBuffer, MidiEvent};
use crate::postponed::PostponedEventType;
use crate::time::TimeInfo;
use crate::types::*;
use smallvec::SmallVec;

/// Frames per sub-block in high-precision mode.
pub const HIGH_PRECISION_FRAMES: usize = 8;

/// Event and transport side of one block.
pub struct ProcessIo<'a> {
    pub control_in: &'a [ControlEvent],
    pub midi_in: &'a [MidiEvent],
    pub control_out: &'a mut EventBuffer<ControlEvent>,
    pub midi_out: &'a mut EventBuffer<MidiEvent>,
    pub time: &'a TimeInfo,
}

// Reload rejects plugins with more ports, so these never spill to the heap.
type AudioIns<'a> = SmallVec<[&'a [f32]; MAX_AUDIO_PORTS]>;
type AudioOuts<'a> = SmallVec<[&'a mut [f32]; MAX_AUDIO_PORTS]>;

impl PluginState {
    /// Process one block with the plugin's ports mapped onto the two rack
    /// channels. Ports beyond the second use silent/discarded scratch.
    pub fn process_rack(
        &mut self,
        rack_in: [&[f32]; 2],
        rack_out: [&mut [f32]; 2],
        io: ProcessIo<'_>,
        frames: usize,
    ) {
        let ins = self.client.audio_in.len();
        let outs = self.client.audio_out.len();
        let mut extra_in = std::mem::take(&mut self.scratch.extra_in);
        let mut extra_out = std::mem::take(&mut self.scratch.extra_out);
        {
            let inputs: AudioIns<'_> = rack_in
                .into_iter()
                .take(ins.min(2))
                .map(|b| &b[..frames])
                .chain(extra_in.iter().map(|b| &b[..frames]))
                .collect();
            let mut outputs: AudioOuts<'_> = rack_out
                .into_iter()
                .take(outs.min(2))
                .map(|b| &mut b[..frames])
                .chain(extra_out.iter_mut().map(|b| &mut b[..frames]))
                .collect();
            self.process(&inputs, &mut outputs, io, frames);
        }
        for buffer in extra_in.iter_mut() {
            buffer.fill(0.0);
        }
        self.scratch.extra_in = extra_in;
        self.scratch.extra_out = extra_out;
    }

    /// Process one block on the plugin's own dedicated ports.
    pub fn process_dedicated(&mut self, frames: usize, time: &TimeInfo) {
        let frames = frames.min(self.buffer_size);
        let mut in_bufs = std::mem::take(&mut self.scratch.port_in);
        let mut out_bufs = std::mem::take(&mut self.scratch.port_out);
        in_bufs.extend(self.client.audio_in.iter_mut().map(|p| std::mem::take(&mut p.buffer)));
        out_bufs.extend(self.client.audio_out.iter_mut().map(|p| std::mem::take(&mut p.buffer)));
        let mut control_in = take_events(&mut self.client.control_in);
        let mut midi_in = take_events(&mut self.client.midi_in);
        let mut control_out = take_events(&mut self.client.control_out);
        let mut midi_out = take_events(&mut self.client.midi_out);
        control_out.clear();
        midi_out.clear();
        {
            let inputs: AudioIns<'_> = in_bufs.iter().map(|b| &b[..frames]).collect();
            let mut outputs: AudioOuts<'_> = out_bufs.iter_mut().map(|b| &mut b[..frames]).collect();
            let io = ProcessIo {
                control_in: control_in.as_slice(),
                midi_in: midi_in.as_slice(),
                control_out: &mut control_out,
                midi_out: &mut midi_out,
                time,
            };
            self.process(&inputs, &mut outputs, io, frames);
        }
        control_in.clear();
        midi_in.clear();
        for (port, buffer) in self.client.audio_in.iter_mut().zip(in_bufs.drain(..)) {
            port.buffer = buffer;
        }
        for (port, buffer) in self.client.audio_out.iter_mut().zip(out_bufs.drain(..)) {
            port.buffer = buffer;
        }
        self.scratch.port_in = in_bufs;
        self.scratch.port_out = out_bufs;
        restore_events(&mut self.client.control_in, control_in);
        restore_events(&mut self.client.midi_in, midi_in);
        restore_events(&mut self.client.control_out, control_out);
        restore_events(&mut self.client.midi_out, midi_out);
    }

    /// Run the plugin for one block.
    ///
    /// `inputs`/`outputs` hold one slice per audio port, each at least
    /// `frames` long.
    pub fn process(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        io: ProcessIo<'_>,
        frames: usize,
    ) {
        let frames = frames.min(self.buffer_size);
        if !self.active {
            if self.active_before {
                self.release_and_deactivate(io.time);
            }
            self.active_before = false;
            bypass(inputs, outputs, frames);
            return;
        }
        if !self.active_before {
            self.backend.activate();
            self.client.activate();
            self.active_before = true;
        }

        for output in outputs.iter_mut() {
            output[..frames].fill(0.0);
        }

        self.scratch.midi.clear();
        self.scratch.midi_discard.clear();
        {
            let midi = &mut self.scratch.midi;
            self.ext_notes
                .try_drain(|note| midi.push(MidiEvent::new(0, note.to_midi())));
        }
        if self.client.midi_in.is_some() {
            for event in io.midi_in {
                if !self.scratch.midi.push(*event) {
                    break;
                }
                self.postpone_note(&event.data);
            }
        }

        let control_in = if self.client.control_in.is_some() {
            io.control_in
        } else {
            &[]
        };
        let step = if self.high_precision {
            HIGH_PRECISION_FRAMES
        } else {
            frames.max(1)
        };
        let has_midi_out = self.client.midi_out.is_some();
        let mut ctrl_cursor = 0;
        let mut midi_cursor = 0;
        let mut notes_off_sent = false;
        let mut offset = 0;

        while offset < frames {
            let end = (offset + step).min(frames);
            let last = end == frames;

            while let Some(event) = control_in.get(ctrl_cursor) {
                if !last && event.time as usize >= end {
                    break;
                }
                self.apply_control_event(event, midi_cursor, &mut notes_off_sent);
                ctrl_cursor += 1;
            }

            let midi_start = midi_cursor;
            while let Some(event) = self.scratch.midi.as_slice().get(midi_cursor) {
                if !last && event.time as usize >= end {
                    break;
                }
                midi_cursor += 1;
            }

            let sub_in: AudioIns<'_> = inputs.iter().map(|b| &b[offset..end]).collect();
            let mut sub_out: AudioOuts<'_> = outputs.iter_mut().map(|b| &mut b[offset..end]).collect();
            let midi_out = if has_midi_out {
                &mut *io.midi_out
            } else {
                &mut self.scratch.midi_discard
            };
            let mut ctx = ProcessContext {
                frames: end - offset,
                frame_offset: offset,
                midi_in: &self.scratch.midi.as_slice()[midi_start..midi_cursor],
                midi_out,
                time: io.time,
                sample_rate: self.sample_rate,
            };
            self.backend.process(&sub_in, &mut sub_out, &mut ctx);
            offset = end;
        }

        self.post_process(inputs, outputs, frames);

        if self.client.control_out.is_some() {
            for (k, param) in self.params.iter().enumerate() {
                if param.is_output() && param.data.midi_cc > 0 {
                    let value = param.ranges.normalize(self.backend.parameter_value(k));
                    io.control_out.push(ControlEvent::parameter(
                        0,
                        param.data.midi_channel,
                        param.data.midi_cc as u16,
                        value,
                    ));
                }
            }
        }
    }

    fn postpone_note(&self, data: &MidiData) {
        if data.is_note_on() {
            self.postponed.postpone(
                PostponedEventType::NoteOn,
                data.channel() as i32,
                data.data[1] as i32,
                data.data[2] as f64,
            );
        } else if data.is_note_off() {
            self.postponed.postpone(
                PostponedEventType::NoteOff,
                data.channel() as i32,
                data.data[1] as i32,
                0.0,
            );
        }
    }

    /// Deactivation edge: send all-notes-off and all-sound-off on every
    /// channel, then deactivate.
    fn release_and_deactivate(&mut self, time: &TimeInfo) {
        self.scratch.midi.clear();
        self.scratch.midi_discard.clear();
        if self.client.midi_in.is_some() {
            for channel in 0..16u8 {
                self.scratch.midi.push(MidiEvent::new(
                    0,
                    MidiData::control_change(channel, MIDI_CONTROL_ALL_NOTES_OFF, 0),
                ));
                self.scratch.midi.push(MidiEvent::new(
                    0,
                    MidiData::control_change(channel, MIDI_CONTROL_ALL_SOUND_OFF, 0),
                ));
            }
            let mut ctx = ProcessContext {
                frames: 0,
                frame_offset: 0,
                midi_in: self.scratch.midi.as_slice(),
                midi_out: &mut self.scratch.midi_discard,
                time,
                sample_rate: self.sample_rate,
            };
            self.backend.process(&[], &mut [], &mut ctx);
        }
        self.backend.deactivate();
        self.client.deactivate();
    }

    fn apply_control_event(&mut self, event: &ControlEvent, midi_cursor: usize, notes_off_sent: &mut bool) {
        if self.ctrl_in_channel < 0 || event.channel as i8 != self.ctrl_in_channel {
            return;
        }
        match event.kind {
            ControlEventType::Null => {}
            ControlEventType::Parameter => self.apply_controller(event),
            ControlEventType::MidiBank => self.next_bank = event.param as u32,
            ControlEventType::MidiProgram => {
                if let Some(index) = self.midi_programs.find(self.next_bank, event.param as u32) {
                    if self.set_midi_program(index, false, false, false).is_ok() {
                        self.postponed
                            .postpone(PostponedEventType::MidiProgramChange, index, 0, 0.0);
                    }
                }
            }
            ControlEventType::AllSoundOff | ControlEventType::AllNotesOff => {
                if self.client.midi_in.is_some() && !*notes_off_sent {
                    let control = if event.kind == ControlEventType::AllSoundOff {
                        MIDI_CONTROL_ALL_SOUND_OFF
                    } else {
                        MIDI_CONTROL_ALL_NOTES_OFF
                    };
                    let midi = MidiEvent::new(
                        event.time,
                        MidiData::control_change(event.channel, control, 0),
                    );
                    let position = self.scratch.midi.as_slice()[midi_cursor..]
                        .iter()
                        .position(|e| e.time > event.time)
                        .map_or(self.scratch.midi.len(), |p| p + midi_cursor);
                    self.scratch.midi.insert(position, midi);
                    self.postponed.fill_note_offs(event.channel);
                    *notes_off_sent = true;
                }
                if event.kind == ControlEventType::AllSoundOff {
                    self.postponed
                        .postpone(PostponedEventType::ParameterChange, PARAMETER_ACTIVE, 0, 0.0);
                    self.postponed
                        .postpone(PostponedEventType::ParameterChange, PARAMETER_ACTIVE, 0, 1.0);
                }
            }
        }
    }

    fn apply_controller(&mut self, event: &ControlEvent) {
        let cc = event.param;
        if cc == MIDI_CONTROL_BREATH as u16 && self.hints.contains(PluginHints::CAN_DRYWET) {
            self.dry_wet = event.value.clamp(0.0, 1.0);
            self.postponed
                .postpone(PostponedEventType::ParameterChange, PARAMETER_DRYWET, 0, self.dry_wet);
            return;
        }
        if cc == MIDI_CONTROL_VOLUME as u16 && self.hints.contains(PluginHints::CAN_VOLUME) {
            self.volume = (event.value * 127.0 / 100.0).clamp(0.0, MAX_VOLUME);
            self.postponed
                .postpone(PostponedEventType::ParameterChange, PARAMETER_VOLUME, 0, self.volume);
            return;
        }
        if cc == MIDI_CONTROL_BALANCE as u16 && self.hints.contains(PluginHints::CAN_BALANCE) {
            let (left, right) = balance_from_controller(event.value);
            self.balance_left = left;
            self.balance_right = right;
            self.postponed
                .postpone(PostponedEventType::ParameterChange, PARAMETER_BALANCE_LEFT, 0, left);
            self.postponed
                .postpone(PostponedEventType::ParameterChange, PARAMETER_BALANCE_RIGHT, 0, right);
            return;
        }

        for k in 0..self.params.len() {
            let param = &self.params[k];
            if !param.is_automable()
                || param.data.midi_channel != event.channel
                || param.data.midi_cc != cc as i16
            {
                continue;
            }
            let value = if param.data.hints.contains(ParameterHints::BOOLEAN) {
                if event.value < 0.5 {
                    param.ranges.min
                } else {
                    param.ranges.max
                }
            } else {
                param.ranges.unnormalize(event.value)
            };
            let value = param.fix_value(value);
            self.set_parameter_value(k, value, false, false, false);
            self.postponed
                .postpone(PostponedEventType::ParameterChange, k as i32, 0, value);
        }
    }

    /// Dry/wet, balance and volume, in that order per channel.
    fn post_process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], frames: usize) {
        let do_drywet = self.hints.contains(PluginHints::CAN_DRYWET) && self.dry_wet != 1.0;
        let do_volume = self.hints.contains(PluginHints::CAN_VOLUME) && self.volume != 1.0;
        let do_balance = self.hints.contains(PluginHints::CAN_BALANCE)
            && (self.balance_left != -1.0 || self.balance_right != 1.0);
        if !(do_drywet || do_volume || do_balance) {
            return;
        }

        let wet = self.dry_wet as f32;
        let volume = self.volume as f32;
        let range_left = ((self.balance_left + 1.0) / 2.0) as f32;
        let range_right = ((self.balance_right + 1.0) / 2.0) as f32;
        let old_left = &mut self.scratch.old_left;
        let count = outputs.len();

        for i in 0..count {
            if do_drywet && !inputs.is_empty() {
                let input = if inputs.len() == 1 { inputs[0] } else { inputs[i] };
                for (out, dry) in outputs[i][..frames].iter_mut().zip(&input[..frames]) {
                    *out = *out * wet + dry * (1.0 - wet);
                }
            }

            if do_balance && (i % 2 == 1 || i + 1 < count) {
                if i % 2 == 0 {
                    old_left[..frames].copy_from_slice(&outputs[i][..frames]);
                    let (head, tail) = outputs.split_at_mut(i + 1);
                    let right = &tail[0][..frames];
                    for (k, out) in head[i][..frames].iter_mut().enumerate() {
                        *out = old_left[k] * (1.0 - range_left) + right[k] * (1.0 - range_right);
                    }
                } else {
                    for (k, out) in outputs[i][..frames].iter_mut().enumerate() {
                        *out = *out * range_right + old_left[k] * range_left;
                    }
                }
            }

            if do_volume {
                for out in outputs[i][..frames].iter_mut() {
                    *out *= volume;
                }
            }
        }
    }
}

/// Map a normalized balance controller to (left, right) channel positions.
fn balance_from_controller(value: f64) -> (f64, f64) {
    let value = value / 0.5 - 1.0;
    if value < 0.0 {
        (-1.0, value * 2.0 + 1.0)
    } else if value > 0.0 {
        (value * 2.0 - 1.0, 1.0)
    } else {
        (-1.0, 1.0)
    }
}

/// Inactive plugins pass audio straight through.
fn bypass(inputs: &[&[f32]], outputs: &mut [&mut [f32]], frames: usize) {
    for (i, output) in outputs.iter_mut().enumerate() {
        match inputs.get(i) {
            Some(input) => output[..frames].copy_from_slice(&input[..frames]),
            None => output[..frames].fill(0.0),
        }
    }
}

fn take_events<T: Copy>(port: &mut Option<crate::port::EventPort<T>>) -> EventBuffer<T> {
    match port {
        Some(port) => std::mem::replace(&mut port.buffer, EventBuffer::with_capacity(0)),
        None => EventBuffer::with_capacity(0),
    }
}

fn restore_events<T: Copy>(port: &mut Option<crate::port::EventPort<T>>, buffer: EventBuffer<T>) {
    if let Some(port) = port {
        port.buffer = buffer;
    }
}
