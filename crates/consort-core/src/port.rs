//! Engine ports and the per-plugin client that owns them.
//!
//! A port is either bound to a dedicated driver port (its own buffer) or, in
//! rack mode, to the engine's shared rack buffers; rack-bound ports carry no
//! storage of their own.

use crate::midi::MidiData;

/// Capacity of every event buffer.
pub const MAX_ENGINE_EVENTS: usize = 512;

/// Fixed-capacity event list, allocated once and reused every block.
#[derive(Debug, Clone)]
pub struct EventBuffer<T> {
    events: Vec<T>,
    capacity: usize,
}

impl<T: Copy> Default for EventBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> EventBuffer<T> {
    pub fn new() -> Self {
        Self::with_capacity(MAX_ENGINE_EVENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns false (and drops the event) when full. Never allocates.
    #[inline]
    pub fn push(&mut self, event: T) -> bool {
        if self.events.len() >= self.capacity {
            return false;
        }
        self.events.push(event);
        true
    }

    /// Insert at `index` (clamped to the length), shifting later events.
    /// Returns false when full.
    pub fn insert(&mut self, index: usize, event: T) -> bool {
        if self.events.len() >= self.capacity {
            return false;
        }
        let index = index.min(self.events.len());
        self.events.insert(index, event);
        true
    }

    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.events
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    /// Replace the contents with `other`, truncated to capacity.
    pub fn copy_from(&mut self, other: &EventBuffer<T>) {
        self.events.clear();
        let n = other.events.len().min(self.capacity);
        self.events.extend_from_slice(&other.events[..n]);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.events.iter()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControlEventType {
    #[default]
    Null,
    /// A controller value; `param` is the CC number.
    Parameter,
    MidiBank,
    MidiProgram,
    AllSoundOff,
    AllNotesOff,
}

/// Control event in engine form. Parameter values are normalized to [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlEvent {
    pub time: u32,
    pub channel: u8,
    pub kind: ControlEventType,
    pub param: u16,
    pub value: f64,
}

impl ControlEvent {
    pub fn parameter(time: u32, channel: u8, cc: u16, value: f64) -> Self {
        Self {
            time,
            channel,
            kind: ControlEventType::Parameter,
            param: cc,
            value,
        }
    }

    /// Convert a raw controller or program-change message.
    pub fn from_midi(time: u32, data: &MidiData) -> Option<Self> {
        use crate::midi::*;

        let channel = data.channel();
        match data.status() {
            MIDI_STATUS_CONTROL_CHANGE if data.size >= 3 => {
                let control = data.data[1];
                let value = data.data[2];
                let kind = match control {
                    MIDI_CONTROL_BANK_SELECT => ControlEventType::MidiBank,
                    MIDI_CONTROL_ALL_SOUND_OFF => ControlEventType::AllSoundOff,
                    MIDI_CONTROL_ALL_NOTES_OFF => ControlEventType::AllNotesOff,
                    _ => ControlEventType::Parameter,
                };
                let (param, value) = match kind {
                    ControlEventType::Parameter => (control as u16, value as f64 / 127.0),
                    ControlEventType::MidiBank => (value as u16, 0.0),
                    _ => (0, 0.0),
                };
                Some(Self {
                    time,
                    channel,
                    kind,
                    param,
                    value,
                })
            }
            MIDI_STATUS_PROGRAM_CHANGE if data.size >= 2 => Some(Self {
                time,
                channel,
                kind: ControlEventType::MidiProgram,
                param: data.data[1] as u16,
                value: 0.0,
            }),
            _ => None,
        }
    }
}

/// MIDI event in engine form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MidiEvent {
    pub time: u32,
    pub port: u8,
    pub data: MidiData,
}

impl MidiEvent {
    pub fn new(time: u32, data: MidiData) -> Self {
        Self {
            time,
            port: 0,
            data,
        }
    }
}

/// What a port is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortBinding {
    /// Its own driver-facing port and buffer.
    Dedicated,
    /// The engine's shared rack buffers; audio ports carry their rack channel.
    Rack(usize),
}

#[derive(Debug)]
pub struct AudioPort {
    pub name: String,
    pub is_input: bool,
    pub binding: PortBinding,
    pub buffer: Vec<f32>,
}

impl AudioPort {
    fn new(name: String, is_input: bool, binding: PortBinding, frames: usize) -> Self {
        let buffer = match binding {
            PortBinding::Dedicated => vec![0.0; frames],
            PortBinding::Rack(_) => Vec::new(),
        };
        Self {
            name,
            is_input,
            binding,
            buffer,
        }
    }

    fn resize(&mut self, frames: usize) {
        if self.binding == PortBinding::Dedicated {
            self.buffer.resize(frames, 0.0);
        }
    }
}

#[derive(Debug)]
pub struct EventPort<T> {
    pub name: String,
    pub is_input: bool,
    pub binding: PortBinding,
    pub buffer: EventBuffer<T>,
}

impl<T: Copy> EventPort<T> {
    fn new(name: String, is_input: bool, binding: PortBinding) -> Self {
        let capacity = match binding {
            PortBinding::Dedicated => MAX_ENGINE_EVENTS,
            PortBinding::Rack(_) => 0,
        };
        Self {
            name,
            is_input,
            binding,
            buffer: EventBuffer::with_capacity(capacity),
        }
    }
}

/// Driver-facing identity of one plugin and the ports it owns.
///
/// Ports are created during reload and released when the client is dropped
/// with its plugin.
#[derive(Debug)]
pub struct EngineClient {
    name: String,
    rack: bool,
    frames: usize,
    active: bool,
    pub audio_in: Vec<AudioPort>,
    pub audio_out: Vec<AudioPort>,
    pub midi_in: Option<EventPort<MidiEvent>>,
    pub midi_out: Option<EventPort<MidiEvent>>,
    pub control_in: Option<EventPort<ControlEvent>>,
    pub control_out: Option<EventPort<ControlEvent>>,
}

impl EngineClient {
    pub fn new(name: impl Into<String>, rack: bool, frames: usize) -> Self {
        Self {
            name: name.into(),
            rack,
            frames,
            active: false,
            audio_in: Vec::new(),
            audio_out: Vec::new(),
            midi_in: None,
            midi_out: None,
            control_in: None,
            control_out: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_rack(&self) -> bool {
        self.rack
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    fn binding(&self, index: usize) -> PortBinding {
        if self.rack {
            PortBinding::Rack(index)
        } else {
            PortBinding::Dedicated
        }
    }

    pub fn add_audio_port(&mut self, is_input: bool, name: impl Into<String>) {
        let ports = if is_input {
            &self.audio_in
        } else {
            &self.audio_out
        };
        let binding = self.binding(ports.len());
        let port = AudioPort::new(name.into(), is_input, binding, self.frames);
        if is_input {
            self.audio_in.push(port);
        } else {
            self.audio_out.push(port);
        }
    }

    pub fn set_midi_port(&mut self, is_input: bool, name: impl Into<String>) {
        let port = Some(EventPort::new(name.into(), is_input, self.binding(0)));
        if is_input {
            self.midi_in = port;
        } else {
            self.midi_out = port;
        }
    }

    pub fn set_control_port(&mut self, is_input: bool, name: impl Into<String>) {
        let port = Some(EventPort::new(name.into(), is_input, self.binding(0)));
        if is_input {
            self.control_in = port;
        } else {
            self.control_out = port;
        }
    }

    /// Release every port. Called at the start of a reload.
    pub fn clear_ports(&mut self) {
        self.audio_in.clear();
        self.audio_out.clear();
        self.midi_in = None;
        self.midi_out = None;
        self.control_in = None;
        self.control_out = None;
    }

    pub fn buffer_size_changed(&mut self, frames: usize) {
        self.frames = frames;
        for port in self.audio_in.iter_mut().chain(self.audio_out.iter_mut()) {
            port.resize(frames);
        }
    }

    pub fn clear_events(&mut self) {
        for port in [&mut self.midi_in, &mut self.midi_out].into_iter().flatten() {
            port.buffer.clear();
        }
        for port in [&mut self.control_in, &mut self.control_out]
            .into_iter()
            .flatten()
        {
            port.buffer.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_buffer_bounded() {
        let mut buffer = EventBuffer::with_capacity(2);
        assert!(buffer.push(1u32));
        assert!(buffer.push(2));
        assert!(!buffer.push(3));
        assert_eq!(buffer.as_slice(), &[1, 2]);

        let mut other = EventBuffer::with_capacity(1);
        other.copy_from(&buffer);
        assert_eq!(other.as_slice(), &[1]);
    }

    #[test]
    fn test_control_event_from_midi() {
        let cc = ControlEvent::from_midi(5, &MidiData::control_change(2, 7, 127)).unwrap();
        assert_eq!(cc.kind, ControlEventType::Parameter);
        assert_eq!(cc.channel, 2);
        assert_eq!(cc.param, 7);
        assert_eq!(cc.value, 1.0);

        let bank = ControlEvent::from_midi(0, &MidiData::control_change(0, 0, 3)).unwrap();
        assert_eq!(bank.kind, ControlEventType::MidiBank);
        assert_eq!(bank.param, 3);

        let program = ControlEvent::from_midi(0, &MidiData::new(&[0xC1, 9])).unwrap();
        assert_eq!(program.kind, ControlEventType::MidiProgram);
        assert_eq!(program.param, 9);

        assert!(ControlEvent::from_midi(0, &MidiData::note_on(0, 60, 1)).is_none());
    }

    #[test]
    fn test_client_ports_rack_vs_dedicated() {
        let mut rack = EngineClient::new("rack", true, 64);
        rack.add_audio_port(true, "in1");
        rack.add_audio_port(true, "in2");
        assert_eq!(rack.audio_in[1].binding, PortBinding::Rack(1));
        assert!(rack.audio_in[0].buffer.is_empty());

        let mut dedicated = EngineClient::new("multi", false, 64);
        dedicated.add_audio_port(false, "out1");
        assert_eq!(dedicated.audio_out[0].buffer.len(), 64);
        dedicated.buffer_size_changed(128);
        assert_eq!(dedicated.audio_out[0].buffer.len(), 128);

        dedicated.set_midi_port(true, "events-in");
        assert!(dedicated.midi_in.is_some());
        dedicated.clear_ports();
        assert!(dedicated.audio_out.is_empty());
        assert!(dedicated.midi_in.is_none());
    }
}
