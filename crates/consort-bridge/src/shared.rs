//! Host-side mirror of a bridged plugin.
//!
//! [`BridgeShared`] is written by the OSC thread as reports arrive and read
//! by the supervisor, the backend and the audio thread. It never touches the
//! engine's process lock: a handshake runs while the engine holds it.

use crate::protocol::BridgeReport;
use crate::state::BridgeState;
use crate::{BridgeError, Result};
use arc_swap::ArcSwapOption;
use atomic_float::AtomicF64;
use consort_core::{
    AtomicFlag, CustomDataList, MidiProgramData, ParameterDescription,
    ParameterHints, ParameterRanges, ParameterType, PeakMeters, PluginCategory, PluginHints,
    PluginId, PluginLayout, PostponedEvent, PostponedEventType, PostponedEvents,
};
use consort_osc::OscUrl;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

/// Largest parameter count a child may announce.
pub const MAX_BRIDGE_PARAMETERS: u32 = 4096;

/// Largest program or MIDI program count a child may announce.
pub const MAX_BRIDGE_PROGRAMS: u32 = 4096;

/// One parameter as introspected by the child.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeParameter {
    pub description: ParameterDescription,
    pub midi_channel: u8,
    /// Last value reported during the handshake.
    pub value: f64,
}

/// Everything the handshake dump tells the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeInfo {
    pub category: PluginCategory,
    pub hints: PluginHints,
    pub name: String,
    pub label: String,
    pub maker: String,
    pub copyright: String,
    pub real_name: String,
    pub unique_id: i64,
    pub audio_ins: usize,
    pub audio_outs: usize,
    pub midi_ins: usize,
    pub midi_outs: usize,
    pub parameters: Vec<BridgeParameter>,
    pub programs: Vec<String>,
    pub current_program: i32,
    pub midi_programs: Vec<MidiProgramData>,
    pub current_midi_program: i32,
    pub custom_data: CustomDataList,
    pub chunk: Option<Vec<u8>>,
}

impl BridgeInfo {
    /// The layout the host-side plugin state is built from.
    pub fn layout(&self) -> PluginLayout {
        PluginLayout {
            audio_ins: self.audio_ins,
            audio_outs: self.audio_outs,
            midi_in: self.midi_ins > 0,
            midi_out: self.midi_outs > 0,
            parameters: self
                .parameters
                .iter()
                .map(|p| {
                    let mut description = p.description.clone();
                    // The child already scaled these ranges.
                    description.hints.remove(ParameterHints::USES_SAMPLERATE);
                    description
                })
                .collect(),
            programs: self.programs.clone(),
            midi_programs: self.midi_programs.clone(),
            hints: self.hints,
            category: self.category,
        }
    }

    /// Parameters exist only once `parameter_count` announced them.
    fn parameter_mut(&mut self, index: i32) -> Result<&mut BridgeParameter> {
        let count = self.parameters.len();
        usize::try_from(index)
            .ok()
            .and_then(|i| self.parameters.get_mut(i))
            .ok_or_else(|| {
                BridgeError::Protocol(format!("parameter {} out of range (count {})", index, count))
            })
    }
}

#[derive(Debug)]
pub struct BridgeShared {
    id: AtomicU32,
    state: Mutex<BridgeState>,
    info: Mutex<BridgeInfo>,
    /// Live parameter values, frozen in size when the handshake completes.
    values: OnceLock<Vec<AtomicF64>>,
    peaks: PeakMeters,
    saved: AtomicFlag,
    child_url: ArcSwapOption<OscUrl>,
    error: Mutex<Option<String>>,
    /// The host-side plugin's queue; runtime reports land here.
    postponed: Arc<PostponedEvents>,
}

impl BridgeShared {
    pub fn new(id: PluginId, postponed: Arc<PostponedEvents>) -> Self {
        Self {
            id: AtomicU32::new(id),
            state: Mutex::new(BridgeState::Spawned),
            info: Mutex::new(BridgeInfo {
                current_program: -1,
                current_midi_program: -1,
                ..Default::default()
            }),
            values: OnceLock::new(),
            peaks: PeakMeters::default(),
            saved: AtomicFlag::new(false),
            child_url: ArcSwapOption::empty(),
            error: Mutex::new(None),
            postponed,
        }
    }

    pub fn id(&self) -> PluginId {
        self.id.load(Ordering::Acquire)
    }

    pub fn set_id(&self, id: PluginId) {
        self.id.store(id, Ordering::Release);
    }

    pub fn state(&self) -> BridgeState {
        *self.state.lock()
    }

    pub fn transition(&self, to: BridgeState) -> Result<()> {
        self.state.lock().transition(to)
    }

    /// Mark the handshake failed. No-op once past the handshake.
    pub fn fail(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        if state.can_transition(BridgeState::Failed) {
            let _ = state.transition(BridgeState::Failed);
            self.error.lock().get_or_insert_with(|| reason.into());
        }
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().clone()
    }

    pub fn info(&self) -> BridgeInfo {
        self.info.lock().clone()
    }

    pub fn child_url(&self) -> Option<Arc<OscUrl>> {
        self.child_url.load_full()
    }

    pub fn peaks(&self) -> [f32; 4] {
        self.peaks.load()
    }

    pub fn is_saved(&self) -> bool {
        self.saved.get()
    }

    pub fn clear_saved(&self) {
        self.saved.set(false);
    }

    /// Lock-free; usable from the audio thread.
    pub fn value(&self, index: usize) -> f64 {
        self.values
            .get()
            .and_then(|values| values.get(index))
            .map_or(0.0, |v| v.load(Ordering::Acquire))
    }

    /// Lock-free; usable from the audio thread.
    /// Returns false for an index the handshake never announced.
    pub fn store_value(&self, index: usize, value: f64) -> bool {
        match self.values.get().and_then(|values| values.get(index)) {
            Some(slot) => {
                slot.store(value, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn chunk(&self) -> Option<Vec<u8>> {
        self.info.lock().chunk.clone()
    }

    pub fn set_chunk(&self, chunk: &[u8]) {
        self.info.lock().chunk = Some(chunk.to_vec());
    }

    /// Runtime reports are forwarded to the host plugin only once it exists.
    fn attached(&self) -> bool {
        self.values.get().is_some()
    }

    fn postpone(&self, event: PostponedEvent) {
        if self.attached() {
            self.postponed.push(event);
        }
    }

    /// Apply one report from the child.
    pub fn handle_report(&self, report: BridgeReport) -> Result<()> {
        match report {
            BridgeReport::PluginInfo {
                category,
                hints,
                name,
                label,
                maker,
                copyright,
                real_name,
                unique_id,
            } => {
                let mut info = self.info.lock();
                info.category = PluginCategory::from_i32(category);
                info.hints = PluginHints::from_bits_truncate(hints);
                info.name = name;
                info.label = label;
                info.maker = maker;
                info.copyright = copyright;
                info.real_name = real_name;
                info.unique_id = unique_id;
            }
            BridgeReport::AudioCount { ins, outs } => {
                let mut info = self.info.lock();
                info.audio_ins = ins as usize;
                info.audio_outs = outs as usize;
            }
            BridgeReport::MidiCount { ins, outs } => {
                let mut info = self.info.lock();
                info.midi_ins = ins as usize;
                info.midi_outs = outs as usize;
            }
            BridgeReport::ParameterCount { total, .. } => {
                if self.attached() {
                    return Err(BridgeError::Protocol("parameter count after handshake".into()));
                }
                let total = checked_count(total, MAX_BRIDGE_PARAMETERS, "parameter")?;
                self.info
                    .lock()
                    .parameters
                    .resize_with(total, BridgeParameter::default);
            }
            BridgeReport::ParameterInfo { index, name, unit } => {
                let mut info = self.info.lock();
                let param = info.parameter_mut(index)?;
                param.description.name = name;
                param.description.unit = unit;
            }
            BridgeReport::ParameterData {
                index,
                kind,
                rindex,
                hints,
                midi_channel,
                midi_cc,
            } => {
                let mut info = self.info.lock();
                let param = info.parameter_mut(index)?;
                param.description.kind = ParameterType::from_i32(kind);
                param.description.rindex = rindex;
                param.description.hints = ParameterHints::from_bits_truncate(hints);
                param.description.midi_cc = midi_cc;
                param.midi_channel = midi_channel;
            }
            BridgeReport::ParameterRanges { index, mut ranges } => {
                ranges.fixup();
                self.info.lock().parameter_mut(index)?.description.ranges = ranges;
            }
            BridgeReport::ProgramCount(count) => {
                let count = checked_count(count, MAX_BRIDGE_PROGRAMS, "program")?;
                self.info.lock().programs.resize(count, String::new());
            }
            BridgeReport::ProgramInfo { index, name } => {
                let mut info = self.info.lock();
                match usize::try_from(index).ok().and_then(|i| info.programs.get_mut(i)) {
                    Some(slot) => *slot = name,
                    None => return Err(BridgeError::Protocol(format!("program {} out of range", index))),
                }
            }
            BridgeReport::MidiProgramCount(count) => {
                let count = checked_count(count, MAX_BRIDGE_PROGRAMS, "MIDI program")?;
                self.info
                    .lock()
                    .midi_programs
                    .resize_with(count, MidiProgramData::default);
            }
            BridgeReport::MidiProgramInfo { index, data } => {
                let mut info = self.info.lock();
                match usize::try_from(index).ok().and_then(|i| info.midi_programs.get_mut(i)) {
                    Some(slot) => *slot = data,
                    None => {
                        return Err(BridgeError::Protocol(format!(
                            "MIDI program {} out of range",
                            index
                        )))
                    }
                }
            }
            BridgeReport::SetParameterValue { index, value } => {
                let Ok(k) = usize::try_from(index) else {
                    return Ok(());
                };
                if self.attached() {
                    if !self.store_value(k, value) {
                        return Err(BridgeError::Protocol(format!("parameter {} out of range", index)));
                    }
                    self.postpone(PostponedEvent::new(
                        PostponedEventType::ParameterChange,
                        index,
                        0,
                        value,
                    ));
                } else {
                    self.info.lock().parameter_mut(index)?.value = value;
                }
            }
            BridgeReport::SetDefaultValue { index, value } => {
                if index >= 0 {
                    let mut info = self.info.lock();
                    let ranges = &mut info.parameter_mut(index)?.description.ranges;
                    ranges.def = value.clamp(ranges.min, ranges.max);
                }
            }
            BridgeReport::SetProgram(index) => {
                self.info.lock().current_program = index;
                self.postpone(PostponedEvent::new(PostponedEventType::ProgramChange, index, 0, 0.0));
            }
            BridgeReport::SetMidiProgram(index) => {
                self.info.lock().current_midi_program = index;
                self.postpone(PostponedEvent::new(
                    PostponedEventType::MidiProgramChange,
                    index,
                    0,
                    0.0,
                ));
            }
            BridgeReport::NoteOn {
                channel,
                note,
                velocity,
            } => self.postpone(PostponedEvent::new(
                PostponedEventType::NoteOn,
                channel as i32,
                note as i32,
                velocity as f64,
            )),
            BridgeReport::NoteOff { channel, note } => self.postpone(PostponedEvent::new(
                PostponedEventType::NoteOff,
                channel as i32,
                note as i32,
                0.0,
            )),
            BridgeReport::SetCustomData(data) => {
                if let Err(e) = self.info.lock().custom_data.set(data.clone()) {
                    return Err(BridgeError::Protocol(e.to_string()));
                }
                self.postpone(PostponedEvent::custom(0, Some(Arc::new(data))));
            }
            BridgeReport::SetChunkData(chunk) => self.set_chunk(&chunk),
            BridgeReport::InputPeak { port, value } => {
                self.peaks.set_input(port.saturating_sub(1) as usize, value)
            }
            BridgeReport::OutputPeak { port, value } => {
                self.peaks.set_output(port.saturating_sub(1) as usize, value)
            }
            BridgeReport::Saved => self.saved.set(true),
            BridgeReport::Update(url) => {
                let url = OscUrl::parse(&url)?;
                self.child_url.store(Some(Arc::new(url)));
                self.finish_handshake()?;
            }
            BridgeReport::Error(message) => {
                tracing::warn!(id = self.id(), "bridge error: {}", message);
                self.fail(message);
            }
        }
        Ok(())
    }

    fn finish_handshake(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != BridgeState::Handshaking {
            return Ok(());
        }
        let values = self
            .info
            .lock()
            .parameters
            .iter()
            .map(|p| AtomicF64::new(p.value))
            .collect();
        let _ = self.values.set(values);
        state.transition(BridgeState::Ready)?;
        tracing::debug!(id = self.id(), "bridge handshake complete");
        Ok(())
    }
}

fn checked_count(count: u32, max: u32, what: &str) -> Result<usize> {
    if count > max {
        return Err(BridgeError::Protocol(format!(
            "{} count {} exceeds {}",
            what, count, max
        )));
    }
    Ok(count as usize)
}
