//! Raw MIDI helpers and the external note queue.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MIDI_STATUS_NOTE_OFF: u8 = 0x80;
pub const MIDI_STATUS_NOTE_ON: u8 = 0x90;
pub const MIDI_STATUS_POLYPHONIC_AFTERTOUCH: u8 = 0xA0;
pub const MIDI_STATUS_CONTROL_CHANGE: u8 = 0xB0;
pub const MIDI_STATUS_PROGRAM_CHANGE: u8 = 0xC0;
pub const MIDI_STATUS_AFTERTOUCH: u8 = 0xD0;
pub const MIDI_STATUS_PITCH_WHEEL: u8 = 0xE0;

pub const MIDI_CONTROL_BANK_SELECT: u8 = 0x00;
pub const MIDI_CONTROL_BREATH: u8 = 0x02;
pub const MIDI_CONTROL_VOLUME: u8 = 0x07;
pub const MIDI_CONTROL_BALANCE: u8 = 0x08;
pub const MIDI_CONTROL_ALL_SOUND_OFF: u8 = 0x78;
pub const MIDI_CONTROL_ALL_NOTES_OFF: u8 = 0x7B;

/// Highest controller a parameter may be bound to.
pub const MAX_MIDI_CC: i16 = 95;

/// Capacity of the external note queue.
pub const MAX_MIDI_NOTE: usize = 512;

#[inline]
pub fn status(byte: u8) -> u8 {
    byte & 0xF0
}

#[inline]
pub fn channel(byte: u8) -> u8 {
    byte & 0x0F
}

/// Controllers that may be assigned to a parameter: 0..=95 minus the ones
/// the host handles itself (bank select, breath, volume, balance).
pub fn is_assignable_cc(cc: i16) -> bool {
    (0..=MAX_MIDI_CC).contains(&cc)
        && !matches!(
            cc as u8,
            MIDI_CONTROL_BANK_SELECT | MIDI_CONTROL_BREATH | MIDI_CONTROL_VOLUME | MIDI_CONTROL_BALANCE
        )
}

/// Up to three bytes of a short MIDI message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiData {
    pub size: u8,
    pub data: [u8; 3],
}

impl MidiData {
    pub fn new(bytes: &[u8]) -> Self {
        let mut data = [0u8; 3];
        let size = bytes.len().min(3);
        data[..size].copy_from_slice(&bytes[..size]);
        Self {
            size: size as u8,
            data,
        }
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(&[MIDI_STATUS_NOTE_ON | (channel & 0x0F), note & 0x7F, velocity & 0x7F])
    }

    pub fn note_off(channel: u8, note: u8) -> Self {
        Self::new(&[MIDI_STATUS_NOTE_OFF | (channel & 0x0F), note & 0x7F, 0])
    }

    pub fn control_change(channel: u8, control: u8, value: u8) -> Self {
        Self::new(&[
            MIDI_STATUS_CONTROL_CHANGE | (channel & 0x0F),
            control & 0x7F,
            value & 0x7F,
        ])
    }

    #[inline]
    pub fn status(&self) -> u8 {
        status(self.data[0])
    }

    #[inline]
    pub fn channel(&self) -> u8 {
        channel(self.data[0])
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.size as usize]
    }

    /// Note-on with velocity 0 counts as a note-off.
    pub fn is_note_on(&self) -> bool {
        self.status() == MIDI_STATUS_NOTE_ON && self.data[2] != 0
    }

    pub fn is_note_off(&self) -> bool {
        self.status() == MIDI_STATUS_NOTE_OFF
            || (self.status() == MIDI_STATUS_NOTE_ON && self.data[2] == 0)
    }
}

/// A note injected from outside the audio thread (API, OSC, bridge).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalNote {
    pub channel: u8,
    pub note: u8,
    /// 0 means note-off.
    pub velocity: u8,
}

impl ExternalNote {
    pub fn to_midi(self) -> MidiData {
        if self.velocity == 0 {
            MidiData::note_off(self.channel, self.note)
        } else {
            MidiData::note_on(self.channel, self.note, self.velocity)
        }
    }
}

/// Fixed-capacity note queue guarded by the MIDI lock. Writers block briefly;
/// the audio thread only ever uses [`ExternalNoteQueue::try_drain`].
#[derive(Debug, Clone)]
pub struct ExternalNoteQueue {
    inner: Arc<Mutex<Vec<ExternalNote>>>,
}

impl Default for ExternalNoteQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalNoteQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::with_capacity(MAX_MIDI_NOTE))),
        }
    }

    /// Returns false when the queue is full and the note was dropped.
    pub fn push(&self, note: ExternalNote) -> bool {
        let mut queue = self.inner.lock();
        if queue.len() >= MAX_MIDI_NOTE {
            return false;
        }
        queue.push(note);
        true
    }

    /// Queue a note-off for every note on `channel`.
    pub fn push_all_notes_off(&self, channel: u8) {
        let mut queue = self.inner.lock();
        for note in 0..128u8 {
            if queue.len() >= MAX_MIDI_NOTE {
                break;
            }
            queue.push(ExternalNote {
                channel,
                note,
                velocity: 0,
            });
        }
    }

    /// Hand each queued note to `f` and clear the queue. Returns without doing
    /// anything if another thread holds the MIDI lock.
    pub fn try_drain(&self, mut f: impl FnMut(ExternalNote) -> bool) {
        if let Some(mut queue) = self.inner.try_lock() {
            for note in queue.iter().copied() {
                if !f(note) {
                    break;
                }
            }
            queue.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
