//! Postponed events: changes captured on the audio thread and published
//! later by the poll thread.

use crate::custom_data::CustomData;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostponedEventType {
    #[default]
    Null,
    Debug,
    /// value1 = parameter index (negative for macro controls), value3 = value.
    ParameterChange,
    /// value1 = program index.
    ProgramChange,
    /// value1 = MIDI program index.
    MidiProgramChange,
    /// value1 = channel, value2 = note, value3 = velocity.
    NoteOn,
    /// value1 = channel, value2 = note.
    NoteOff,
    /// Format or bridge specific, carries optional custom data.
    Custom,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostponedEvent {
    pub kind: PostponedEventType,
    pub value1: i32,
    pub value2: i32,
    pub value3: f64,
    pub data: Option<Arc<CustomData>>,
}

impl PostponedEvent {
    pub fn new(kind: PostponedEventType, value1: i32, value2: i32, value3: f64) -> Self {
        Self {
            kind,
            value1,
            value2,
            value3,
            data: None,
        }
    }

    pub fn custom(value1: i32, data: Option<Arc<CustomData>>) -> Self {
        Self {
            kind: PostponedEventType::Custom,
            value1,
            value2: 0,
            value3: 0.0,
            data,
        }
    }
}

/// Fixed-capacity postponed-event queue with its own lock.
///
/// Pushing never allocates: the storage is reserved up front and the
/// overflow is dropped and counted.
#[derive(Debug)]
pub struct PostponedEvents {
    capacity: usize,
    queue: Mutex<Vec<PostponedEvent>>,
    dropped: AtomicU64,
}

impl PostponedEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(Vec::with_capacity(capacity)),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns false if the queue was full and the event dropped.
    pub fn push(&self, event: PostponedEvent) -> bool {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            drop(queue);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        queue.push(event);
        true
    }

    #[inline]
    pub fn postpone(&self, kind: PostponedEventType, value1: i32, value2: i32, value3: f64) -> bool {
        self.push(PostponedEvent::new(kind, value1, value2, value3))
    }

    /// Take everything queued so far, leaving the queue empty.
    ///
    /// The replacement storage is allocated before the lock is taken so
    /// the audio thread never waits on an allocation.
    pub fn take(&self) -> Vec<PostponedEvent> {
        let mut fresh = Vec::with_capacity(self.capacity);
        std::mem::swap(&mut *self.queue.lock(), &mut fresh);
        fresh
    }

    /// Queue one note-off per note on `channel`, after whatever is already
    /// pending, so observers see each note released individually. Notes that
    /// do not fit are dropped and counted like any other overflow.
    pub fn fill_note_offs(&self, channel: u8) {
        let mut queue = self.queue.lock();
        let room = self.capacity.saturating_sub(queue.len()).min(128);
        queue.extend((0..room as i32).map(|note| {
            PostponedEvent::new(PostponedEventType::NoteOff, channel as i32, note, 0.0)
        }));
        drop(queue);
        if room < 128 {
            self.dropped.fetch_add((128 - room) as u64, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_drops_without_corruption() {
        let events = PostponedEvents::new(150);
        for i in 0..200 {
            let accepted = events.postpone(PostponedEventType::ParameterChange, i, 0, i as f64);
            assert_eq!(accepted, i < 150);
        }
        assert_eq!(events.len(), 150);
        assert_eq!(events.dropped(), 50);

        let taken = events.take();
        assert_eq!(taken.len(), 150);
        for (i, event) in taken.iter().enumerate() {
            assert_eq!(event.kind, PostponedEventType::ParameterChange);
            assert_eq!(event.value1, i as i32);
            assert_eq!(event.value3, i as f64);
        }
        assert!(events.is_empty());
    }

    #[test]
    fn test_fill_note_offs() {
        let events = PostponedEvents::new(150);
        events.fill_note_offs(4);
        let taken = events.take();
        assert_eq!(taken.len(), 128);
        assert!(taken
            .iter()
            .enumerate()
            .all(|(i, e)| e.kind == PostponedEventType::NoteOff
                && e.value1 == 4
                && e.value2 == i as i32));
        assert_eq!(events.dropped(), 0);
    }

    #[test]
    fn test_fill_note_offs_keeps_pending_events() {
        let events = PostponedEvents::new(150);
        events.postpone(PostponedEventType::ParameterChange, 3, 0, 0.75);
        events.postpone(PostponedEventType::ProgramChange, 1, 0, 0.0);
        events.fill_note_offs(0);

        let taken = events.take();
        assert_eq!(taken.len(), 130);
        assert_eq!(
            taken[0],
            PostponedEvent::new(PostponedEventType::ParameterChange, 3, 0, 0.75)
        );
        assert_eq!(taken[1].kind, PostponedEventType::ProgramChange);
        assert_eq!(taken[2].kind, PostponedEventType::NoteOff);
        assert_eq!(taken[2].value2, 0);
        assert_eq!(taken[129].value2, 127);
    }

    #[test]
    fn test_fill_note_offs_drops_overflow() {
        let events = PostponedEvents::new(150);
        for i in 0..40 {
            events.postpone(PostponedEventType::Debug, i, 0, 0.0);
        }
        events.fill_note_offs(0);
        let taken = events.take();
        assert_eq!(taken.len(), 150);
        assert!(taken[..40].iter().all(|e| e.kind == PostponedEventType::Debug));
        assert_eq!(taken[149].kind, PostponedEventType::NoteOff);
        assert_eq!(taken[149].value2, 109);
        assert_eq!(events.dropped(), 18);
    }
}
