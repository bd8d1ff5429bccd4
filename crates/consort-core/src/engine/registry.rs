//! Fixed-size plugin arena addressed by id.
//!
//! Each slot owns its plugin behind its own mutex. The audio thread locks
//! every occupied slot once per block, so every other thread holds slot
//! locks for short, bounded operations only.

use crate::lockfree::PeakMeters;
use crate::plugin::PluginState;
use crate::types::PluginId;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub(crate) struct PluginSlot {
    pub(crate) state: Mutex<Option<Box<PluginState>>>,
    pub(crate) peaks: PeakMeters,
}

#[derive(Debug)]
pub(crate) struct Registry {
    slots: Box<[PluginSlot]>,
    /// Rack mode: number of contiguous occupied slots.
    /// Other modes: number of occupied slots.
    count: AtomicUsize,
    rack: bool,
}

impl Registry {
    pub(crate) fn new(max_plugins: usize, rack: bool) -> Self {
        Self {
            slots: (0..max_plugins).map(|_| PluginSlot::default()).collect(),
            count: AtomicUsize::new(0),
            rack,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Upper bound of ids the audio thread has to visit.
    #[inline]
    pub(crate) fn scan_len(&self) -> usize {
        if self.rack {
            self.count()
        } else {
            self.slots.len()
        }
    }

    #[inline]
    pub(crate) fn slot(&self, id: PluginId) -> Option<&PluginSlot> {
        self.slots.get(id as usize)
    }

    pub(crate) fn slots(&self) -> &[PluginSlot] {
        &self.slots
    }

    pub(crate) fn lock(&self, id: PluginId) -> Option<MutexGuard<'_, Option<Box<PluginState>>>> {
        self.slot(id).map(|slot| slot.state.lock())
    }

    /// First free id: the end of the chain in rack mode, the first empty
    /// slot otherwise. Off the audio thread only.
    pub(crate) fn new_plugin_id(&self) -> Option<PluginId> {
        if self.rack {
            let count = self.count();
            return (count < self.slots.len()).then_some(count as PluginId);
        }
        self.slots
            .iter()
            .position(|slot| slot.state.lock().is_none())
            .map(|i| i as PluginId)
    }

    /// Publish a plugin into its (empty) slot.
    pub(crate) fn insert(&self, id: PluginId, state: Box<PluginState>) {
        if let Some(slot) = self.slot(id) {
            slot.peaks.reset();
            *slot.state.lock() = Some(state);
            if self.rack {
                self.count.store(id as usize + 1, Ordering::Release);
            } else {
                self.count.fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    /// Take a plugin out. In rack mode the slots above `id` move down by
    /// one and their plugins are renumbered.
    pub(crate) fn remove(&self, id: PluginId) -> Option<Box<PluginState>> {
        let slot = self.slot(id)?;
        let mut removed = slot.state.lock().take()?;
        removed.set_enabled(false);

        if self.rack {
            let count = self.count();
            for i in (id as usize + 1)..count {
                let moved = self.slots[i].state.lock().take();
                if let Some(mut state) = moved {
                    state.set_id((i - 1) as PluginId);
                    *self.slots[i - 1].state.lock() = Some(state);
                }
                self.slots[i - 1].peaks.store(self.slots[i].peaks.load());
            }
            self.slots[count.saturating_sub(1)].peaks.reset();
            self.count.store(count.saturating_sub(1), Ordering::Release);
        } else {
            slot.peaks.reset();
            self.count.fetch_sub(1, Ordering::AcqRel);
        }
        Some(removed)
    }

    /// Every occupied id, ascending.
    pub(crate) fn ids(&self) -> Vec<PluginId> {
        (0..self.scan_len())
            .filter(|&i| self.slots[i].state.lock().is_some())
            .map(|i| i as PluginId)
            .collect()
    }
}
