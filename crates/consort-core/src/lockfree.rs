//! Lock-free primitives shared between the audio thread and the rest.

use atomic_float::AtomicF32;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cache-line aligned atomic f32, used for peak meters.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFloat {
    value: AtomicF32,
}

impl AtomicFloat {
    pub fn new(value: f32) -> Self {
        Self {
            value: AtomicF32::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.value.store(value, Ordering::Release);
    }
}

impl Default for AtomicFloat {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Cache-line aligned atomic bool.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self {
            value: AtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Default for AtomicFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Input and output peaks for one plugin slot, two channels each.
#[derive(Debug, Default)]
pub struct PeakMeters {
    input: [AtomicFloat; 2],
    output: [AtomicFloat; 2],
}

impl PeakMeters {
    /// Audio thread only.
    #[inline]
    pub fn store(&self, peaks: [f32; 4]) {
        self.input[0].set(peaks[0]);
        self.input[1].set(peaks[1]);
        self.output[0].set(peaks[2]);
        self.output[1].set(peaks[3]);
    }

    #[inline]
    pub fn load(&self) -> [f32; 4] {
        [
            self.input[0].get(),
            self.input[1].get(),
            self.output[0].get(),
            self.output[1].get(),
        ]
    }

    pub fn input(&self, channel: usize) -> f32 {
        self.input.get(channel).map_or(0.0, AtomicFloat::get)
    }

    pub fn set_input(&self, channel: usize, value: f32) {
        if let Some(meter) = self.input.get(channel) {
            meter.set(value);
        }
    }

    pub fn set_output(&self, channel: usize, value: f32) {
        if let Some(meter) = self.output.get(channel) {
            meter.set(value);
        }
    }

    pub fn output(&self, channel: usize) -> f32 {
        self.output.get(channel).map_or(0.0, AtomicFloat::get)
    }

    pub fn reset(&self) {
        self.store([0.0; 4]);
    }
}
