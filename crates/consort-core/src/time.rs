//! Transport snapshot shared with the audio thread.

use arc_swap::ArcSwap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbt {
    pub bar: i32,
    pub beat: i32,
    pub tick: i32,
    pub bar_start_tick: f64,
    pub beats_per_bar: f32,
    pub beat_type: f32,
    pub ticks_per_beat: f64,
    pub beats_per_minute: f64,
}

impl Default for Bbt {
    fn default() -> Self {
        Self {
            bar: 1,
            beat: 1,
            tick: 0,
            bar_start_tick: 0.0,
            beats_per_bar: 4.0,
            beat_type: 4.0,
            ticks_per_beat: 1920.0,
            beats_per_minute: 120.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeInfo {
    pub playing: bool,
    /// Sample position of the first frame of the current block.
    pub frame: u64,
    /// Microseconds since the transport started.
    pub time_us: u64,
    pub bbt: Option<Bbt>,
}

impl TimeInfo {
    /// Advance by one block. The sample position and BBT only move while
    /// playing.
    pub fn advanced(&self, frames: u64, sample_rate: f64) -> Self {
        let mut next = *self;
        if !self.playing {
            return next;
        }
        next.frame += frames;
        next.time_us = (next.frame as f64 / sample_rate * 1_000_000.0) as u64;
        if let Some(ref mut bbt) = next.bbt {
            let total_ticks = next.frame as f64 * bbt.beats_per_minute * bbt.ticks_per_beat
                / (60.0 * sample_rate);
            let beats = (total_ticks / bbt.ticks_per_beat).floor();
            let beats_per_bar = bbt.beats_per_bar.max(1.0) as f64;
            let bars = (beats / beats_per_bar).floor();
            bbt.bar = bars as i32 + 1;
            bbt.beat = (beats - bars * beats_per_bar) as i32 + 1;
            bbt.tick = (total_ticks - beats * bbt.ticks_per_beat) as i32;
            bbt.bar_start_tick = bars * beats_per_bar * bbt.ticks_per_beat;
        }
        next
    }
}

/// Lock-free transport cell: written by the driver/control side, read by
/// the audio thread without blocking.
#[derive(Debug)]
pub struct Transport {
    info: ArcSwap<TimeInfo>,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            info: ArcSwap::from_pointee(TimeInfo::default()),
        }
    }
}

impl Transport {
    #[inline]
    pub fn load(&self) -> TimeInfo {
        **self.info.load()
    }

    pub fn store(&self, info: TimeInfo) {
        self.info.store(Arc::new(info));
    }

    pub fn set_playing(&self, playing: bool) {
        self.info.rcu(|current| TimeInfo {
            playing,
            ..**current
        });
    }

    pub fn set_bbt(&self, bbt: Option<Bbt>) {
        self.info.rcu(|current| TimeInfo { bbt, ..**current });
    }

    /// Move forward by one block. Called by the driver after each block.
    pub fn advance(&self, frames: u64, sample_rate: f64) {
        let current = self.load();
        if current.playing {
            self.store(current.advanced(frames, sample_rate));
        }
    }

    pub fn locate(&self, frame: u64, sample_rate: f64) {
        self.info.rcu(|current| {
            let stopped = TimeInfo {
                playing: true,
                frame: 0,
                time_us: 0,
                ..**current
            };
            TimeInfo {
                playing: current.playing,
                ..stopped.advanced(frame, sample_rate)
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_transport_does_not_move() {
        let info = TimeInfo::default();
        assert_eq!(info.advanced(512, 48000.0), info);
    }

    #[test]
    fn test_bbt_advances() {
        let info = TimeInfo {
            playing: true,
            bbt: Some(Bbt::default()),
            ..Default::default()
        };
        // 120 BPM at 48 kHz: one beat is 24000 frames.
        let next = info.advanced(24000 * 5, 48000.0);
        let bbt = next.bbt.unwrap();
        assert_eq!(next.frame, 120000);
        assert_eq!(bbt.bar, 2);
        assert_eq!(bbt.beat, 2);
        assert_eq!(bbt.tick, 0);
        assert_eq!(next.time_us, 2_500_000);
    }

    #[test]
    fn test_transport_cell() {
        let transport = Transport::default();
        transport.set_playing(true);
        assert!(transport.load().playing);
        transport.locate(48000, 48000.0);
        assert_eq!(transport.load().frame, 48000);
        assert!(transport.load().playing);
    }
}
