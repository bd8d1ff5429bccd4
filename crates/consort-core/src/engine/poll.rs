//! Low-priority poll thread: drains postponed events, idles plugin GUIs and
//! republishes output parameters and peaks to the control UI.

use super::Engine;
use crate::types::PluginHints;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::Weak;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub(crate) struct PollThread {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl PollThread {
    pub(crate) fn spawn(engine: Weak<Engine>, interval: Duration) -> std::io::Result<Self> {
        let (stop, stop_rx) = bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("consort-poll".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => match engine.upgrade() {
                        Some(engine) => engine.poll_once(),
                        None => break,
                    },
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        Ok(Self { stop, handle })
    }

    /// Ask the thread to exit and join it, waiting at most `timeout`. A
    /// thread still busy after that is detached.
    pub(crate) fn stop(self, timeout: Duration) {
        let _ = self.stop.try_send(());
        let deadline = Instant::now() + timeout;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!("poll thread did not stop within {:?}, detaching", timeout);
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        if self.handle.join().is_err() {
            tracing::error!("poll thread panicked");
        }
    }
}

impl Engine {
    /// One poll pass over every enabled plugin.
    ///
    /// Each slot is locked only to drain and snapshot it; output values and
    /// peaks go to the sink after the lock is released.
    pub fn poll_once(&self) {
        let sink = self.notifier.control();
        let mut outputs: Vec<(i32, f64)> = Vec::new();
        for (id, slot) in self.registry.slots()[..self.registry.scan_len()]
            .iter()
            .enumerate()
        {
            outputs.clear();
            let (has_ins, has_outs) = {
                let mut guard = slot.state.lock();
                let Some(state) = guard.as_deref_mut().filter(|s| s.is_enabled()) else {
                    continue;
                };
                // Single-threaded plugins are drained by `Engine::idle`.
                if !state.hints().contains(PluginHints::USES_SINGLE_THREAD) {
                    state.post_events_run();
                    if !state.is_bridge() {
                        state.idle();
                    }
                }
                if sink.is_none() {
                    continue;
                }
                outputs.extend(
                    state
                        .parameters()
                        .iter()
                        .enumerate()
                        .filter(|(_, param)| param.is_output())
                        .map(|(k, _)| (k as i32, state.parameter_value(k))),
                );
                (state.audio_in_count() > 0, state.audio_out_count() > 0)
            };

            let Some(ref sink) = sink else {
                continue;
            };
            let id = id as u32;
            for &(index, value) in &outputs {
                sink.set_parameter_value(id, index, value);
            }
            let peaks = slot.peaks.load();
            if has_ins {
                sink.set_input_peak_value(id, 1, peaks[0]);
                sink.set_input_peak_value(id, 2, peaks[1]);
            }
            if has_outs {
                sink.set_output_peak_value(id, 1, peaks[2]);
                sink.set_output_peak_value(id, 2, peaks[3]);
            }
        }
    }
}
