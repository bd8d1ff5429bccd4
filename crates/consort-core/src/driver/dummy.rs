//! Thread-timed driver with silent inputs and discarded outputs. Used by
//! the bridge child and by tests.

use super::AudioDriver;
use crate::engine::Engine;
use crate::lockfree::AtomicFlag;
use crate::Result;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct DummyDriver {
    sample_rate: f64,
    buffer_size: usize,
    running: Arc<AtomicFlag>,
    thread: Option<JoinHandle<()>>,
}

impl DummyDriver {
    pub fn new(sample_rate: f64, buffer_size: usize) -> Self {
        Self {
            sample_rate,
            buffer_size: buffer_size.max(1),
            running: Arc::new(AtomicFlag::new(false)),
            thread: None,
        }
    }

    fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.buffer_size as f64 / self.sample_rate)
    }
}

impl AudioDriver for DummyDriver {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn start(&mut self, engine: Weak<Engine>) -> Result<()> {
        if self.running.swap(true) {
            return Ok(());
        }
        let running = self.running.clone();
        let frames = self.buffer_size;
        let sample_rate = self.sample_rate;
        let period = self.block_duration();

        let handle = std::thread::Builder::new()
            .name("consort-dummy-driver".into())
            .spawn(move || {
                let silence = vec![0.0f32; frames];
                let mut left = vec![0.0f32; frames];
                let mut right = vec![0.0f32; frames];
                let mut next = Instant::now();
                while running.get() {
                    let Some(engine) = engine.upgrade() else {
                        break;
                    };
                    engine.process(&[&silence, &silence], &mut [&mut left, &mut right], &[], frames);
                    engine.transport().advance(frames as u64, sample_rate);
                    drop(engine);

                    next += period;
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
                running.set(false);
            });
        match handle {
            Ok(handle) => {
                self.thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.set(false);
                Err(e.into())
            }
        }
    }

    fn stop(&mut self) {
        self.running.set(false);
        if let Some(handle) = self.thread.take() {
            // Dropped from inside the driver thread along with the engine.
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!("dummy driver thread panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.get()
    }
}

impl Drop for DummyDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
