//! Audio drivers: what calls [`Engine::process`](crate::Engine::process)
//! once per block.

mod dummy;
#[cfg(feature = "cpal")]
mod output;

pub use dummy::DummyDriver;
#[cfg(feature = "cpal")]
pub use output::CpalDriver;

use crate::engine::Engine;
use crate::Result;
use std::sync::Weak;

pub trait AudioDriver: Send {
    fn name(&self) -> &str;

    fn sample_rate(&self) -> f64;

    fn buffer_size(&self) -> usize;

    /// Begin calling `engine.process` from the driver's thread. The driver
    /// holds the engine weakly and stops when it goes away.
    fn start(&mut self, engine: Weak<Engine>) -> Result<()>;

    fn stop(&mut self);

    fn is_running(&self) -> bool;
}
