//! Builder for configuring and constructing a `ConsortHost`.

use crate::core::{AudioDriver, DummyDriver, Engine, EngineConfig, ProcessMode};
use crate::osc::{ControlChannel, OscConfig};
use crate::{ConsortHost, Result};

#[cfg(feature = "bridge")]
use crate::bridge::{BridgeConfig, BridgeLoader};
#[cfg(feature = "bridge")]
use std::path::PathBuf;
#[cfg(feature = "bridge")]
use std::sync::Arc;

/// How the built host drives its engine.
enum Driving {
    /// Nothing runs until the caller starts a driver or the poll thread.
    Manual,
    /// Only the poll thread; blocks are processed by the caller.
    PollOnly,
    /// A dummy driver paced by a timer thread.
    Dummy,
    Driver(Box<dyn AudioDriver>),
}

/// Bridges are enabled whenever the `bridge` feature is compiled; the
/// `consort-bridge` binary must then be reachable (next to the current
/// executable, or set with [`bridge_executable`](Self::bridge_executable)).
///
/// # Example
///
/// ```ignore
/// use consort::prelude::*;
///
/// let host = ConsortHost::builder()
///     .client_name("Consort")
///     .process_mode(ProcessMode::ContinuousRack)
///     .dummy_driver()
///     .build()?;
///
/// println!("control UI can register at {}", host.url());
/// let id = host.add_plugin(LoadRequest::internal("gain"))?;
/// ```
pub struct ConsortHostBuilder {
    engine: EngineConfig,
    osc: OscConfig,
    #[cfg(feature = "bridge")]
    bridge: BridgeConfig,
    driving: Driving,
}

impl Default for ConsortHostBuilder {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            osc: OscConfig::default(),
            #[cfg(feature = "bridge")]
            bridge: BridgeConfig::default(),
            driving: Driving::PollOnly,
        }
    }
}

impl ConsortHostBuilder {
    /// Replace the whole engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.engine = config;
        self
    }

    /// Default: "Consort"
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.engine.client_name = name.into();
        self
    }

    /// Default: `ProcessMode::ContinuousRack`
    pub fn process_mode(mut self, mode: ProcessMode) -> Self {
        self.engine.process_mode = mode;
        self
    }

    /// 0 selects the process mode's maximum.
    pub fn max_plugins(mut self, count: usize) -> Self {
        self.engine.max_plugins = count;
        self
    }

    /// Overridden by the driver's rate when one is started.
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.engine.sample_rate = rate;
        self
    }

    /// Overridden by the driver's buffer size when one is started.
    pub fn buffer_size(mut self, frames: usize) -> Self {
        self.engine.buffer_size = frames;
        self
    }

    pub fn high_precision(mut self, enabled: bool) -> Self {
        self.engine.high_precision = enabled;
        self
    }

    pub fn prefer_bridges(mut self, enabled: bool) -> Self {
        self.engine.prefer_bridges = enabled;
        self
    }

    pub fn osc(mut self, config: OscConfig) -> Self {
        self.osc = config;
        self
    }

    /// Default: 0 (ephemeral)
    pub fn udp_port(mut self, port: u16) -> Self {
        self.osc.udp_port = port;
        self
    }

    /// Also accept OSC over TCP. 0 picks an ephemeral port.
    pub fn tcp_port(mut self, port: u16) -> Self {
        self.osc.tcp_port = Some(port);
        self
    }

    #[cfg(feature = "bridge")]
    pub fn bridge(mut self, config: BridgeConfig) -> Self {
        self.bridge = config;
        self
    }

    #[cfg(feature = "bridge")]
    pub fn bridge_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.bridge.executable = Some(path.into());
        self
    }

    /// Start `driver` once everything is wired. The driver's sample rate and
    /// buffer size win over the configured ones.
    pub fn driver(mut self, driver: Box<dyn AudioDriver>) -> Self {
        self.driving = Driving::Driver(driver);
        self
    }

    /// Drive the engine with a silent, timer-paced [`DummyDriver`] at the
    /// configured sample rate and buffer size.
    pub fn dummy_driver(mut self) -> Self {
        self.driving = Driving::Dummy;
        self
    }

    /// Leave the engine stopped: neither a driver nor the poll thread run
    /// until the caller starts them.
    pub fn manual(mut self) -> Self {
        self.driving = Driving::Manual;
        self
    }

    pub fn build(self) -> Result<ConsortHost> {
        #[cfg(feature = "bridge")]
        self.bridge.validate()?;

        let engine = Engine::new(self.engine)?;
        let channel = match ControlChannel::start(&engine, &self.osc) {
            Ok(channel) => channel,
            Err(e) => {
                engine.close();
                return Err(e.into());
            }
        };

        #[cfg(feature = "bridge")]
        let loader = {
            let loader = Arc::new(BridgeLoader::new(self.bridge));
            loader.set_channel(Some(channel.handle()));
            channel.set_bridge_router(Some(loader.clone()));
            engine.set_loader(loader.clone());
            loader
        };

        let host = ConsortHost::from_parts(
            engine,
            channel,
            #[cfg(feature = "bridge")]
            loader,
        );

        match self.driving {
            Driving::Manual => {}
            Driving::PollOnly => host.engine().start_poll(),
            Driving::Dummy => {
                let engine = host.engine();
                let driver = DummyDriver::new(engine.sample_rate(), engine.buffer_size());
                engine.start(Box::new(driver))?;
            }
            Driving::Driver(driver) => host.engine().start(driver)?,
        }
        tracing::debug!(url = %host.url(), "host ready");
        Ok(host)
    }
}
