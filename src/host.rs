//! ConsortHost: one engine, its control channel and its bridge loader.

use crate::core::{
    last_error, Engine, LoadRequest, PluginId, PluginState, SavedState, Transport,
};
use crate::osc::{ControlChannel, OscUrl};
use crate::{ConsortHostBuilder, Result};
use std::sync::Arc;

#[cfg(feature = "bridge")]
use crate::bridge::BridgeLoader;

/// Main entry point of the host.
///
/// Owns the [`Engine`], the [`ControlChannel`] publishing it over OSC and,
/// with the `bridge` feature, the [`BridgeLoader`] that runs plugins in
/// `consort-bridge` child processes. Dropping the host closes all three:
/// plugins are removed first so bridges can still say goodbye over the
/// channel.
///
/// # Example
///
/// ```ignore
/// use consort::prelude::*;
///
/// let host = ConsortHost::builder().dummy_driver().build()?;
///
/// let gain = host.add_plugin(LoadRequest::internal("gain"))?;
/// host.with_plugin(gain, |plugin| plugin.set_parameter_value(0, 0.5, true, true, true))?;
///
/// let saved = host.save_plugin_state(gain)?;
/// ```
pub struct ConsortHost {
    engine: Arc<Engine>,
    channel: ControlChannel,
    #[cfg(feature = "bridge")]
    loader: Arc<BridgeLoader>,
}

impl std::fmt::Debug for ConsortHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsortHost")
            .field("engine", &self.engine)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl ConsortHost {
    pub fn builder() -> ConsortHostBuilder {
        ConsortHostBuilder::default()
    }

    pub(crate) fn from_parts(
        engine: Arc<Engine>,
        channel: ControlChannel,
        #[cfg(feature = "bridge")] loader: Arc<BridgeLoader>,
    ) -> Self {
        Self {
            engine,
            channel,
            #[cfg(feature = "bridge")]
            loader,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn channel(&self) -> &ControlChannel {
        &self.channel
    }

    #[cfg(feature = "bridge")]
    pub fn bridge_loader(&self) -> &Arc<BridgeLoader> {
        &self.loader
    }

    /// Where a control UI sends `/register`.
    pub fn url(&self) -> OscUrl {
        self.channel.url()
    }

    pub fn tcp_url(&self) -> Option<OscUrl> {
        self.channel.tcp_url()
    }

    pub fn transport(&self) -> &Transport {
        self.engine.transport()
    }

    /// Load a plugin into the next free slot.
    ///
    /// On failure no slot stays occupied; the message is also available from
    /// [`last_error`](crate::core::last_error) on this thread.
    pub fn add_plugin(&self, request: LoadRequest) -> Result<PluginId> {
        let label = request.label.clone();
        match self.engine.add_plugin(request) {
            Ok(id) => Ok(id),
            Err(e) => {
                tracing::warn!(%label, "add_plugin failed: {}", last_error());
                Err(e.into())
            }
        }
    }

    /// In rack mode every higher id moves down by one.
    pub fn remove_plugin(&self, id: PluginId) -> Result<()> {
        Ok(self.engine.remove_plugin(id)?)
    }

    pub fn plugin_ids(&self) -> Vec<PluginId> {
        self.engine.plugin_ids()
    }

    pub fn with_plugin<R>(&self, id: PluginId, f: impl FnOnce(&mut PluginState) -> R) -> Result<R> {
        Ok(self.engine.with_plugin(id, f)?)
    }

    pub fn save_plugin_state(&self, id: PluginId) -> Result<SavedState> {
        Ok(self.engine.save_plugin_state(id)?)
    }

    pub fn load_plugin_state(&self, id: PluginId, saved: &SavedState) -> Result<()> {
        Ok(self.engine.load_plugin_state(id, saved)?)
    }

    /// Process one rack block on the calling thread. For hosts built with
    /// [`manual`](ConsortHostBuilder::manual) or without a driver.
    pub fn process(&self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], frames: usize) {
        self.engine.process(inputs, outputs, &[], frames);
    }

    /// Close the engine, then the channel. Idempotent.
    pub fn close(&mut self) {
        self.engine.close();
        #[cfg(feature = "bridge")]
        self.loader.set_channel(None);
        self.channel.close();
    }
}

impl Drop for ConsortHost {
    fn drop(&mut self) {
        self.close();
    }
}
