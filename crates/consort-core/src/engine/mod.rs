//! The plugin host engine.
//!
//! [`Engine`] owns the plugin registry, the global sample rate and buffer
//! size, the transport and the peak meters, and runs the per-block
//! processing (see [`Engine::process`]).
//!
//! # Locking
//!
//! - The audio thread processes every enabled plugin. It takes each slot
//!   lock in id order, so every other holder of a slot lock keeps it for a
//!   short, bounded section with no I/O: control sinks and the host callback
//!   only enqueue.
//! - Long operations (saving, loading, renaming) take the plugin out of its
//!   slot first; the audio thread then treats it as disabled.
//! - A single process lock serializes structural changes (add, remove,
//!   rename, scoped disable) and control-side plugin access.
//! - The poll thread is stopped before any add or remove and restarted
//!   afterwards.

mod poll;
mod rack;
mod registry;

use crate::callback::{CallbackAction, HostCallback, Notifier};
use crate::config::{EngineConfig, ProcessMode};
use crate::control::ControlSink;
use crate::driver::AudioDriver;
use crate::error::{record, set_last_error};
use crate::lockfree::AtomicFlag;
use crate::loader::{InternalLoader, LoadContext, LoadRequest, PluginLoader};
use crate::plugin::{PluginSetup, PluginState, SavedState};
use crate::port::{ControlEvent, EngineClient, MidiEvent};
use crate::postponed::PostponedEvents;
use crate::time::Transport;
use crate::types::*;
use crate::{Error, Result};
use atomic_float::AtomicF64;
use parking_lot::{Mutex, RwLock};
use poll::PollThread;
use rack::RackBuffers;
use registry::Registry;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Bounded wait for the poll thread to finish its current pass.
const POLL_STOP_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Engine {
    config: EngineConfig,
    weak_self: Weak<Engine>,
    loader: RwLock<Arc<dyn PluginLoader>>,
    notifier: Arc<Notifier>,
    registry: Registry,
    process_lock: Mutex<()>,
    rack: Mutex<RackBuffers>,
    transport: Transport,
    sample_rate: AtomicF64,
    buffer_size: AtomicUsize,
    poll: Mutex<Option<PollThread>>,
    driver: Mutex<Option<Box<dyn AudioDriver>>>,
    running: AtomicFlag,
    closed: AtomicFlag,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("client_name", &self.config.client_name)
            .field("process_mode", &self.config.process_mode)
            .field("plugins", &self.registry.count())
            .field("sample_rate", &self.sample_rate())
            .field("buffer_size", &self.buffer_size())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine with the built-in loader and a fresh host-callback
    /// channel.
    pub fn new(config: EngineConfig) -> Result<Arc<Self>> {
        Self::with_parts(config, Arc::new(InternalLoader), HostCallback::default())
    }

    pub fn with_parts(
        config: EngineConfig,
        loader: Arc<dyn PluginLoader>,
        callback: HostCallback,
    ) -> Result<Arc<Self>> {
        record(config.validate())?;
        let max_plugins = config.effective_max_plugins();
        let rack = config.process_mode == ProcessMode::ContinuousRack;
        tracing::debug!(
            client = %config.client_name,
            mode = ?config.process_mode,
            max_plugins,
            "creating engine"
        );
        Ok(Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            loader: RwLock::new(loader),
            notifier: Arc::new(Notifier::new(callback)),
            registry: Registry::new(max_plugins, rack),
            process_lock: Mutex::new(()),
            rack: Mutex::new(RackBuffers::new(config.buffer_size)),
            transport: Transport::default(),
            sample_rate: AtomicF64::new(config.sample_rate),
            buffer_size: AtomicUsize::new(config.buffer_size),
            poll: Mutex::new(None),
            driver: Mutex::new(None),
            running: AtomicFlag::new(false),
            closed: AtomicFlag::new(false),
            config,
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn client_name(&self) -> &str {
        &self.config.client_name
    }

    pub fn process_mode(&self) -> ProcessMode {
        self.config.process_mode
    }

    pub fn max_plugins(&self) -> usize {
        self.registry.capacity()
    }

    pub fn plugin_count(&self) -> usize {
        self.registry.count()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate.load(Ordering::Acquire)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size.load(Ordering::Acquire)
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn host_callback(&self) -> &HostCallback {
        self.notifier.host_callback()
    }

    /// Attach (or detach) the remote control UI.
    pub fn set_control(&self, sink: Option<Arc<dyn ControlSink>>) {
        self.notifier.set_control(sink);
    }

    pub fn set_loader(&self, loader: Arc<dyn PluginLoader>) {
        *self.loader.write() = loader;
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// First free plugin id, if any. Off the audio thread only.
    pub fn new_plugin_id(&self) -> Option<PluginId> {
        self.registry.new_plugin_id()
    }

    /// `name` with ':' replaced, suffixed " (2)", " (3)", ... until no
    /// loaded plugin uses it.
    pub fn unique_name(&self, name: &str) -> String {
        let mut name = name.replace(':', ".");
        while self.name_taken(&name) {
            name = next_name(&name);
        }
        name
    }

    fn name_taken(&self, name: &str) -> bool {
        self.registry
            .slots()
            .iter()
            .any(|slot| slot.state.lock().as_ref().is_some_and(|s| s.name() == name))
    }

    fn needs_bridge(&self, request: &LoadRequest) -> bool {
        request.plugin_type == PluginType::Bridge
            || !request.binary_type.is_native()
            || (self.config.prefer_bridges && request.plugin_type != PluginType::Internal)
    }

    /// Load a plugin and publish it into the first free slot.
    ///
    /// The plugin is fully loaded and reloaded before the audio thread can
    /// see it. On failure nothing stays registered and the error is also
    /// recorded as the last error.
    pub fn add_plugin(&self, request: LoadRequest) -> Result<PluginId> {
        let was_polling = self.stop_poll();
        let result = self.add_plugin_locked(&request);
        if was_polling {
            self.start_poll();
        }
        if let Err(ref e) = result {
            tracing::warn!(label = %request.label, "add_plugin failed: {}", e);
        }
        record(result)
    }

    fn add_plugin_locked(&self, request: &LoadRequest) -> Result<PluginId> {
        if self.closed.get() {
            return Err(Error::NotRunning);
        }
        let _lock = self.process_lock.lock();
        let id = self
            .registry
            .new_plugin_id()
            .ok_or(Error::MaxPluginsReached(self.registry.capacity()))?;

        let bridged = self.needs_bridge(request);
        let postponed = Arc::new(PostponedEvents::new(self.config.postponed_capacity));
        let ctx = LoadContext {
            id,
            client_name: self.config.client_name.clone(),
            sample_rate: self.sample_rate(),
            buffer_size: self.buffer_size(),
            postponed: postponed.clone(),
            bridged,
        };
        let loader = self.loader.read().clone();
        let backend = loader.load(request, &ctx)?;

        let base_name = match request.name {
            Some(ref name) if !name.is_empty() => name.clone(),
            _ => backend.real_name().to_string(),
        };
        let name = self.unique_name(&base_name);
        let rack = self.config.process_mode == ProcessMode::ContinuousRack;
        let client_name = match self.config.process_mode {
            ProcessMode::MultipleClients => name.clone(),
            _ => self.config.client_name.clone(),
        };

        let mut state = PluginState::new(PluginSetup {
            id,
            request: request.clone(),
            name,
            backend,
            notifier: self.notifier.clone(),
            postponed,
            client: EngineClient::new(client_name, rack, self.buffer_size()),
            sample_rate: self.sample_rate(),
            buffer_size: self.buffer_size(),
            high_precision: self.config.high_precision,
            bridged,
        });
        if let Err(e) = state.reload(true) {
            loader.plugin_removed(id);
            return Err(e);
        }
        state.set_active(true, false, false);
        state.set_enabled(true);

        if let Some(sink) = self.notifier.control() {
            state.send_control_dump(sink.as_ref());
        }
        tracing::debug!(id, name = %state.name(), bridged, "plugin added");
        self.registry.insert(id, Box::new(state));
        self.notifier
            .callback(CallbackAction::PluginAdded, id, 0, 0, 0.0);
        Ok(id)
    }

    /// Remove a plugin. In rack mode every plugin above it moves down one
    /// id. Must not be called from the audio thread.
    pub fn remove_plugin(&self, id: PluginId) -> Result<()> {
        let was_polling = self.stop_poll();
        let result = {
            let _lock = self.process_lock.lock();
            match self.registry.remove(id) {
                Some(state) => {
                    self.loader.read().plugin_removed(id);
                    if let Some(sink) = self.notifier.control() {
                        sink.remove_plugin(id);
                    }
                    tracing::debug!(id, name = %state.name(), "plugin removed");
                    drop(state);
                    self.notifier
                        .callback(CallbackAction::PluginRemoved, id, 0, 0, 0.0);
                    Ok(())
                }
                None => Err(Error::PluginNotFound(id)),
            }
        };
        if was_polling {
            self.start_poll();
        }
        record(result)
    }

    /// Remove every plugin, highest id first so rack mode never shifts.
    pub fn remove_all_plugins(&self) {
        for id in self.plugin_ids().into_iter().rev() {
            if let Err(e) = self.remove_plugin(id) {
                tracing::warn!(id, "remove failed: {}", e);
            }
        }
    }

    /// Give a plugin a new (de-duplicated) name and return it.
    pub fn rename_plugin(&self, id: PluginId, name: &str) -> Result<String> {
        record(self.with_plugin_disabled(id, |state| {
            let name = self.unique_name(name);
            state.set_name(name.clone());
            self.notifier
                .callback(CallbackAction::ReloadInfo, id, 0, 0, 0.0);
            name
        }))
    }

    pub fn has_plugin(&self, id: PluginId) -> bool {
        self.registry
            .lock(id)
            .is_some_and(|guard| guard.is_some())
    }

    /// Ids of every loaded plugin, ascending.
    pub fn plugin_ids(&self) -> Vec<PluginId> {
        self.registry.ids()
    }

    /// Run `f` on a plugin under the process lock. Keep `f` short: the
    /// audio thread waits for it before processing the plugin. Use
    /// [`with_plugin_disabled`](Self::with_plugin_disabled) for anything
    /// that blocks. Not reentrant.
    pub fn with_plugin<R>(&self, id: PluginId, f: impl FnOnce(&mut PluginState) -> R) -> Result<R> {
        let _lock = self.process_lock.lock();
        let mut guard = self.registry.lock(id).ok_or(Error::PluginNotFound(id))?;
        let state = guard.as_deref_mut().ok_or(Error::PluginNotFound(id))?;
        Ok(f(state))
    }

    /// Run a long operation on a plugin with it taken out of the audio
    /// path. The plugin reads as absent to the audio thread and to
    /// [`with_plugin`](Self::with_plugin) callers until `f` returns.
    pub fn with_plugin_disabled<R>(&self, id: PluginId, f: impl FnOnce(&mut PluginState) -> R) -> Result<R> {
        let _lock = self.process_lock.lock();
        let slot = self.registry.slot(id).ok_or(Error::PluginNotFound(id))?;
        let mut state = slot.state.lock().take().ok_or(Error::PluginNotFound(id))?;
        let result = f(&mut state);
        *slot.state.lock() = Some(state);
        Ok(result)
    }

    /// Snapshot a plugin's state. Bridged plugins are asked to flush first,
    /// which blocks for a bounded time.
    pub fn save_plugin_state(&self, id: PluginId) -> Result<SavedState> {
        record(self.with_plugin_disabled(id, |state| state.save_state()))
    }

    pub fn load_plugin_state(&self, id: PluginId, saved: &SavedState) -> Result<()> {
        record(self.with_plugin_disabled(id, |state| state.load_state(saved)).and_then(|r| r))
    }

    /// [input L, input R, output L, output R] of the last processed block.
    pub fn peaks(&self, id: PluginId) -> Option<[f32; 4]> {
        self.registry.slot(id).map(|slot| slot.peaks.load())
    }

    pub fn input_peak(&self, id: PluginId, channel: usize) -> f32 {
        self.registry
            .slot(id)
            .map_or(0.0, |slot| slot.peaks.input(channel))
    }

    pub fn output_peak(&self, id: PluginId, channel: usize) -> f32 {
        self.registry
            .slot(id)
            .map_or(0.0, |slot| slot.peaks.output(channel))
    }

    /// Control and MIDI events the rack chain produced in the last block.
    /// Rack mode only; blocks briefly against the audio thread.
    pub fn with_rack_output<R>(&self, f: impl FnOnce(&[ControlEvent], &[MidiEvent]) -> R) -> R {
        let rack = self.rack.lock();
        f(rack.control_out(), rack.midi_out())
    }

    /// Broadcast a new buffer size to the rack and every plugin.
    pub fn set_buffer_size(&self, frames: usize) {
        if frames == 0 || frames == self.buffer_size() {
            return;
        }
        let _lock = self.process_lock.lock();
        tracing::debug!(frames, "buffer size changed");
        self.rack.lock().resize(frames);
        for slot in self.registry.slots() {
            if let Some(state) = slot.state.lock().as_deref_mut() {
                state.buffer_size_changed(frames);
            }
        }
        self.buffer_size.store(frames, Ordering::Release);
    }

    pub fn set_sample_rate(&self, rate: f64) {
        if !(rate > 0.0) || rate == self.sample_rate() {
            return;
        }
        let _lock = self.process_lock.lock();
        tracing::debug!(rate, "sample rate changed");
        self.sample_rate.store(rate, Ordering::Release);
        for slot in self.registry.slots() {
            if let Some(state) = slot.state.lock().as_deref_mut() {
                state.sample_rate_changed(rate);
            }
        }
    }

    /// The driver went away: disable every plugin and tell the host to
    /// quit. The engine must be closed and recreated afterwards.
    pub fn handle_driver_shutdown(&self) {
        tracing::error!(client = %self.config.client_name, "audio driver shut down");
        for slot in self.registry.slots() {
            if let Some(state) = slot.state.lock().as_deref_mut() {
                state.set_enabled(false);
            }
        }
        self.running.set(false);
        set_last_error("audio driver shut down");
        self.notifier
            .callback(CallbackAction::Quit, INVALID_PLUGIN_ID, 0, 0, 0.0);
    }

    /// Main-thread idle for plugins whose GUI must run there.
    pub fn idle(&self) {
        for id in self.plugin_ids() {
            let _ = self.with_plugin(id, |state| {
                if state.is_enabled() && state.hints().contains(PluginHints::USES_SINGLE_THREAD) {
                    state.idle();
                }
            });
        }
    }

    /// Start the poll thread. No-op when already running.
    pub fn start_poll(&self) {
        let mut poll = self.poll.lock();
        if poll.is_some() {
            return;
        }
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        match PollThread::spawn(self.weak_self.clone(), interval) {
            Ok(thread) => *poll = Some(thread),
            Err(e) => {
                tracing::error!("failed to start poll thread: {}", e);
                set_last_error(e.to_string());
            }
        }
    }

    /// Stop the poll thread; returns whether it was running.
    pub fn stop_poll(&self) -> bool {
        let thread = self.poll.lock().take();
        match thread {
            Some(thread) => {
                thread.stop(POLL_STOP_TIMEOUT);
                true
            }
            None => false,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poll.lock().is_some()
    }

    /// Adopt the driver's sample rate and buffer size, start it and the
    /// poll thread.
    pub fn start(&self, mut driver: Box<dyn AudioDriver>) -> Result<()> {
        if self.closed.get() {
            return record(Err(Error::NotRunning));
        }
        self.stop_driver();
        self.set_sample_rate(driver.sample_rate());
        self.set_buffer_size(driver.buffer_size());
        record(driver.start(self.weak_self.clone()))?;
        tracing::debug!(driver = driver.name(), "driver started");
        *self.driver.lock() = Some(driver);
        self.running.set(true);
        self.start_poll();
        Ok(())
    }

    fn stop_driver(&self) {
        let driver = self.driver.lock().take();
        if let Some(mut driver) = driver {
            driver.stop();
        }
        self.running.set(false);
    }

    /// Stop everything and remove every plugin. The engine cannot be
    /// restarted afterwards.
    pub fn close(&self) {
        if self.closed.swap(true) {
            return;
        }
        self.stop_poll();
        self.stop_driver();
        self.remove_all_plugins();
        if let Some(sink) = self.notifier.control() {
            sink.exit();
        }
        self.notifier.set_control(None);
        tracing::debug!(client = %self.config.client_name, "engine closed");
    }
}

fn next_name(name: &str) -> String {
    if let Some(stem) = name.strip_suffix(')') {
        if let Some(pos) = stem.rfind(" (") {
            if let Ok(n) = stem[pos + 2..].parse::<u32>() {
                return format!("{} ({})", &stem[..pos], n + 1);
            }
        }
    }
    format!("{} (2)", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::recording::{Call, RecordingSink};

    fn engine(mode: ProcessMode) -> Arc<Engine> {
        Engine::new(EngineConfig {
            process_mode: mode,
            sample_rate: 48000.0,
            buffer_size: 64,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_next_name() {
        assert_eq!(next_name("Gain"), "Gain (2)");
        assert_eq!(next_name("Gain (2)"), "Gain (3)");
        assert_eq!(next_name("Gain (x)"), "Gain (x) (2)");
    }

    #[test]
    fn test_add_plugin_dedupes_names() {
        let engine = engine(ProcessMode::ContinuousRack);
        let a = engine.add_plugin(LoadRequest::internal("gain")).unwrap();
        let b = engine.add_plugin(LoadRequest::internal("gain")).unwrap();
        let c = engine
            .add_plugin(LoadRequest::internal("gain").with_name("a:b"))
            .unwrap();
        let names: Vec<String> = [a, b, c]
            .iter()
            .map(|&id| engine.with_plugin(id, |s| s.name().to_string()).unwrap())
            .collect();
        assert_eq!(names, ["gain", "gain (2)", "a.b"]);
    }

    #[test]
    fn test_add_failure_records_last_error() {
        let engine = engine(ProcessMode::ContinuousRack);
        let err = engine.add_plugin(LoadRequest::internal("missing")).unwrap_err();
        assert!(matches!(err, Error::LoadFailed(_)));
        assert_eq!(crate::error::last_error(), err.to_string());
        assert_eq!(engine.plugin_count(), 0);
        assert_eq!(engine.new_plugin_id(), Some(0));
    }

    #[test]
    fn test_max_plugins() {
        let engine = Engine::new(EngineConfig {
            max_plugins: 2,
            ..Default::default()
        })
        .unwrap();
        engine.add_plugin(LoadRequest::internal("gain")).unwrap();
        engine.add_plugin(LoadRequest::internal("gain")).unwrap();
        assert!(matches!(
            engine.add_plugin(LoadRequest::internal("gain")),
            Err(Error::MaxPluginsReached(2))
        ));
    }

    #[test]
    fn test_remove_then_lookup_fails() {
        let engine = engine(ProcessMode::MultipleClients);
        let id = engine.add_plugin(LoadRequest::internal("gain")).unwrap();
        engine.remove_plugin(id).unwrap();
        assert!(!engine.has_plugin(id));
        assert!(matches!(engine.with_plugin(id, |_| ()), Err(Error::PluginNotFound(_))));
        assert!(matches!(engine.remove_plugin(id), Err(Error::PluginNotFound(_))));
    }

    #[test]
    fn test_bridge_requests_need_bridge_loader() {
        let engine = engine(ProcessMode::ContinuousRack);
        let request = LoadRequest::new(PluginType::Bridge, "", "gain").with_extra("internal");
        assert!(matches!(
            engine.add_plugin(request),
            Err(Error::BridgeUnavailable(_))
        ));
    }

    #[test]
    fn test_control_sink_sees_add_and_remove() {
        let engine = engine(ProcessMode::ContinuousRack);
        let sink = Arc::new(RecordingSink::default());
        engine.set_control(Some(sink.clone() as Arc<dyn ControlSink>));
        let id = engine.add_plugin(LoadRequest::internal("gain")).unwrap();
        let calls = sink.take();
        assert_eq!(calls.first(), Some(&Call::AddPlugin(id, "gain".into())));
        assert_eq!(calls.last(), Some(&Call::DumpFinished(id)));

        engine.remove_plugin(id).unwrap();
        assert_eq!(sink.take(), vec![Call::RemovePlugin(id)]);

        engine.close();
        assert_eq!(sink.take(), vec![Call::Exit]);
    }

    #[test]
    fn test_buffer_size_broadcast() {
        let engine = engine(ProcessMode::MultipleClients);
        let id = engine.add_plugin(LoadRequest::internal("gain")).unwrap();
        engine.set_buffer_size(256);
        assert_eq!(engine.buffer_size(), 256);
        let len = engine
            .with_plugin(id, |s| s.client().audio_out[0].buffer.len())
            .unwrap();
        assert_eq!(len, 256);
    }

    #[test]
    fn test_driver_shutdown_disables_and_quits() {
        let engine = engine(ProcessMode::ContinuousRack);
        let id = engine.add_plugin(LoadRequest::internal("gain")).unwrap();
        engine.host_callback().drain();
        engine.handle_driver_shutdown();
        assert!(!engine.with_plugin(id, |s| s.is_enabled()).unwrap());
        let events = engine.host_callback().drain();
        assert_eq!(events.last().map(|e| e.action), Some(CallbackAction::Quit));
    }

    #[test]
    fn test_rename() {
        let engine = engine(ProcessMode::ContinuousRack);
        let a = engine.add_plugin(LoadRequest::internal("gain")).unwrap();
        engine.add_plugin(LoadRequest::internal("sine")).unwrap();
        assert_eq!(engine.rename_plugin(a, "sine").unwrap(), "sine (2)");
    }
}
