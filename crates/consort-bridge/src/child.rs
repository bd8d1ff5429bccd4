//! The child end of a bridge.
//!
//! A [`BridgeChild`] hosts exactly one plugin in a private rack engine,
//! reports its full state to the host, then applies host commands until it
//! is told to quit.

use crate::protocol::{BridgeArgs, BridgeReport, HostCommand};
use crate::Result;
use arc_swap::ArcSwap;
use consort_core::custom_data::CUSTOM_DATA_STRING;
use consort_core::{
    ControlSink, CustomData, DummyDriver, Engine, EngineConfig, LoadRequest, MidiProgramData,
    ParameterData, ParameterRanges, PluginId, PluginInfo, PortCounts, ProcessMode,
};
use consort_osc::{plugin_prefix, ControlServer, OscConfig, OscMessage, OscSender, OscUrl};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

const COMMAND_QUEUE_SIZE: usize = 1024;

/// The only slot of the child's engine.
const PLUGIN: PluginId = 0;

/// Turns the child engine's state publication into `bridge_*` reports.
pub struct ChildReporter {
    host: ArcSwap<OscUrl>,
    url: OscUrl,
    sender: Arc<OscSender>,
}

impl std::fmt::Debug for ChildReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildReporter")
            .field("host", &self.host.load().to_string())
            .field("url", &self.url.to_string())
            .finish()
    }
}

impl ChildReporter {
    /// `host` is the host's plugin URL, `url` the child's own.
    pub fn new(host: OscUrl, url: OscUrl, sender: Arc<OscSender>) -> Self {
        Self {
            host: ArcSwap::from_pointee(host),
            url,
            sender,
        }
    }

    pub fn host(&self) -> Arc<OscUrl> {
        self.host.load_full()
    }

    /// Follow a renumbering on the host.
    pub fn set_host(&self, host: OscUrl) {
        tracing::debug!(%host, "reporting to new host url");
        self.host.store(Arc::new(host));
    }

    pub fn url(&self) -> &OscUrl {
        &self.url
    }

    pub fn report(&self, report: BridgeReport) {
        let host = self.host.load();
        if let Err(e) = self.sender.send(&host, &report.to_message(&host)) {
            tracing::warn!(method = report.method(), "report failed: {}", e);
        }
    }
}

impl ControlSink for ChildReporter {
    fn add_plugin(&self, _id: PluginId, _name: &str) {}

    fn remove_plugin(&self, _id: PluginId) {}

    fn set_plugin_data(&self, _id: PluginId, info: &PluginInfo) {
        self.report(BridgeReport::PluginInfo {
            category: info.category.to_i32(),
            hints: info.hints.bits(),
            name: info.name.clone(),
            label: info.label.clone(),
            maker: info.maker.clone(),
            copyright: info.copyright.clone(),
            real_name: info.real_name.clone(),
            unique_id: info.unique_id,
        });
    }

    fn set_plugin_ports(&self, _id: PluginId, counts: &PortCounts) {
        self.report(BridgeReport::AudioCount {
            ins: counts.audio_ins,
            outs: counts.audio_outs,
        });
        self.report(BridgeReport::MidiCount {
            ins: counts.midi_ins,
            outs: counts.midi_outs,
        });
        self.report(BridgeReport::ParameterCount {
            ins: counts.parameter_ins,
            outs: counts.parameter_outs,
            total: counts.parameter_total,
        });
    }

    fn set_parameter_data(&self, _id: PluginId, index: i32, data: &ParameterData, name: &str, unit: &str) {
        self.report(BridgeReport::ParameterInfo {
            index,
            name: name.to_string(),
            unit: unit.to_string(),
        });
        self.report(BridgeReport::ParameterData {
            index,
            kind: data.kind.to_i32(),
            rindex: data.rindex,
            hints: data.hints.bits(),
            midi_channel: data.midi_channel,
            midi_cc: data.midi_cc,
        });
    }

    fn set_parameter_ranges(&self, _id: PluginId, index: i32, ranges: &ParameterRanges) {
        self.report(BridgeReport::ParameterRanges {
            index,
            ranges: *ranges,
        });
    }

    // Bindings travel with the parameter data.
    fn set_parameter_midi_cc(&self, _id: PluginId, _index: i32, _cc: i16) {}

    fn set_parameter_midi_channel(&self, _id: PluginId, _index: i32, _channel: u8) {}

    fn set_parameter_value(&self, _id: PluginId, index: i32, value: f64) {
        // Macro controls live on the host.
        if index >= 0 {
            self.report(BridgeReport::SetParameterValue { index, value });
        }
    }

    fn set_default_value(&self, _id: PluginId, index: i32, value: f64) {
        if index >= 0 {
            self.report(BridgeReport::SetDefaultValue { index, value });
        }
    }

    fn set_program(&self, _id: PluginId, index: i32) {
        self.report(BridgeReport::SetProgram(index));
    }

    fn set_program_count(&self, _id: PluginId, count: u32) {
        self.report(BridgeReport::ProgramCount(count));
    }

    fn set_program_name(&self, _id: PluginId, index: i32, name: &str) {
        self.report(BridgeReport::ProgramInfo {
            index,
            name: name.to_string(),
        });
    }

    fn set_midi_program(&self, _id: PluginId, index: i32) {
        self.report(BridgeReport::SetMidiProgram(index));
    }

    fn set_midi_program_count(&self, _id: PluginId, count: u32) {
        self.report(BridgeReport::MidiProgramCount(count));
    }

    fn set_midi_program_data(&self, _id: PluginId, index: i32, data: &MidiProgramData) {
        self.report(BridgeReport::MidiProgramInfo {
            index,
            data: data.clone(),
        });
    }

    fn note_on(&self, _id: PluginId, channel: u8, note: u8, velocity: u8) {
        self.report(BridgeReport::NoteOn {
            channel,
            note,
            velocity,
        });
    }

    fn note_off(&self, _id: PluginId, channel: u8, note: u8) {
        self.report(BridgeReport::NoteOff { channel, note });
    }

    fn set_input_peak_value(&self, _id: PluginId, port: u8, value: f32) {
        self.report(BridgeReport::InputPeak { port, value });
    }

    fn set_output_peak_value(&self, _id: PluginId, port: u8, value: f32) {
        self.report(BridgeReport::OutputPeak { port, value });
    }

    fn exit(&self) {}

    fn set_custom_data(&self, _id: PluginId, data: &CustomData) {
        self.report(BridgeReport::SetCustomData(data.clone()));
    }

    fn set_chunk_data(&self, _id: PluginId, chunk: &[u8]) {
        self.report(BridgeReport::SetChunkData(chunk.to_vec()));
    }

    fn dump_finished(&self, _id: PluginId) {
        self.report(BridgeReport::Update(self.url.to_string()));
    }

    fn saved(&self, _id: PluginId) {
        self.report(BridgeReport::Saved);
    }
}

/// Handle that makes [`BridgeChild::run`] return.
#[derive(Debug, Clone)]
pub struct QuitHandle(Sender<()>);

impl QuitHandle {
    pub fn quit(&self) {
        let _ = self.0.try_send(());
    }
}

pub struct BridgeChild {
    engine: Arc<Engine>,
    server: ControlServer,
    reporter: Arc<ChildReporter>,
    worker: Option<JoinHandle<()>>,
    quit: Sender<()>,
    quit_rx: Receiver<()>,
}

impl std::fmt::Debug for BridgeChild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeChild")
            .field("reporter", &self.reporter)
            .finish_non_exhaustive()
    }
}

impl BridgeChild {
    /// Load the plugin, report it to the host and start processing.
    ///
    /// A plugin that fails to load is reported as `bridge_error` before the
    /// error is returned.
    pub fn start(args: &BridgeArgs, config: EngineConfig) -> Result<Self> {
        let host = OscUrl::parse(&args.host_url)?;
        let config = EngineConfig {
            process_mode: ProcessMode::ContinuousRack,
            max_plugins: 1,
            prefer_bridges: false,
            ..config
        };
        let (sample_rate, buffer_size) = (config.sample_rate, config.buffer_size);
        let engine = Engine::new(config)?;

        let mut server = ControlServer::bind(&OscConfig::default())?;
        let url = server.url().join(&plugin_prefix(engine.client_name(), PLUGIN));
        let reporter = Arc::new(ChildReporter::new(host, url.clone(), server.sender().clone()));

        let (quit, quit_rx) = bounded::<()>(1);
        let (commands, command_rx) = bounded::<HostCommand>(COMMAND_QUEUE_SIZE);
        let prefix = format!("{}/", url.path);
        server.start(Arc::new(move |message: OscMessage, source: SocketAddr| {
            let Some(method) = message.path.strip_prefix(&prefix) else {
                tracing::debug!(path = %message.path, %source, "ignoring foreign message");
                return;
            };
            let command = match HostCommand::parse(method, &message) {
                Ok(command) => command,
                Err(e) => {
                    tracing::warn!(path = %message.path, "dropping command: {}", e);
                    return;
                }
            };
            if let Err(TrySendError::Full(command)) = commands.try_send(command) {
                tracing::warn!(method = command.method(), "command queue full, dropping");
            }
        }))?;

        let worker_engine = engine.clone();
        let worker_reporter = reporter.clone();
        let worker_quit = quit.clone();
        let worker = std::thread::Builder::new()
            .name("consort-bridge-commands".into())
            .spawn(move || {
                for command in command_rx {
                    let method = command.method();
                    if let Err(e) = apply(&worker_engine, &worker_reporter, &worker_quit, command) {
                        tracing::warn!(method, "command failed: {}", e);
                    }
                }
            })?;

        engine.set_control(Some(reporter.clone() as Arc<dyn ControlSink>));
        let mut request = LoadRequest::new(args.plugin_type, &args.filename, &args.label);
        if let Some(ref name) = args.name {
            request = request.with_name(name);
        }
        let mut child = Self {
            engine,
            server,
            reporter,
            worker: Some(worker),
            quit,
            quit_rx,
        };
        // The dump, ending in `bridge_update`, goes out while the plugin is
        // added.
        if let Err(e) = child.engine.add_plugin(request) {
            child.reporter.report(BridgeReport::Error(e.to_string()));
            child.close();
            return Err(e.into());
        }
        child
            .engine
            .start(Box::new(DummyDriver::new(sample_rate, buffer_size)))?;
        tracing::info!(url = %child.reporter.url(), label = %args.label, "bridge child running");
        Ok(child)
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn reporter(&self) -> &Arc<ChildReporter> {
        &self.reporter
    }

    /// The child's own control URL.
    pub fn url(&self) -> &OscUrl {
        self.reporter.url()
    }

    pub fn quit_handle(&self) -> QuitHandle {
        QuitHandle(self.quit.clone())
    }

    /// Block until the host sends `quit` or a [`QuitHandle`] fires, then
    /// shut down.
    pub fn run(mut self) {
        let _ = self.quit_rx.recv();
        tracing::debug!("bridge child quitting");
        self.close();
    }

    fn close(&mut self) {
        self.engine.close();
        // Ends the command worker with the server's handler.
        self.server.stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("bridge command worker panicked");
            }
        }
    }
}

impl Drop for BridgeChild {
    fn drop(&mut self) {
        self.close();
    }
}

fn apply(
    engine: &Engine,
    reporter: &ChildReporter,
    quit: &Sender<()>,
    command: HostCommand,
) -> Result<()> {
    match command {
        HostCommand::SetParameterValue { index, value } => engine.with_plugin(PLUGIN, |state| {
            match usize::try_from(index) {
                Ok(k) => state.set_parameter_value(k, value, true, false, false),
                Err(_) => state.set_parameter_value_by_rindex(index, value, true, false, false),
            }
        })?,
        // Echoed so the host picks up the program's parameter values.
        HostCommand::SetProgram(index) => {
            engine.with_plugin(PLUGIN, |state| state.set_program(index, true, true, false))??
        }
        HostCommand::SetMidiProgram(index) => engine
            .with_plugin(PLUGIN, |state| state.set_midi_program(index, true, true, false))??,
        HostCommand::NoteOn {
            channel,
            note,
            velocity,
        } => engine.with_plugin(PLUGIN, |state| {
            state.send_midi_single_note(channel, note, velocity, true, false, false)
        })?,
        HostCommand::NoteOff { channel, note } => engine.with_plugin(PLUGIN, |state| {
            state.send_midi_single_note(channel, note, 0, true, false, false)
        })?,
        HostCommand::SetCustomData(data) => engine.with_plugin(PLUGIN, |state| {
            state.set_custom_data(&data.kind, &data.key, &data.value)
        })??,
        HostCommand::SetChunk(chunk) => {
            engine.with_plugin(PLUGIN, |state| state.set_chunk_data(&chunk))??
        }
        HostCommand::Configure { key, value } => engine.with_plugin(PLUGIN, |state| {
            state.set_custom_data(CUSTOM_DATA_STRING, &key, &value)
        })??,
        HostCommand::Save => {
            engine.with_plugin(PLUGIN, |state| {
                for data in state.custom_data().iter() {
                    reporter.set_custom_data(PLUGIN, data);
                }
                if let Some(chunk) = state.chunk_data() {
                    reporter.set_chunk_data(PLUGIN, &chunk);
                }
            })?;
            reporter.saved(PLUGIN);
        }
        HostCommand::Show => engine.with_plugin(PLUGIN, |state| state.show_gui(true))??,
        HostCommand::Hide => engine.with_plugin(PLUGIN, |state| state.show_gui(false))??,
        HostCommand::Quit => {
            let _ = quit.try_send(());
        }
        HostCommand::UpdateHost(url) => reporter.set_host(OscUrl::parse(&url)?),
    }
    Ok(())
}

/// Engine settings handed over by the supervisor, falling back to the
/// defaults.
pub fn engine_config_from_env() -> EngineConfig {
    let mut config = EngineConfig::default();
    if let Some(rate) = env_value::<f64>(crate::config::ENV_SAMPLE_RATE) {
        config.sample_rate = rate;
    }
    if let Some(frames) = env_value::<usize>(crate::config::ENV_BUFFER_SIZE) {
        config.buffer_size = frames;
    }
    config
}

fn env_value<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeError;
    use consort_core::PluginType;
    use consort_osc::Protocol;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    /// A fake host: collects every report sent to `/Consort/00`.
    fn fake_host() -> (ControlServer, OscUrl, Receiver<OscMessage>) {
        let mut server = ControlServer::bind(&OscConfig::default()).unwrap();
        let (tx, rx) = unbounded();
        server
            .start(Arc::new(move |message: OscMessage, _: SocketAddr| {
                let _ = tx.send(message);
            }))
            .unwrap();
        let url = server.url().join("/Consort/00");
        (server, url, rx)
    }

    fn args(host: &OscUrl, label: &str) -> BridgeArgs {
        BridgeArgs {
            host_url: host.to_string(),
            plugin_type: PluginType::Internal,
            filename: Default::default(),
            label: label.into(),
            name: None,
        }
    }

    fn recv_until(rx: &Receiver<OscMessage>, suffix: &str) -> Vec<OscMessage> {
        let mut seen = Vec::new();
        while let Ok(message) = rx.recv_timeout(Duration::from_secs(2)) {
            let done = message.path.ends_with(suffix);
            seen.push(message);
            if done {
                return seen;
            }
        }
        panic!("never saw {}", suffix);
    }

    #[test]
    fn test_reporter_skips_macro_controls() {
        let (_server, host, rx) = fake_host();
        let sender = ControlServer::bind(&OscConfig::default()).unwrap().sender().clone();
        let own = OscUrl::new(Protocol::Udp, "127.0.0.1", 1, "/Consort/00");
        let reporter = ChildReporter::new(host, own, sender);

        reporter.set_parameter_value(0, -2, 1.0);
        reporter.set_parameter_value(0, 3, 0.5);
        reporter.dump_finished(0);

        let seen = recv_until(&rx, "/bridge_update");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].path, "/Consort/00/bridge_set_parameter_value");
        assert_eq!(seen[0].int(0).unwrap(), 3);
        assert_eq!(seen[1].str(0).unwrap(), "osc.udp://127.0.0.1:1/Consort/00");
    }

    #[test]
    fn test_child_dumps_then_answers_save() {
        let (_server, host, rx) = fake_host();
        let child = BridgeChild::start(&args(&host, "gain"), EngineConfig::default()).unwrap();

        let dump = recv_until(&rx, "/bridge_update");
        assert!(dump[0].path.ends_with("/bridge_plugin_info"));
        assert!(dump
            .iter()
            .any(|m| m.path.ends_with("/bridge_parameter_ranges")));
        let child_url = OscUrl::parse(dump.last().unwrap().str(0).unwrap()).unwrap();
        assert_eq!(&child_url, child.url());

        child
            .engine()
            .with_plugin(PLUGIN, |state| state.set_custom_data("string", "k", "v"))
            .unwrap()
            .unwrap();
        apply(
            child.engine(),
            child.reporter(),
            &child.quit,
            HostCommand::Save,
        )
        .unwrap();
        let saved = recv_until(&rx, "/bridge_saved");
        assert!(saved
            .iter()
            .any(|m| m.path.ends_with("/bridge_set_custom_data") && m.str(1).unwrap() == "k"));

        let quit = child.quit_handle();
        quit.quit();
        child.run();
    }

    #[test]
    fn test_unknown_plugin_reports_error() {
        let (_server, host, rx) = fake_host();
        let err = BridgeChild::start(&args(&host, "no-such-plugin"), EngineConfig::default())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Core(_)));

        let seen = recv_until(&rx, "/bridge_error");
        assert!(seen.last().unwrap().str(0).unwrap().contains("no-such-plugin"));
    }

    #[test]
    fn test_host_commands_reach_the_plugin() {
        let (_server, host, _rx) = fake_host();
        let child = BridgeChild::start(&args(&host, "gain"), EngineConfig::default()).unwrap();
        let quit = child.quit_handle();

        apply(
            child.engine(),
            child.reporter(),
            &child.quit,
            HostCommand::SetParameterValue { index: 0, value: 0.25 },
        )
        .unwrap();
        let value = child
            .engine()
            .with_plugin(PLUGIN, |state| state.parameter_value(0))
            .unwrap();
        assert_eq!(value, 0.25);

        let renumbered = OscUrl::new(Protocol::Udp, host.host.clone(), host.port, "/Consort/01");
        apply(
            child.engine(),
            child.reporter(),
            &child.quit,
            HostCommand::UpdateHost(renumbered.to_string()),
        )
        .unwrap();
        assert_eq!(*child.reporter().host(), renumbered);

        quit.quit();
        child.run();
    }
}
