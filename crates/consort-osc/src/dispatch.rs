//! Inbound command dispatch.
//!
//! Per-plugin commands are looked up by method name in a fixed table that
//! also declares the argument types. Anything unknown or mistyped is logged
//! and dropped; plugin state is only touched once a message has passed both
//! checks.

use crate::address::Route;
use crate::client::ControlClient;
use crate::message::OscMessage;
use crate::url::OscUrl;
use crate::{OscError, Result};
use consort_core::custom_data::CUSTOM_DATA_STRING;
use consort_core::{ControlSink, Engine, PluginId, PluginState};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Receives `/<client>/<NN>/bridge_*` reports. Implemented by the bridge
/// loader; called on the OSC thread without the engine's process lock.
pub trait BridgeRouter: Send + Sync {
    /// `method` has the `bridge_` prefix stripped.
    fn handle(&self, id: PluginId, method: &str, message: &OscMessage) -> Result<()>;
}

type Handler = fn(&Dispatcher, &mut PluginState, &OscMessage) -> Result<()>;

struct Command {
    types: &'static str,
    handler: Handler,
}

const COMMANDS: &[(&str, &str, Handler)] = &[
    ("set_active", "i", set_active),
    ("set_drywet", "d", set_drywet),
    ("set_volume", "d", set_volume),
    ("set_balance_left", "d", set_balance_left),
    ("set_balance_right", "d", set_balance_right),
    ("set_parameter_value", "id", set_parameter_value),
    ("set_parameter_midi_cc", "ii", set_parameter_midi_cc),
    ("set_parameter_midi_channel", "ii", set_parameter_midi_channel),
    ("set_program", "i", set_program),
    ("set_midi_program", "i", set_midi_program),
    ("note_on", "iii", note_on),
    ("note_off", "ii", note_off),
    ("configure", "ss", configure),
    ("control", "id", control),
    ("update", "s", update),
    ("exiting", "", exiting),
];

pub struct Dispatcher {
    engine: Weak<Engine>,
    client_name: String,
    client: Arc<ControlClient>,
    bridges: RwLock<Option<Arc<dyn BridgeRouter>>>,
    commands: HashMap<&'static str, Command>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("client_name", &self.client_name)
            .field("bridges", &self.bridges.read().is_some())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(engine: &Arc<Engine>, client: Arc<ControlClient>) -> Self {
        let commands = COMMANDS
            .iter()
            .map(|&(name, types, handler)| (name, Command { types, handler }))
            .collect();
        Self {
            engine: Arc::downgrade(engine),
            client_name: engine.client_name().to_string(),
            client,
            bridges: RwLock::new(None),
            commands,
        }
    }

    pub fn client(&self) -> &Arc<ControlClient> {
        &self.client
    }

    pub fn set_bridge_router(&self, router: Option<Arc<dyn BridgeRouter>>) {
        *self.bridges.write() = router;
    }

    /// Bridge reports must never wait behind engine commands.
    pub fn is_bridge_message(&self, message: &OscMessage) -> bool {
        matches!(
            Route::parse(&message.path, &self.client_name),
            Ok(Route::Bridge { .. })
        )
    }

    /// Handle one message. Errors are logged here as well as returned.
    pub fn dispatch(&self, message: &OscMessage) -> Result<()> {
        let result = self.route(message);
        if let Err(ref e) = result {
            tracing::warn!(path = %message.path, "dropping message: {}", e);
        }
        result
    }

    fn route(&self, message: &OscMessage) -> Result<()> {
        match Route::parse(&message.path, &self.client_name)? {
            Route::Register => {
                message.expect("s")?;
                self.register(OscUrl::parse(message.str(0)?)?)
            }
            Route::Unregister => {
                self.client.unregister();
                Ok(())
            }
            Route::Bridge { id, method } => {
                let router = self.bridges.read().clone().ok_or(OscError::NoBridge(id))?;
                router.handle(id, method, message)
            }
            Route::Plugin { id, method } => {
                let command = self
                    .commands
                    .get(method)
                    .ok_or_else(|| OscError::UnknownMethod(message.path.clone()))?;
                message.expect(command.types)?;
                let engine = self.engine.upgrade().ok_or(OscError::NotRunning)?;
                engine.with_plugin(id, |state| (command.handler)(self, state, message))?
            }
        }
    }

    /// Register a UI and send it every plugin's full state.
    fn register(&self, url: OscUrl) -> Result<()> {
        let engine = self.engine.upgrade().ok_or(OscError::NotRunning)?;
        self.client.register(url);
        for id in engine.plugin_ids() {
            engine.with_plugin(id, |state| state.send_control_dump(self.client.as_ref()))?;
        }
        Ok(())
    }
}

fn index_arg(message: &OscMessage, at: usize) -> Result<usize> {
    let index = message.int(at)?;
    usize::try_from(index).map_err(|_| consort_core::Error::InvalidParameter(index).into())
}

fn midi_byte(message: &OscMessage, at: usize) -> Result<u8> {
    Ok(message.int(at)?.clamp(0, 127) as u8)
}

fn set_active(_: &Dispatcher, state: &mut PluginState, m: &OscMessage) -> Result<()> {
    state.set_active(m.int(0)? != 0, false, true);
    Ok(())
}

fn set_drywet(_: &Dispatcher, state: &mut PluginState, m: &OscMessage) -> Result<()> {
    state.set_dry_wet(m.double(0)?, false, true);
    Ok(())
}

fn set_volume(_: &Dispatcher, state: &mut PluginState, m: &OscMessage) -> Result<()> {
    state.set_volume(m.double(0)?, false, true);
    Ok(())
}

fn set_balance_left(_: &Dispatcher, state: &mut PluginState, m: &OscMessage) -> Result<()> {
    state.set_balance_left(m.double(0)?, false, true);
    Ok(())
}

fn set_balance_right(_: &Dispatcher, state: &mut PluginState, m: &OscMessage) -> Result<()> {
    state.set_balance_right(m.double(0)?, false, true);
    Ok(())
}

fn set_parameter_value(_: &Dispatcher, state: &mut PluginState, m: &OscMessage) -> Result<()> {
    let index = m.int(0)?;
    let value = m.double(1)?;
    match usize::try_from(index) {
        Ok(index) => state.set_parameter_value(index, value, true, false, true),
        // Negative indices are the macro controls.
        Err(_) => state.set_parameter_value_by_rindex(index, value, true, false, true),
    }
    Ok(())
}

fn set_parameter_midi_cc(_: &Dispatcher, state: &mut PluginState, m: &OscMessage) -> Result<()> {
    let cc = m.int(1)?.clamp(-1, i16::MAX as i32) as i16;
    state.set_parameter_midi_cc(index_arg(m, 0)?, cc, false, true)?;
    Ok(())
}

fn set_parameter_midi_channel(_: &Dispatcher, state: &mut PluginState, m: &OscMessage) -> Result<()> {
    let channel = m.int(1)?.clamp(0, 15) as u8;
    state.set_parameter_midi_channel(index_arg(m, 0)?, channel, false, true)?;
    Ok(())
}

fn set_program(_: &Dispatcher, state: &mut PluginState, m: &OscMessage) -> Result<()> {
    state.set_program(m.int(0)?, true, false, true)?;
    Ok(())
}

fn set_midi_program(_: &Dispatcher, state: &mut PluginState, m: &OscMessage) -> Result<()> {
    state.set_midi_program(m.int(0)?, true, false, true)?;
    Ok(())
}

fn note_on(_: &Dispatcher, state: &mut PluginState, m: &OscMessage) -> Result<()> {
    let channel = m.int(0)?.clamp(0, 15) as u8;
    state.send_midi_single_note(channel, midi_byte(m, 1)?, midi_byte(m, 2)?, true, false, true);
    Ok(())
}

fn note_off(_: &Dispatcher, state: &mut PluginState, m: &OscMessage) -> Result<()> {
    let channel = m.int(0)?.clamp(0, 15) as u8;
    state.send_midi_single_note(channel, midi_byte(m, 1)?, 0, true, false, true);
    Ok(())
}

fn configure(_: &Dispatcher, state: &mut PluginState, m: &OscMessage) -> Result<()> {
    state.set_custom_data(CUSTOM_DATA_STRING, m.str(0)?, m.str(1)?)?;
    Ok(())
}

fn control(_: &Dispatcher, state: &mut PluginState, m: &OscMessage) -> Result<()> {
    state.set_parameter_value_by_rindex(m.int(0)?, m.double(1)?, true, false, true);
    Ok(())
}

/// A UI asks for this plugin's state; it becomes the registered UI.
fn update(dispatcher: &Dispatcher, state: &mut PluginState, m: &OscMessage) -> Result<()> {
    dispatcher.client.register(OscUrl::parse(m.str(0)?)?);
    state.send_control_dump(dispatcher.client.as_ref() as &dyn ControlSink);
    Ok(())
}

fn exiting(_: &Dispatcher, state: &mut PluginState, _: &OscMessage) -> Result<()> {
    state.show_gui(false)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OscConfig;
    use crate::server::ControlServer;
    use consort_core::types::PARAMETER_VOLUME;
    use consort_core::{EngineConfig, LoadRequest};

    fn setup() -> (Arc<Engine>, Dispatcher, ControlServer, PluginId) {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let id = engine.add_plugin(LoadRequest::internal("sine")).unwrap();
        let server = ControlServer::bind(&OscConfig::default()).unwrap();
        let client = Arc::new(ControlClient::new(server.sender().clone()));
        let dispatcher = Dispatcher::new(&engine, client);
        (engine, dispatcher, server, id)
    }

    #[test]
    fn test_unknown_method_is_a_noop() {
        let (engine, dispatcher, _server, id) = setup();
        let before = engine.save_plugin_state(id).unwrap();

        let result = dispatcher.dispatch(&OscMessage::new("/Consort/00/explode").arg(1));
        assert!(matches!(result, Err(OscError::UnknownMethod(_))));

        let after = engine.save_plugin_state(id).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let (engine, dispatcher, _server, id) = setup();
        let result = dispatcher.dispatch(&OscMessage::new("/Consort/00/set_volume").arg("loud"));
        assert!(matches!(result, Err(OscError::ArgumentMismatch { .. })));
        assert_eq!(engine.with_plugin(id, |s| s.volume()).unwrap(), 1.0);
    }

    #[test]
    fn test_commands_mutate_state() {
        let (engine, dispatcher, _server, id) = setup();
        dispatcher
            .dispatch(&OscMessage::new("/Consort/00/set_volume").arg(0.5))
            .unwrap();
        dispatcher
            .dispatch(&OscMessage::new("/Consort/00/set_parameter_value").arg(0).arg(99999.0))
            .unwrap();
        dispatcher
            .dispatch(&OscMessage::new("/Consort/00/set_program").arg(2))
            .unwrap();
        dispatcher
            .dispatch(&OscMessage::new("/Consort/00/control").arg(PARAMETER_VOLUME).arg(0.25))
            .unwrap();
        dispatcher
            .dispatch(&OscMessage::new("/Consort/00/set_parameter_midi_cc").arg(0).arg(21))
            .unwrap();

        engine
            .with_plugin(id, |s| {
                assert_eq!(s.volume(), 0.25);
                assert_eq!(s.current_program(), 2);
                assert_eq!(s.parameter_data(0).unwrap().midi_cc, 21);
            })
            .unwrap();
    }

    #[test]
    fn test_missing_plugin_and_bridge() {
        let (_engine, dispatcher, _server, _) = setup();
        assert!(matches!(
            dispatcher.dispatch(&OscMessage::new("/Consort/07/set_volume").arg(0.5)),
            Err(OscError::Engine(consort_core::Error::PluginNotFound(7)))
        ));
        assert!(matches!(
            dispatcher.dispatch(&OscMessage::new("/Consort/00/bridge_saved")),
            Err(OscError::NoBridge(0))
        ));
        assert!(dispatcher.is_bridge_message(&OscMessage::new("/Consort/00/bridge_saved")));
        assert!(matches!(
            dispatcher.dispatch(&OscMessage::new("/Consort/00/set_program").arg(9)),
            Err(OscError::Engine(consort_core::Error::InvalidProgram(9)))
        ));
    }

    #[test]
    fn test_register_requires_url() {
        let (_engine, dispatcher, _server, _) = setup();
        assert!(dispatcher.dispatch(&OscMessage::new("/register")).is_err());
        assert!(dispatcher
            .dispatch(&OscMessage::new("/register").arg("not a url"))
            .is_err());
        dispatcher
            .dispatch(&OscMessage::new("/register").arg("osc.udp://127.0.0.1:9/ui"))
            .unwrap();
        assert!(dispatcher.client().is_registered());
        dispatcher.dispatch(&OscMessage::new("/unregister")).unwrap();
        assert!(!dispatcher.client().is_registered());
    }
}
