//! The host's control channel: server, UI client and dispatcher wired to
//! one engine.
//!
//! Engine commands are handed to a worker thread through a bounded queue,
//! since they take the engine's process lock. Bridge reports are handled
//! on the socket thread itself: a bridge handshake or save runs while that
//! lock is held, and waits for exactly these reports.

use crate::address::plugin_prefix;
use crate::client::ControlClient;
use crate::config::OscConfig;
use crate::dispatch::{BridgeRouter, Dispatcher};
use crate::message::OscMessage;
use crate::server::{ControlServer, MessageHandler, OscSender};
use crate::url::OscUrl;
use crate::Result;
use consort_core::{ControlSink, Engine, PluginId};
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

struct Router {
    dispatcher: Arc<Dispatcher>,
    commands: Sender<OscMessage>,
}

impl MessageHandler for Router {
    fn handle(&self, message: OscMessage, source: SocketAddr) {
        if self.dispatcher.is_bridge_message(&message) {
            let _ = self.dispatcher.dispatch(&message);
            return;
        }
        match self.commands.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                tracing::warn!(path = %message.path, %source, "command queue full, dropping");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Everything a bridge needs to talk to its child: where the host listens
/// and a way to send.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    url: OscUrl,
    client_name: String,
    sender: Arc<OscSender>,
}

impl ChannelHandle {
    pub fn url(&self) -> &OscUrl {
        &self.url
    }

    /// `osc.udp://host:port/<client>/<NN>`: where a bridge child hosting
    /// plugin `id` sends its reports.
    pub fn plugin_url(&self, id: PluginId) -> OscUrl {
        self.url.join(&plugin_prefix(&self.client_name, id))
    }

    pub fn send(&self, url: &OscUrl, message: &OscMessage) -> Result<()> {
        self.sender.send(url, message)
    }
}

pub struct ControlChannel {
    engine: Weak<Engine>,
    server: ControlServer,
    client: Arc<ControlClient>,
    dispatcher: Arc<Dispatcher>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel")
            .field("server", &self.server)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl ControlChannel {
    /// Bind the sockets, start serving and install the UI client as the
    /// engine's control sink.
    pub fn start(engine: &Arc<Engine>, config: &OscConfig) -> Result<Self> {
        let mut server = ControlServer::bind(config)?;
        let client = Arc::new(ControlClient::new(server.sender().clone()));
        let dispatcher = Arc::new(Dispatcher::new(engine, client.clone()));

        let (commands, command_rx) = bounded::<OscMessage>(config.command_queue);
        let worker_dispatcher = dispatcher.clone();
        let worker = std::thread::Builder::new()
            .name("consort-osc-commands".into())
            .spawn(move || {
                for message in command_rx {
                    let _ = worker_dispatcher.dispatch(&message);
                }
            })?;

        server.start(Arc::new(Router {
            dispatcher: dispatcher.clone(),
            commands,
        }))?;
        engine.set_control(Some(client.clone() as Arc<dyn ControlSink>));
        tracing::info!(url = %server.url(), "control channel listening");

        Ok(Self {
            engine: Arc::downgrade(engine),
            server,
            client,
            dispatcher,
            worker: Some(worker),
        })
    }

    pub fn url(&self) -> OscUrl {
        self.server.url()
    }

    pub fn tcp_url(&self) -> Option<OscUrl> {
        self.server.tcp_url()
    }

    pub fn client(&self) -> &Arc<ControlClient> {
        &self.client
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn handle(&self) -> ChannelHandle {
        ChannelHandle {
            url: self.server.url(),
            client_name: self
                .engine
                .upgrade()
                .map(|e| e.client_name().to_string())
                .unwrap_or_default(),
            sender: self.server.sender().clone(),
        }
    }

    pub fn set_bridge_router(&self, router: Option<Arc<dyn BridgeRouter>>) {
        self.dispatcher.set_bridge_router(router);
    }

    pub fn send(&self, url: &OscUrl, message: &OscMessage) -> Result<()> {
        self.server.sender().send(url, message)
    }

    pub fn is_running(&self) -> bool {
        self.server.is_running()
    }

    /// Stop serving and detach from the engine.
    pub fn close(&mut self) {
        if !self.server.is_running() {
            return;
        }
        if let Some(engine) = self.engine.upgrade() {
            engine.set_control(None);
        }
        self.dispatcher.set_bridge_router(None);
        // Dropping the router with the server thread closes the command queue.
        self.server.stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("OSC command worker panicked");
            }
        }
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.close();
    }
}
