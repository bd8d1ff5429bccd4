//! Host callback: a typed event channel for every user-visible state change.

use crate::control::ControlSink;
use crate::types::PluginId;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::sync::Arc;

/// Capacity of the host event channel.
pub const HOST_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Debug,
    /// value1 = parameter index, value3 = value.
    ParameterValueChanged,
    /// value1 = parameter index, value2 = channel.
    ParameterMidiChannelChanged,
    /// value1 = parameter index, value2 = controller.
    ParameterMidiCcChanged,
    /// value1 = program index.
    ProgramChanged,
    /// value1 = MIDI program index.
    MidiProgramChanged,
    /// value1 = channel, value2 = note, value3 = velocity.
    NoteOn,
    /// value1 = channel, value2 = note.
    NoteOff,
    /// value1 = 1 when shown, 0 when hidden, -1 when the UI crashed.
    ShowGui,
    ReloadInfo,
    ReloadParameters,
    ReloadPrograms,
    ReloadAll,
    PluginAdded,
    PluginRemoved,
    /// Fatal: the driver went away and the engine must be re-initialized.
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostEvent {
    pub action: CallbackAction,
    pub plugin_id: PluginId,
    pub value1: i32,
    pub value2: i32,
    pub value3: f64,
}

/// Sending side of the host callback. Cloned into every plugin.
#[derive(Debug, Clone)]
pub struct HostCallback {
    tx: Sender<HostEvent>,
    rx: Receiver<HostEvent>,
}

impl Default for HostCallback {
    fn default() -> Self {
        Self::new(HOST_EVENT_CAPACITY)
    }
}

impl HostCallback {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// Never blocks. Events are dropped when nobody drains the channel.
    pub fn send(&self, action: CallbackAction, plugin_id: PluginId, value1: i32, value2: i32, value3: f64) {
        let event = HostEvent {
            action,
            plugin_id,
            value1,
            value2,
            value3,
        };
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::trace!(?action, plugin_id, "host event channel full, dropping");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// A receiver for the event stream. Every receiver competes for the
    /// same events.
    pub fn receiver(&self) -> Receiver<HostEvent> {
        self.rx.clone()
    }

    pub fn try_recv(&self) -> Option<HostEvent> {
        self.rx.try_recv().ok()
    }

    /// Take every pending event.
    pub fn drain(&self) -> Vec<HostEvent> {
        self.rx.try_iter().collect()
    }
}

/// Outbound notification paths shared by the engine and all plugins: the
/// host callback and the currently registered control sink (if any).
#[derive(Default)]
pub struct Notifier {
    callback: HostCallback,
    control: RwLock<Option<Arc<dyn ControlSink>>>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("callback", &self.callback)
            .field("control", &self.control.read().is_some())
            .finish()
    }
}

impl Notifier {
    pub fn new(callback: HostCallback) -> Self {
        Self {
            callback,
            control: RwLock::new(None),
        }
    }

    #[inline]
    pub fn callback(&self, action: CallbackAction, plugin_id: PluginId, value1: i32, value2: i32, value3: f64) {
        self.callback.send(action, plugin_id, value1, value2, value3);
    }

    pub fn host_callback(&self) -> &HostCallback {
        &self.callback
    }

    pub fn control(&self) -> Option<Arc<dyn ControlSink>> {
        self.control.read().clone()
    }

    pub fn set_control(&self, sink: Option<Arc<dyn ControlSink>>) {
        *self.control.write() = sink;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_receive() {
        let callback = HostCallback::new(4);
        callback.send(CallbackAction::ProgramChanged, 2, 1, 0, 0.0);
        let event = callback.try_recv().unwrap();
        assert_eq!(event.action, CallbackAction::ProgramChanged);
        assert_eq!(event.plugin_id, 2);
        assert_eq!(event.value1, 1);
        assert!(callback.try_recv().is_none());
    }

    #[test]
    fn test_full_channel_drops() {
        let callback = HostCallback::new(2);
        for i in 0..5 {
            callback.send(CallbackAction::Debug, 0, i, 0, 0.0);
        }
        let events = callback.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].value1, 1);
    }
}
