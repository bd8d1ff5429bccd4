//! The host-side stand-in for a plugin running in a child process.

use crate::loader::RouteTable;
use crate::protocol::HostCommand;
use crate::shared::BridgeShared;
use crate::state::BridgeState;
use crate::supervisor::Supervisor;
use consort_core::{
    CustomData, PluginBackend, PluginId, PluginLayout, ProcessContext, Result,
};
use std::sync::Arc;

/// Forwards every change to the child and mirrors what the child reports.
///
/// Audio passes through unchanged: the child renders to its own driver and
/// only reports peaks back.
pub struct BridgeBackend {
    supervisor: Supervisor,
    shared: Arc<BridgeShared>,
    routes: Arc<RouteTable>,
    label: String,
    maker: String,
    copyright: String,
    real_name: String,
    unique_id: i64,
}

impl std::fmt::Debug for BridgeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeBackend")
            .field("label", &self.label)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

impl BridgeBackend {
    /// Take over a supervisor whose handshake completed.
    pub fn attach(supervisor: Supervisor, routes: Arc<RouteTable>) -> crate::Result<Self> {
        let shared = supervisor.shared().clone();
        shared.transition(BridgeState::Running)?;
        let info = shared.info();
        Ok(Self {
            supervisor,
            shared,
            routes,
            label: info.label,
            maker: info.maker,
            copyright: info.copyright,
            real_name: info.real_name,
            unique_id: info.unique_id,
        })
    }

    pub fn shared(&self) -> &Arc<BridgeShared> {
        &self.shared
    }
}

impl PluginBackend for BridgeBackend {
    fn label(&self) -> &str {
        &self.label
    }

    fn maker(&self) -> &str {
        &self.maker
    }

    fn copyright(&self) -> &str {
        &self.copyright
    }

    fn real_name(&self) -> &str {
        &self.real_name
    }

    fn unique_id(&self) -> i64 {
        self.unique_id
    }

    fn reload(&mut self) -> Result<PluginLayout> {
        Ok(self.shared.info().layout())
    }

    fn parameter_value(&self, index: usize) -> f64 {
        self.shared.value(index)
    }

    fn set_parameter_value(&mut self, index: usize, value: f64) {
        self.shared.store_value(index, value);
        self.supervisor.try_send(HostCommand::SetParameterValue {
            index: index as i32,
            value,
        });
    }

    fn set_program(&mut self, index: i32) {
        self.supervisor.try_send(HostCommand::SetProgram(index));
    }

    fn set_midi_program(&mut self, index: i32) {
        self.supervisor.try_send(HostCommand::SetMidiProgram(index));
    }

    fn set_custom_data(&mut self, data: &CustomData) -> Result<()> {
        Ok(self.supervisor.send(HostCommand::SetCustomData(data.clone()))?)
    }

    fn chunk(&mut self) -> Option<Vec<u8>> {
        self.shared.chunk()
    }

    fn set_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.shared.set_chunk(chunk);
        Ok(self.supervisor.send(HostCommand::SetChunk(chunk.to_vec()))?)
    }

    fn process(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        ctx: &mut ProcessContext<'_>,
    ) {
        let frames = ctx.frames;
        for (i, output) in outputs.iter_mut().enumerate() {
            match inputs.get(i) {
                Some(input) => output[..frames].copy_from_slice(&input[..frames]),
                None => output[..frames].fill(0.0),
            }
        }
    }

    fn show_gui(&mut self, visible: bool) -> Result<()> {
        let command = if visible {
            HostCommand::Show
        } else {
            HostCommand::Hide
        };
        Ok(self.supervisor.send(command)?)
    }

    fn prepare_for_save(&mut self) {
        if let Err(e) = self.supervisor.save() {
            tracing::warn!(id = self.shared.id(), "bridge save: {}", e);
        }
    }

    fn reported_peaks(&self) -> Option<[f32; 4]> {
        Some(self.shared.peaks())
    }

    fn forward_note(&mut self, channel: u8, note: u8, velocity: u8) -> bool {
        let command = if velocity > 0 {
            HostCommand::NoteOn {
                channel,
                note,
                velocity,
            }
        } else {
            HostCommand::NoteOff { channel, note }
        };
        self.supervisor.try_send(command)
    }

    fn id_changed(&mut self, new_id: PluginId) {
        let old_id = self.shared.id();
        self.routes.rekey(old_id, new_id, &self.shared);
        self.shared.set_id(new_id);
        let url = self.supervisor.plugin_url();
        tracing::debug!(old_id, new_id, %url, "bridge renumbered");
        if let Err(e) = self.supervisor.send(HostCommand::UpdateHost(url.to_string())) {
            tracing::warn!(new_id, "bridge renumber: {}", e);
        }
    }
}

impl Drop for BridgeBackend {
    fn drop(&mut self) {
        self.routes.remove(self.shared.id(), &self.shared);
        self.supervisor.close();
    }
}
