//! Outbound state publication to the registered control UI.
//!
//! Every method goes to `<ui path>/<method>` with the plugin id as the first
//! argument. With no UI registered, every call is a no-op.

use crate::message::OscMessage;
use crate::server::OscSender;
use crate::url::OscUrl;
use consort_core::{
    ControlSink, CustomData, MidiProgramData, ParameterData, ParameterRanges, PluginId, PluginInfo,
    PortCounts,
};
use parking_lot::RwLock;
use std::sync::Arc;

pub struct ControlClient {
    sender: Arc<OscSender>,
    target: RwLock<Option<OscUrl>>,
}

impl std::fmt::Debug for ControlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlClient")
            .field("target", &*self.target.read())
            .finish()
    }
}

impl ControlClient {
    pub fn new(sender: Arc<OscSender>) -> Self {
        Self {
            sender,
            target: RwLock::new(None),
        }
    }

    /// Replace the registered UI.
    pub fn register(&self, url: OscUrl) {
        tracing::info!(%url, "control UI registered");
        *self.target.write() = Some(url);
    }

    pub fn unregister(&self) {
        if let Some(url) = self.target.write().take() {
            tracing::info!(%url, "control UI unregistered");
        }
    }

    pub fn target(&self) -> Option<OscUrl> {
        self.target.read().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.target.read().is_some()
    }

    fn send(&self, method: &str, build: impl FnOnce(OscMessage) -> OscMessage) {
        let Some(url) = self.target.read().clone() else {
            return;
        };
        let message = build(OscMessage::new(url.method_path(method)));
        if let Err(e) = self.sender.send(&url, &message) {
            tracing::warn!(path = %message.path, "control send failed: {}", e);
        }
    }
}

impl ControlSink for ControlClient {
    fn add_plugin(&self, id: PluginId, name: &str) {
        self.send("add_plugin", |m| m.arg(id as i32).arg(name));
    }

    fn remove_plugin(&self, id: PluginId) {
        self.send("remove_plugin", |m| m.arg(id as i32));
    }

    fn set_plugin_data(&self, id: PluginId, info: &PluginInfo) {
        self.send("set_plugin_data", |m| {
            m.arg(id as i32)
                .arg(info.plugin_type.map_or(-1, |t| t.to_i32()))
                .arg(info.category.to_i32())
                .arg(info.hints.bits() as i32)
                .arg(info.name.as_str())
                .arg(info.label.as_str())
                .arg(info.maker.as_str())
                .arg(info.copyright.as_str())
                .arg(info.real_name.as_str())
                .arg(info.unique_id)
        });
    }

    fn set_plugin_ports(&self, id: PluginId, counts: &PortCounts) {
        self.send("set_plugin_ports", |m| {
            m.arg(id as i32)
                .arg(counts.audio_ins as i32)
                .arg(counts.audio_outs as i32)
                .arg(counts.midi_ins as i32)
                .arg(counts.midi_outs as i32)
                .arg(counts.parameter_ins as i32)
                .arg(counts.parameter_outs as i32)
                .arg(counts.parameter_total as i32)
        });
    }

    fn set_parameter_data(&self, id: PluginId, index: i32, data: &ParameterData, name: &str, unit: &str) {
        self.send("set_parameter_data", |m| {
            m.arg(id as i32)
                .arg(index)
                .arg(data.kind.to_i32())
                .arg(data.hints.bits() as i32)
                .arg(data.rindex)
                .arg(name)
                .arg(unit)
        });
    }

    fn set_parameter_ranges(&self, id: PluginId, index: i32, ranges: &ParameterRanges) {
        self.send("set_parameter_ranges", |m| {
            m.arg(id as i32)
                .arg(index)
                .arg(ranges.def)
                .arg(ranges.min)
                .arg(ranges.max)
                .arg(ranges.step)
                .arg(ranges.step_small)
                .arg(ranges.step_large)
        });
    }

    fn set_parameter_midi_cc(&self, id: PluginId, index: i32, cc: i16) {
        self.send("set_parameter_midi_cc", |m| m.arg(id as i32).arg(index).arg(cc as i32));
    }

    fn set_parameter_midi_channel(&self, id: PluginId, index: i32, channel: u8) {
        self.send("set_parameter_midi_channel", |m| {
            m.arg(id as i32).arg(index).arg(channel as i32)
        });
    }

    fn set_parameter_value(&self, id: PluginId, index: i32, value: f64) {
        self.send("set_parameter_value", |m| m.arg(id as i32).arg(index).arg(value));
    }

    fn set_default_value(&self, id: PluginId, index: i32, value: f64) {
        self.send("set_default_value", |m| m.arg(id as i32).arg(index).arg(value));
    }

    fn set_program(&self, id: PluginId, index: i32) {
        self.send("set_program", |m| m.arg(id as i32).arg(index));
    }

    fn set_program_count(&self, id: PluginId, count: u32) {
        self.send("set_program_count", |m| m.arg(id as i32).arg(count as i32));
    }

    fn set_program_name(&self, id: PluginId, index: i32, name: &str) {
        self.send("set_program_name", |m| m.arg(id as i32).arg(index).arg(name));
    }

    fn set_midi_program(&self, id: PluginId, index: i32) {
        self.send("set_midi_program", |m| m.arg(id as i32).arg(index));
    }

    fn set_midi_program_count(&self, id: PluginId, count: u32) {
        self.send("set_midi_program_count", |m| m.arg(id as i32).arg(count as i32));
    }

    fn set_midi_program_data(&self, id: PluginId, index: i32, data: &MidiProgramData) {
        self.send("set_midi_program_data", |m| {
            m.arg(id as i32)
                .arg(index)
                .arg(data.bank as i32)
                .arg(data.program as i32)
                .arg(data.name.as_str())
        });
    }

    fn note_on(&self, id: PluginId, channel: u8, note: u8, velocity: u8) {
        self.send("note_on", |m| {
            m.arg(id as i32)
                .arg(channel as i32)
                .arg(note as i32)
                .arg(velocity as i32)
        });
    }

    fn note_off(&self, id: PluginId, channel: u8, note: u8) {
        self.send("note_off", |m| m.arg(id as i32).arg(channel as i32).arg(note as i32));
    }

    fn set_input_peak_value(&self, id: PluginId, port: u8, value: f32) {
        self.send("set_input_peak_value", |m| {
            m.arg(id as i32).arg(port as i32).arg(value as f64)
        });
    }

    fn set_output_peak_value(&self, id: PluginId, port: u8, value: f32) {
        self.send("set_output_peak_value", |m| {
            m.arg(id as i32).arg(port as i32).arg(value as f64)
        });
    }

    fn exit(&self) {
        self.send("exit", |m| m);
    }

    fn set_custom_data(&self, id: PluginId, data: &CustomData) {
        self.send("set_custom_data", |m| {
            m.arg(id as i32)
                .arg(data.kind.as_str())
                .arg(data.key.as_str())
                .arg(data.value.as_str())
        });
    }

    fn set_chunk_data(&self, id: PluginId, chunk: &[u8]) {
        self.send("set_chunk_data", |m| m.arg(id as i32).arg(chunk.to_vec()));
    }
}
