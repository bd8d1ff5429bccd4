//! Persisted plugin state.

use super::PluginState;
use crate::custom_data::CustomData;
use crate::error::Result;
use crate::types::PluginHints;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedParameter {
    pub index: u32,
    /// Format-native index; used to match parameters on load.
    pub rindex: i32,
    pub name: String,
    pub value: f64,
    pub midi_channel: u8,
    pub midi_cc: i16,
}

/// Everything needed to restore a plugin instance, minus the binary itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavedState {
    pub active: bool,
    pub dry_wet: f64,
    pub volume: f64,
    pub balance_left: f64,
    pub balance_right: f64,
    pub ctrl_in_channel: i8,
    pub current_program: i32,
    pub current_program_name: Option<String>,
    /// (bank, program) of the selected MIDI program.
    pub current_midi_program: Option<(u32, u32)>,
    pub parameters: Vec<SavedParameter>,
    pub custom_data: Vec<CustomData>,
    pub chunk: Option<Vec<u8>>,
}

impl Default for SavedState {
    fn default() -> Self {
        Self {
            active: true,
            dry_wet: 1.0,
            volume: 1.0,
            balance_left: -1.0,
            balance_right: 1.0,
            ctrl_in_channel: 0,
            current_program: -1,
            current_program_name: None,
            current_midi_program: None,
            parameters: Vec::new(),
            custom_data: Vec::new(),
            chunk: None,
        }
    }
}

impl PluginState {
    /// Snapshot the state. Bridges are asked to flush their state first,
    /// which may block for a bounded time.
    pub fn save_state(&mut self) -> SavedState {
        self.backend.prepare_for_save();
        // A flushing bridge reports its custom data as postponed events.
        self.post_events_run();

        let parameters = self
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_input() && p.is_automable())
            .map(|(k, p)| SavedParameter {
                index: k as u32,
                rindex: p.data.rindex,
                name: p.name.clone(),
                value: self.backend.parameter_value(k),
                midi_channel: p.data.midi_channel,
                midi_cc: p.data.midi_cc,
            })
            .collect();

        let chunk = self.chunk_data();
        SavedState {
            active: self.active,
            dry_wet: self.dry_wet,
            volume: self.volume,
            balance_left: self.balance_left,
            balance_right: self.balance_right,
            ctrl_in_channel: self.ctrl_in_channel,
            current_program: self.programs.current,
            current_program_name: self.programs.name(self.programs.current).map(str::to_string),
            current_midi_program: self
                .midi_programs
                .get(self.midi_programs.current)
                .map(|d| (d.bank, d.program)),
            parameters,
            custom_data: self.custom_data.iter().cloned().collect(),
            chunk,
        }
    }

    /// Restore a snapshot. Custom data and chunk go first so that program
    /// and parameter values applied afterwards win.
    ///
    /// Entries that no longer match the plugin (renamed parameters, missing
    /// programs) are skipped with a log line.
    pub fn load_state(&mut self, saved: &SavedState) -> Result<()> {
        for data in &saved.custom_data {
            if let Err(e) = self.set_custom_data(&data.kind, &data.key, &data.value) {
                tracing::warn!(id = self.id, key = %data.key, "skipping custom data: {}", e);
            }
        }
        if let Some(ref chunk) = saved.chunk {
            if self.hints.contains(PluginHints::USES_CHUNKS) {
                self.set_chunk_data(chunk)?;
            }
        }

        let program = match saved.current_program_name {
            Some(ref name) if self.programs.name(saved.current_program) != Some(name.as_str()) => {
                self.programs.names.iter().position(|n| n == name).map(|p| p as i32)
            }
            _ => Some(saved.current_program),
        };
        if let Some(program) = program.filter(|p| *p >= 0) {
            if let Err(e) = self.set_program(program, true, true, true) {
                tracing::warn!(id = self.id, "skipping program: {}", e);
            }
        }
        if let Some((bank, program)) = saved.current_midi_program {
            if let Err(e) = self.set_midi_program_by_id(bank, program, true, true, true) {
                tracing::warn!(id = self.id, "skipping midi program: {}", e);
            }
        }

        for param in &saved.parameters {
            let index = self
                .params
                .iter()
                .position(|p| p.data.rindex == param.rindex && p.name == param.name)
                .or_else(|| {
                    let index = param.index as usize;
                    (index < self.params.len() && self.params[index].data.rindex == param.rindex)
                        .then_some(index)
                });
            let Some(index) = index else {
                tracing::debug!(id = self.id, name = %param.name, "saved parameter not found");
                continue;
            };
            self.set_parameter_value(index, param.value, true, true, true);
            self.set_parameter_midi_channel(index, param.midi_channel, true, true)?;
            self.set_parameter_midi_cc(index, param.midi_cc, true, true)?;
        }

        self.set_ctrl_in_channel(saved.ctrl_in_channel);
        self.set_dry_wet(saved.dry_wet, true, true);
        self.set_volume(saved.volume, true, true);
        self.set_balance_left(saved.balance_left, true, true);
        self.set_balance_right(saved.balance_right, true, true);
        self.set_active(saved.active, true, true);
        Ok(())
    }
}
