//! Messages between the host and a bridge child.
//!
//! Both directions travel over the control channel as plain OSC messages:
//!
//! - [`HostCommand`]: host to child, at `<child url>/<method>`
//! - [`BridgeReport`]: child to host, at `<host url>/<client>/<NN>/bridge_<method>`
//!
//! The child is started as
//! `consort-bridge <host-osc-url> <type> <filename> <label> [name]`, see
//! [`BridgeArgs`].

use crate::{BridgeError, Result};
use consort_core::{CustomData, MidiProgramData, ParameterRanges, PluginType};
use consort_osc::{OscMessage, OscUrl};
use std::ffi::OsString;
use std::path::PathBuf;

/// Host to child.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    SetParameterValue { index: i32, value: f64 },
    SetProgram(i32),
    SetMidiProgram(i32),
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    SetCustomData(CustomData),
    SetChunk(Vec<u8>),
    Configure { key: String, value: String },
    /// Flush state to the host, then acknowledge with [`BridgeReport::Saved`].
    Save,
    Show,
    Hide,
    Quit,
    /// The plugin was renumbered; report to this URL from now on.
    UpdateHost(String),
}

impl HostCommand {
    pub fn method(&self) -> &'static str {
        match self {
            HostCommand::SetParameterValue { .. } => "set_parameter_value",
            HostCommand::SetProgram(_) => "set_program",
            HostCommand::SetMidiProgram(_) => "set_midi_program",
            HostCommand::NoteOn { .. } => "note_on",
            HostCommand::NoteOff { .. } => "note_off",
            HostCommand::SetCustomData(_) => "set_custom_data",
            HostCommand::SetChunk(_) => "set_chunk",
            HostCommand::Configure { .. } => "configure",
            HostCommand::Save => "__Save",
            HostCommand::Show => "show",
            HostCommand::Hide => "hide",
            HostCommand::Quit => "quit",
            HostCommand::UpdateHost(_) => "update_host",
        }
    }

    pub fn to_message(&self, child: &OscUrl) -> OscMessage {
        let message = OscMessage::new(child.method_path(self.method()));
        match self {
            HostCommand::SetParameterValue { index, value } => message.arg(*index).arg(*value),
            HostCommand::SetProgram(index) | HostCommand::SetMidiProgram(index) => {
                message.arg(*index)
            }
            HostCommand::NoteOn {
                channel,
                note,
                velocity,
            } => message
                .arg(*channel as i32)
                .arg(*note as i32)
                .arg(*velocity as i32),
            HostCommand::NoteOff { channel, note } => {
                message.arg(*channel as i32).arg(*note as i32)
            }
            HostCommand::SetCustomData(data) => message
                .arg(data.kind.as_str())
                .arg(data.key.as_str())
                .arg(data.value.as_str()),
            HostCommand::SetChunk(chunk) => message.arg(chunk.clone()),
            HostCommand::Configure { key, value } => message.arg(key.as_str()).arg(value.as_str()),
            HostCommand::UpdateHost(url) => message.arg(url.as_str()),
            HostCommand::Save | HostCommand::Show | HostCommand::Hide | HostCommand::Quit => {
                message
            }
        }
    }

    /// Parse a command addressed to `method` (the last path segment).
    pub fn parse(method: &str, m: &OscMessage) -> Result<Self> {
        let command = match method {
            "set_parameter_value" => {
                m.expect("id")?;
                HostCommand::SetParameterValue {
                    index: m.int(0)?,
                    value: m.double(1)?,
                }
            }
            "set_program" => {
                m.expect("i")?;
                HostCommand::SetProgram(m.int(0)?)
            }
            "set_midi_program" => {
                m.expect("i")?;
                HostCommand::SetMidiProgram(m.int(0)?)
            }
            "note_on" => {
                m.expect("iii")?;
                HostCommand::NoteOn {
                    channel: channel(m, 0)?,
                    note: midi_byte(m, 1)?,
                    velocity: midi_byte(m, 2)?,
                }
            }
            "note_off" => {
                m.expect("ii")?;
                HostCommand::NoteOff {
                    channel: channel(m, 0)?,
                    note: midi_byte(m, 1)?,
                }
            }
            "set_custom_data" => {
                m.expect("sss")?;
                HostCommand::SetCustomData(CustomData::new(m.str(0)?, m.str(1)?, m.str(2)?))
            }
            "set_chunk" => {
                m.expect("b")?;
                HostCommand::SetChunk(m.blob(0)?.to_vec())
            }
            "configure" => {
                m.expect("ss")?;
                HostCommand::Configure {
                    key: m.str(0)?.to_string(),
                    value: m.str(1)?.to_string(),
                }
            }
            "__Save" => HostCommand::Save,
            "show" => HostCommand::Show,
            "hide" => HostCommand::Hide,
            "quit" => HostCommand::Quit,
            "update_host" => {
                m.expect("s")?;
                HostCommand::UpdateHost(m.str(0)?.to_string())
            }
            other => return Err(BridgeError::Protocol(format!("unknown command '{}'", other))),
        };
        Ok(command)
    }
}

/// Child to host. The introspection variants make up the handshake dump,
/// which ends with [`BridgeReport::Update`].
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeReport {
    PluginInfo {
        category: i32,
        hints: u32,
        name: String,
        label: String,
        maker: String,
        copyright: String,
        real_name: String,
        unique_id: i64,
    },
    AudioCount { ins: u32, outs: u32 },
    MidiCount { ins: u32, outs: u32 },
    ParameterCount { ins: u32, outs: u32, total: u32 },
    ParameterInfo { index: i32, name: String, unit: String },
    ParameterData {
        index: i32,
        kind: i32,
        rindex: i32,
        hints: u32,
        midi_channel: u8,
        midi_cc: i16,
    },
    ParameterRanges { index: i32, ranges: ParameterRanges },
    ProgramCount(u32),
    ProgramInfo { index: i32, name: String },
    MidiProgramCount(u32),
    MidiProgramInfo { index: i32, data: MidiProgramData },
    SetParameterValue { index: i32, value: f64 },
    SetDefaultValue { index: i32, value: f64 },
    SetProgram(i32),
    SetMidiProgram(i32),
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    SetCustomData(CustomData),
    SetChunkData(Vec<u8>),
    /// `port` is 1 or 2.
    InputPeak { port: u8, value: f32 },
    OutputPeak { port: u8, value: f32 },
    Saved,
    /// Handshake complete; carries the child's own control URL.
    Update(String),
    /// The child could not load the plugin.
    Error(String),
}

impl BridgeReport {
    /// Method name without the `bridge_` prefix.
    pub fn method(&self) -> &'static str {
        match self {
            BridgeReport::PluginInfo { .. } => "plugin_info",
            BridgeReport::AudioCount { .. } => "audio_count",
            BridgeReport::MidiCount { .. } => "midi_count",
            BridgeReport::ParameterCount { .. } => "parameter_count",
            BridgeReport::ParameterInfo { .. } => "parameter_info",
            BridgeReport::ParameterData { .. } => "parameter_data",
            BridgeReport::ParameterRanges { .. } => "parameter_ranges",
            BridgeReport::ProgramCount(_) => "program_count",
            BridgeReport::ProgramInfo { .. } => "program_info",
            BridgeReport::MidiProgramCount(_) => "midi_program_count",
            BridgeReport::MidiProgramInfo { .. } => "midi_program_info",
            BridgeReport::SetParameterValue { .. } => "set_parameter_value",
            BridgeReport::SetDefaultValue { .. } => "set_default_value",
            BridgeReport::SetProgram(_) => "set_program",
            BridgeReport::SetMidiProgram(_) => "set_midi_program",
            BridgeReport::NoteOn { .. } => "note_on",
            BridgeReport::NoteOff { .. } => "note_off",
            BridgeReport::SetCustomData(_) => "set_custom_data",
            BridgeReport::SetChunkData(_) => "set_chunk_data",
            BridgeReport::InputPeak { .. } => "set_input_peak_value",
            BridgeReport::OutputPeak { .. } => "set_output_peak_value",
            BridgeReport::Saved => "saved",
            BridgeReport::Update(_) => "update",
            BridgeReport::Error(_) => "error",
        }
    }

    /// `host` is the plugin URL the child was started with.
    pub fn to_message(&self, host: &OscUrl) -> OscMessage {
        let path = host.method_path(&format!("{}{}", consort_osc::address::BRIDGE_PREFIX, self.method()));
        let m = OscMessage::new(path);
        match self {
            BridgeReport::PluginInfo {
                category,
                hints,
                name,
                label,
                maker,
                copyright,
                real_name,
                unique_id,
            } => m
                .arg(*category)
                .arg(*hints as i32)
                .arg(name.as_str())
                .arg(label.as_str())
                .arg(maker.as_str())
                .arg(copyright.as_str())
                .arg(real_name.as_str())
                .arg(*unique_id),
            BridgeReport::AudioCount { ins, outs } | BridgeReport::MidiCount { ins, outs } => {
                m.arg(*ins as i32).arg(*outs as i32)
            }
            BridgeReport::ParameterCount { ins, outs, total } => {
                m.arg(*ins as i32).arg(*outs as i32).arg(*total as i32)
            }
            BridgeReport::ParameterInfo { index, name, unit } => {
                m.arg(*index).arg(name.as_str()).arg(unit.as_str())
            }
            BridgeReport::ParameterData {
                index,
                kind,
                rindex,
                hints,
                midi_channel,
                midi_cc,
            } => m
                .arg(*index)
                .arg(*kind)
                .arg(*rindex)
                .arg(*hints as i32)
                .arg(*midi_channel as i32)
                .arg(*midi_cc as i32),
            BridgeReport::ParameterRanges { index, ranges } => m
                .arg(*index)
                .arg(ranges.def)
                .arg(ranges.min)
                .arg(ranges.max)
                .arg(ranges.step)
                .arg(ranges.step_small)
                .arg(ranges.step_large),
            BridgeReport::ProgramCount(count) | BridgeReport::MidiProgramCount(count) => {
                m.arg(*count as i32)
            }
            BridgeReport::ProgramInfo { index, name } => m.arg(*index).arg(name.as_str()),
            BridgeReport::MidiProgramInfo { index, data } => m
                .arg(*index)
                .arg(data.bank as i32)
                .arg(data.program as i32)
                .arg(data.name.as_str()),
            BridgeReport::SetParameterValue { index, value }
            | BridgeReport::SetDefaultValue { index, value } => m.arg(*index).arg(*value),
            BridgeReport::SetProgram(index) | BridgeReport::SetMidiProgram(index) => m.arg(*index),
            BridgeReport::NoteOn {
                channel,
                note,
                velocity,
            } => m
                .arg(*channel as i32)
                .arg(*note as i32)
                .arg(*velocity as i32),
            BridgeReport::NoteOff { channel, note } => m.arg(*channel as i32).arg(*note as i32),
            BridgeReport::SetCustomData(data) => m
                .arg(data.kind.as_str())
                .arg(data.key.as_str())
                .arg(data.value.as_str()),
            BridgeReport::SetChunkData(chunk) => m.arg(chunk.clone()),
            BridgeReport::InputPeak { port, value } | BridgeReport::OutputPeak { port, value } => {
                m.arg(*port as i32).arg(*value)
            }
            BridgeReport::Saved => m,
            BridgeReport::Update(url) | BridgeReport::Error(url) => m.arg(url.as_str()),
        }
    }

    /// Parse a report; `method` has the `bridge_` prefix stripped.
    pub fn parse(method: &str, m: &OscMessage) -> Result<Self> {
        let report = match method {
            "plugin_info" => {
                m.expect("iisssssh")?;
                BridgeReport::PluginInfo {
                    category: m.int(0)?,
                    hints: m.int(1)? as u32,
                    name: m.str(2)?.to_string(),
                    label: m.str(3)?.to_string(),
                    maker: m.str(4)?.to_string(),
                    copyright: m.str(5)?.to_string(),
                    real_name: m.str(6)?.to_string(),
                    unique_id: m.long(7)?,
                }
            }
            "audio_count" => {
                m.expect("ii")?;
                BridgeReport::AudioCount {
                    ins: count(m, 0)?,
                    outs: count(m, 1)?,
                }
            }
            "midi_count" => {
                m.expect("ii")?;
                BridgeReport::MidiCount {
                    ins: count(m, 0)?,
                    outs: count(m, 1)?,
                }
            }
            "parameter_count" => {
                m.expect("iii")?;
                BridgeReport::ParameterCount {
                    ins: count(m, 0)?,
                    outs: count(m, 1)?,
                    total: count(m, 2)?,
                }
            }
            "parameter_info" => {
                m.expect("iss")?;
                BridgeReport::ParameterInfo {
                    index: m.int(0)?,
                    name: m.str(1)?.to_string(),
                    unit: m.str(2)?.to_string(),
                }
            }
            "parameter_data" => {
                m.expect("iiiiii")?;
                BridgeReport::ParameterData {
                    index: m.int(0)?,
                    kind: m.int(1)?,
                    rindex: m.int(2)?,
                    hints: m.int(3)? as u32,
                    midi_channel: channel(m, 4)?,
                    midi_cc: m.int(5)?.clamp(-1, i16::MAX as i32) as i16,
                }
            }
            "parameter_ranges" => {
                m.expect("idddddd")?;
                BridgeReport::ParameterRanges {
                    index: m.int(0)?,
                    ranges: ParameterRanges {
                        def: m.double(1)?,
                        min: m.double(2)?,
                        max: m.double(3)?,
                        step: m.double(4)?,
                        step_small: m.double(5)?,
                        step_large: m.double(6)?,
                    },
                }
            }
            "program_count" => {
                m.expect("i")?;
                BridgeReport::ProgramCount(count(m, 0)?)
            }
            "program_info" => {
                m.expect("is")?;
                BridgeReport::ProgramInfo {
                    index: m.int(0)?,
                    name: m.str(1)?.to_string(),
                }
            }
            "midi_program_count" => {
                m.expect("i")?;
                BridgeReport::MidiProgramCount(count(m, 0)?)
            }
            "midi_program_info" => {
                m.expect("iiis")?;
                BridgeReport::MidiProgramInfo {
                    index: m.int(0)?,
                    data: MidiProgramData::new(count(m, 1)?, count(m, 2)?, m.str(3)?),
                }
            }
            "set_parameter_value" => {
                m.expect("id")?;
                BridgeReport::SetParameterValue {
                    index: m.int(0)?,
                    value: m.double(1)?,
                }
            }
            "set_default_value" => {
                m.expect("id")?;
                BridgeReport::SetDefaultValue {
                    index: m.int(0)?,
                    value: m.double(1)?,
                }
            }
            "set_program" => {
                m.expect("i")?;
                BridgeReport::SetProgram(m.int(0)?)
            }
            "set_midi_program" => {
                m.expect("i")?;
                BridgeReport::SetMidiProgram(m.int(0)?)
            }
            "note_on" => {
                m.expect("iii")?;
                BridgeReport::NoteOn {
                    channel: channel(m, 0)?,
                    note: midi_byte(m, 1)?,
                    velocity: midi_byte(m, 2)?,
                }
            }
            "note_off" => {
                m.expect("ii")?;
                BridgeReport::NoteOff {
                    channel: channel(m, 0)?,
                    note: midi_byte(m, 1)?,
                }
            }
            "set_custom_data" => {
                m.expect("sss")?;
                BridgeReport::SetCustomData(CustomData::new(m.str(0)?, m.str(1)?, m.str(2)?))
            }
            "set_chunk_data" => {
                m.expect("b")?;
                BridgeReport::SetChunkData(m.blob(0)?.to_vec())
            }
            "set_input_peak_value" => {
                m.expect("if")?;
                BridgeReport::InputPeak {
                    port: peak_port(m)?,
                    value: m.float(1)?,
                }
            }
            "set_output_peak_value" => {
                m.expect("if")?;
                BridgeReport::OutputPeak {
                    port: peak_port(m)?,
                    value: m.float(1)?,
                }
            }
            "saved" => BridgeReport::Saved,
            "update" => {
                m.expect("s")?;
                BridgeReport::Update(m.str(0)?.to_string())
            }
            "error" => {
                m.expect("s")?;
                BridgeReport::Error(m.str(0)?.to_string())
            }
            other => return Err(BridgeError::Protocol(format!("unknown report 'bridge_{}'", other))),
        };
        Ok(report)
    }
}

fn count(m: &OscMessage, at: usize) -> Result<u32> {
    let value = m.int(at)?;
    u32::try_from(value).map_err(|_| BridgeError::Protocol(format!("negative count {} in {}", value, m.path)))
}

fn channel(m: &OscMessage, at: usize) -> Result<u8> {
    Ok(m.int(at)?.clamp(0, 15) as u8)
}

fn midi_byte(m: &OscMessage, at: usize) -> Result<u8> {
    Ok(m.int(at)?.clamp(0, 127) as u8)
}

fn peak_port(m: &OscMessage) -> Result<u8> {
    match m.int(0)? {
        port @ (1 | 2) => Ok(port as u8),
        other => Err(BridgeError::Protocol(format!("invalid peak port {}", other))),
    }
}

/// Command line of the child process.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeArgs {
    /// Where to send reports, including the `/<client>/<NN>` path.
    pub host_url: String,
    /// The real format of the bridged plugin.
    pub plugin_type: PluginType,
    pub filename: PathBuf,
    pub label: String,
    pub name: Option<String>,
}

pub const USAGE: &str = "usage: consort-bridge <host-osc-url> <type> <filename> <label> [name]";

impl BridgeArgs {
    /// Parse the arguments after the program name.
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        if !(4..=5).contains(&args.len()) {
            return Err(BridgeError::InvalidArgs(USAGE.into()));
        }
        let plugin_type = args[1]
            .parse::<PluginType>()
            .map_err(BridgeError::InvalidArgs)?;
        if plugin_type == PluginType::Bridge {
            return Err(BridgeError::InvalidArgs("a bridge cannot host a bridge".into()));
        }
        OscUrl::parse(&args[0])?;
        Ok(Self {
            host_url: args[0].clone(),
            plugin_type,
            filename: PathBuf::from(&args[2]),
            label: args[3].clone(),
            name: args.get(4).filter(|n| !n.is_empty()).cloned(),
        })
    }

    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            self.host_url.clone().into(),
            self.plugin_type.as_str().into(),
            self.filename.clone().into(),
            self.label.clone().into(),
        ];
        if let Some(ref name) = self.name {
            args.push(name.clone().into());
        }
        args
    }
}
