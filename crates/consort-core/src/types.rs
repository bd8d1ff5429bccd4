//! Shared identifiers, format tags and hint masks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Slot index into the engine registry.
pub type PluginId = u32;

/// Returned to C-style callers in place of an id when a plugin could not be added.
pub const INVALID_PLUGIN_ID: PluginId = u32::MAX;

/// Registry size in rack mode.
pub const MAX_RACK_PLUGINS: usize = 16;

/// Registry size in the other modes; keeps OSC ids at two digits.
pub const MAX_DEFAULT_PLUGINS: usize = 99;

/// Audio ports per direction a plugin may expose. Per-block port tables
/// live on the stack up to this size.
pub const MAX_AUDIO_PORTS: usize = 32;

/// Index used by OSC and the host callback for "no parameter".
pub const PARAMETER_NULL: i32 = -1;
pub const PARAMETER_ACTIVE: i32 = -2;
pub const PARAMETER_DRYWET: i32 = -3;
pub const PARAMETER_VOLUME: i32 = -4;
pub const PARAMETER_BALANCE_LEFT: i32 = -5;
pub const PARAMETER_BALANCE_RIGHT: i32 = -6;

/// Upper bound of the volume macro control (+2 dB headroom).
pub const MAX_VOLUME: f64 = 1.27;

/// The five always-present macro controls addressed by negative indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalParameter {
    Active,
    DryWet,
    Volume,
    BalanceLeft,
    BalanceRight,
}

impl InternalParameter {
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            PARAMETER_ACTIVE => Some(Self::Active),
            PARAMETER_DRYWET => Some(Self::DryWet),
            PARAMETER_VOLUME => Some(Self::Volume),
            PARAMETER_BALANCE_LEFT => Some(Self::BalanceLeft),
            PARAMETER_BALANCE_RIGHT => Some(Self::BalanceRight),
            _ => None,
        }
    }

    pub fn index(self) -> i32 {
        match self {
            Self::Active => PARAMETER_ACTIVE,
            Self::DryWet => PARAMETER_DRYWET,
            Self::Volume => PARAMETER_VOLUME,
            Self::BalanceLeft => PARAMETER_BALANCE_LEFT,
            Self::BalanceRight => PARAMETER_BALANCE_RIGHT,
        }
    }
}

/// Plugin format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Internal,
    Ladspa,
    Dssi,
    Lv2,
    Vst,
    Vst3,
    Gig,
    Sf2,
    Sfz,
    Bridge,
}

impl PluginType {
    const ALL: [PluginType; 10] = [
        PluginType::Internal,
        PluginType::Ladspa,
        PluginType::Dssi,
        PluginType::Lv2,
        PluginType::Vst,
        PluginType::Vst3,
        PluginType::Gig,
        PluginType::Sf2,
        PluginType::Sfz,
        PluginType::Bridge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PluginType::Internal => "internal",
            PluginType::Ladspa => "ladspa",
            PluginType::Dssi => "dssi",
            PluginType::Lv2 => "lv2",
            PluginType::Vst => "vst",
            PluginType::Vst3 => "vst3",
            PluginType::Gig => "gig",
            PluginType::Sf2 => "sf2",
            PluginType::Sfz => "sfz",
            PluginType::Bridge => "bridge",
        }
    }

    /// Wire value used in OSC messages.
    pub fn to_i32(self) -> i32 {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0) as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| format!("unknown plugin type '{}'", s))
    }
}

/// Architecture of the plugin binary. Anything other than the host's own
/// architecture has to run in a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryType {
    Native,
    Posix32,
    Posix64,
    Win32,
    Win64,
}

impl BinaryType {
    /// The concrete binary type the host itself was built as.
    pub const fn host() -> Self {
        if cfg!(windows) {
            if cfg!(target_pointer_width = "64") {
                BinaryType::Win64
            } else {
                BinaryType::Win32
            }
        } else if cfg!(target_pointer_width = "64") {
            BinaryType::Posix64
        } else {
            BinaryType::Posix32
        }
    }

    pub fn is_native(self) -> bool {
        self == BinaryType::Native || self == Self::host()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BinaryType::Native => "native",
            BinaryType::Posix32 => "posix32",
            BinaryType::Posix64 => "posix64",
            BinaryType::Win32 => "win32",
            BinaryType::Win64 => "win64",
        }
    }
}

impl fmt::Display for BinaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginCategory {
    #[default]
    None,
    Synth,
    Delay,
    Eq,
    Filter,
    Dynamics,
    Modulator,
    Utility,
    Other,
}

impl PluginCategory {
    const ALL: [PluginCategory; 9] = [
        PluginCategory::None,
        PluginCategory::Synth,
        PluginCategory::Delay,
        PluginCategory::Eq,
        PluginCategory::Filter,
        PluginCategory::Dynamics,
        PluginCategory::Modulator,
        PluginCategory::Utility,
        PluginCategory::Other,
    ];

    pub fn to_i32(self) -> i32 {
        Self::ALL.iter().position(|c| *c == self).unwrap_or(0) as i32
    }

    pub fn from_i32(value: i32) -> Self {
        usize::try_from(value)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or_default()
    }
}

hint_flags! {
    /// Capabilities of a loaded plugin.
    pub struct PluginHints {
        const IS_BRIDGE = 0x001;
        const IS_RTSAFE = 0x002;
        const IS_SYNTH = 0x004;
        const HAS_GUI = 0x008;
        const USES_CHUNKS = 0x010;
        const CAN_DRYWET = 0x020;
        const CAN_VOLUME = 0x040;
        const CAN_BALANCE = 0x080;
        /// The GUI must be idled and its events drained on the host's main thread.
        const USES_SINGLE_THREAD = 0x100;
    }
}

hint_flags! {
    pub struct ParameterHints {
        const BOOLEAN = 0x01;
        const INTEGER = 0x02;
        const LOGARITHMIC = 0x04;
        const ENABLED = 0x08;
        const AUTOMABLE = 0x10;
        const USES_SAMPLERATE = 0x20;
        const USES_CUSTOM_TEXT = 0x40;
    }
}

/// Static description of a plugin as published to control UIs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub plugin_type: Option<PluginType>,
    pub category: PluginCategory,
    pub hints: PluginHints,
    pub name: String,
    pub label: String,
    pub maker: String,
    pub copyright: String,
    pub real_name: String,
    pub unique_id: i64,
}

/// Port and parameter counts published alongside [`PluginInfo`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortCounts {
    pub audio_ins: u32,
    pub audio_outs: u32,
    pub midi_ins: u32,
    pub midi_outs: u32,
    pub parameter_ins: u32,
    pub parameter_outs: u32,
    pub parameter_total: u32,
}
