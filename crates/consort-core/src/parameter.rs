//! Parameter table entries: data, ranges and clamping.
//!
//! Every value written into a plugin passes through [`ParameterRanges::fix_value`],
//! so out-of-range input is clamped rather than rejected.
//!
//! ```
//! use consort_core::parameter::ParameterRanges;
//! use consort_core::ParameterHints;
//!
//! let ranges = ParameterRanges::new(0.0, 2.0, 1.0);
//! assert_eq!(ranges.fix_value(ParameterHints::empty(), 5.0), 2.0);
//! assert_eq!(ranges.normalize(1.0), 0.5);
//! ```

use crate::midi::{is_assignable_cc, MAX_MIDI_CC};
use crate::types::ParameterHints;
use serde::{Deserialize, Serialize};

/// Role of a parameter in the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    #[default]
    Unknown,
    Input,
    Output,
    /// Reports plugin latency in frames; written by the plugin.
    Latency,
    /// Fed the engine sample rate by the host.
    SampleRate,
    /// Format-internal control the host drives itself.
    Special,
}

impl ParameterType {
    pub fn to_i32(self) -> i32 {
        match self {
            ParameterType::Unknown => 0,
            ParameterType::Input => 1,
            ParameterType::Output => 2,
            ParameterType::Latency => 3,
            ParameterType::SampleRate => 4,
            ParameterType::Special => 5,
        }
    }

    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => ParameterType::Input,
            2 => ParameterType::Output,
            3 => ParameterType::Latency,
            4 => ParameterType::SampleRate,
            5 => ParameterType::Special,
            _ => ParameterType::Unknown,
        }
    }
}

/// Routing data of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterData {
    pub kind: ParameterType,
    /// Position in the table.
    pub index: i32,
    /// Format-native index.
    pub rindex: i32,
    pub hints: ParameterHints,
    /// 0-15.
    pub midi_channel: u8,
    /// -1 for none, otherwise 0-95.
    pub midi_cc: i16,
}

impl Default for ParameterData {
    fn default() -> Self {
        Self {
            kind: ParameterType::Unknown,
            index: -1,
            rindex: -1,
            hints: ParameterHints::empty(),
            midi_channel: 0,
            midi_cc: -1,
        }
    }
}

impl ParameterData {
    /// Clamp a requested controller binding to what the table accepts.
    pub fn fix_midi_cc(cc: i16) -> i16 {
        if cc < 0 || cc > MAX_MIDI_CC || !is_assignable_cc(cc) {
            -1
        } else {
            cc
        }
    }
}

/// Numeric range with min <= def <= max and max > min.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRanges {
    pub def: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub step_small: f64,
    pub step_large: f64,
}

impl Default for ParameterRanges {
    fn default() -> Self {
        Self {
            def: 0.0,
            min: 0.0,
            max: 1.0,
            step: 0.01,
            step_small: 0.0001,
            step_large: 0.1,
        }
    }
}

impl ParameterRanges {
    pub fn new(min: f64, max: f64, def: f64) -> Self {
        let mut ranges = Self {
            def,
            min,
            max,
            ..Default::default()
        };
        ranges.fixup();
        ranges
    }

    pub fn with_steps(mut self, step: f64, step_small: f64, step_large: f64) -> Self {
        self.step = step;
        self.step_small = step_small;
        self.step_large = step_large;
        self
    }

    /// Restore the range invariant: a degenerate range is widened by moving
    /// max, then the default is clamped into it.
    pub fn fixup(&mut self) {
        if !self.min.is_finite() {
            self.min = 0.0;
        }
        if !self.max.is_finite() || self.max <= self.min {
            self.max = self.min + 0.1;
        }
        if !self.def.is_finite() {
            self.def = self.min;
        }
        self.def = self.def.clamp(self.min, self.max);
    }

    /// Clamp `value` into range, snapping booleans to min/max and rounding
    /// integers. NaN maps to min.
    pub fn fix_value(&self, hints: ParameterHints, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        let mut value = value.clamp(self.min, self.max);
        if hints.contains(ParameterHints::BOOLEAN) {
            let middle = (self.min + self.max) / 2.0;
            value = if value >= middle { self.max } else { self.min };
        } else if hints.contains(ParameterHints::INTEGER) {
            value = value.round().clamp(self.min, self.max);
        }
        value
    }

    #[inline]
    pub fn normalize(&self, value: f64) -> f64 {
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }

    #[inline]
    pub fn unnormalize(&self, normalized: f64) -> f64 {
        self.min + normalized.clamp(0.0, 1.0) * (self.max - self.min)
    }
}

/// Static description of one parameter as reported by a format adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescription {
    pub kind: ParameterType,
    pub rindex: i32,
    pub hints: ParameterHints,
    pub ranges: ParameterRanges,
    pub name: String,
    pub unit: String,
    /// Initial controller binding, -1 for none.
    pub midi_cc: i16,
}

impl ParameterDescription {
    pub fn input(rindex: i32, name: &str, ranges: ParameterRanges) -> Self {
        Self {
            kind: ParameterType::Input,
            rindex,
            hints: ParameterHints::ENABLED | ParameterHints::AUTOMABLE,
            ranges,
            name: name.to_string(),
            unit: String::new(),
            midi_cc: -1,
        }
    }

    pub fn output(rindex: i32, name: &str, ranges: ParameterRanges) -> Self {
        Self {
            kind: ParameterType::Output,
            rindex,
            hints: ParameterHints::ENABLED,
            ranges,
            name: name.to_string(),
            unit: String::new(),
            midi_cc: -1,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    pub fn with_hints(mut self, hints: ParameterHints) -> Self {
        self.hints.insert(hints);
        self
    }

    pub fn with_midi_cc(mut self, cc: i16) -> Self {
        self.midi_cc = cc;
        self
    }
}

/// One entry of a plugin's parameter table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameter {
    pub data: ParameterData,
    pub ranges: ParameterRanges,
    pub name: String,
    pub unit: String,
}

impl Parameter {
    pub fn from_description(index: i32, desc: &ParameterDescription) -> Self {
        let mut ranges = desc.ranges;
        ranges.fixup();
        Self {
            data: ParameterData {
                kind: desc.kind,
                index,
                rindex: desc.rindex,
                hints: desc.hints,
                midi_channel: 0,
                midi_cc: ParameterData::fix_midi_cc(desc.midi_cc),
            },
            ranges,
            name: desc.name.clone(),
            unit: desc.unit.clone(),
        }
    }

    #[inline]
    pub fn fix_value(&self, value: f64) -> f64 {
        self.ranges.fix_value(self.data.hints, value)
    }

    pub fn is_input(&self) -> bool {
        self.data.kind == ParameterType::Input
    }

    pub fn is_output(&self) -> bool {
        self.data.kind == ParameterType::Output
    }

    pub fn is_automable(&self) -> bool {
        self.is_input() && self.data.hints.contains(ParameterHints::AUTOMABLE)
    }
}
