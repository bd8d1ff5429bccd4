//! Tolerance constants for audio testing.
//!
//! Different operations require different precision levels.

/// Floating point rounding errors (passthrough, unity gain, DC offsets).
pub const FLOAT_EPSILON: f32 = 1e-6;

/// DSP processing tolerance (gain stages, oscillators).
pub const DSP_EPSILON: f32 = 1e-4;

/// Silence threshold (~-80dB).
/// Values below this are considered silent.
pub const SILENCE_THRESHOLD: f32 = 0.0001;

/// Parameter values travel as f64 end to end.
pub const PARAM_EPSILON: f64 = 1e-9;
