//! Saved-state integration tests
//!
//! A saved state must survive a trip through JSON and restore the plugin
//! it came from.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use approx::assert_relative_eq;
use consort::core::custom_data::CUSTOM_DATA_STRING;
use consort::prelude::*;
use consort::SavedState;

#[test]
fn test_saved_state_round_trips_through_json() {
    let host = test_host();
    let id = host.add_plugin(LoadRequest::internal("sine")).unwrap();
    host.with_plugin(id, |s| {
        s.set_program(1, false, false, false).unwrap();
        s.set_parameter_value(1, 0.25, false, false, false);
        s.set_parameter_midi_cc(1, 74, false, false).unwrap();
        s.set_volume(0.8, false, false);
        s.set_custom_data(CUSTOM_DATA_STRING, "preset", "warm").unwrap();
    })
    .unwrap();

    let saved = host.save_plugin_state(id).unwrap();
    assert_eq!(saved.current_program, 1);
    assert_eq!(saved.current_program_name.as_deref(), Some("Middle"));
    assert_eq!(saved.parameters.len(), 2);
    assert!(saved.chunk.is_none());

    let json = serde_json::to_string(&saved).unwrap();
    let parsed: SavedState = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, saved);

    // Restore into a fresh instance on another host.
    let other = test_host();
    let restored = other.add_plugin(LoadRequest::internal("sine")).unwrap();
    other.load_plugin_state(restored, &parsed).unwrap();
    other
        .with_plugin(restored, |s| {
            assert_eq!(s.current_program(), 1);
            assert_relative_eq!(s.parameter_value(0), 440.0, epsilon = PARAM_EPSILON);
            assert_relative_eq!(s.parameter_value(1), 0.25, epsilon = PARAM_EPSILON);
            assert_eq!(s.parameter_data(1).unwrap().midi_cc, 74);
            assert_relative_eq!(s.volume(), 0.8, epsilon = PARAM_EPSILON);
            assert_eq!(s.custom_data().get("preset").unwrap().value, "warm");
        })
        .unwrap();
}

#[test]
fn test_chunk_state_restores_plugin() {
    let host = test_host();
    let id = host.add_plugin(LoadRequest::internal("midi-transpose")).unwrap();
    host.with_plugin(id, |s| {
        s.set_parameter_value(0, 7.0, false, false, false);
        s.set_custom_data(CUSTOM_DATA_STRING, "description", "up a fifth")
            .unwrap();
    })
    .unwrap();

    let saved = host.save_plugin_state(id).unwrap();
    assert_eq!(saved.chunk.as_deref(), Some(b"7".as_slice()));

    let restored = host.add_plugin(LoadRequest::internal("midi-transpose")).unwrap();
    let mut without_parameters = saved.clone();
    without_parameters.parameters.clear();
    host.load_plugin_state(restored, &without_parameters).unwrap();
    let semitones = host.with_plugin(restored, |s| s.parameter_value(0)).unwrap();
    assert_relative_eq!(semitones, 7.0, epsilon = PARAM_EPSILON);
}

#[test]
fn test_partial_json_uses_defaults() {
    let saved: SavedState = serde_json::from_str(r#"{"volume":0.5}"#).unwrap();
    assert!(saved.active);
    assert_relative_eq!(saved.dry_wet, 1.0, epsilon = PARAM_EPSILON);
    assert_relative_eq!(saved.volume, 0.5, epsilon = PARAM_EPSILON);
    assert_eq!(saved.current_program, -1);

    let host = test_host();
    let id = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    host.load_plugin_state(id, &saved).unwrap();
    let input = vec![0.5f32; TEST_BUFFER_SIZE];
    let (out_left, _) = process_block(&host, &input, &input);
    assert!(signals_approx_equal(&out_left, &vec![0.25; TEST_BUFFER_SIZE], DSP_EPSILON));
}

#[test]
fn test_stale_entries_are_skipped() {
    let host = test_host();
    let gain = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    let mut saved = host.save_plugin_state(gain).unwrap();
    saved.parameters[0].name = "Renamed".to_string();
    saved.parameters[0].rindex = 42;
    saved.parameters[0].value = 0.1;
    saved.current_program = 5;
    saved.current_program_name = Some("Gone".to_string());

    host.load_plugin_state(gain, &saved).unwrap();
    let value = host.with_plugin(gain, |s| s.parameter_value(0)).unwrap();
    assert_relative_eq!(value, 1.0, epsilon = PARAM_EPSILON);
}
