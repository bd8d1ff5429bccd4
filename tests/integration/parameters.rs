//! Parameter pipeline integration tests
//!
//! Clamping, programs, MIDI-learned controllers and postponed events.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use approx::assert_relative_eq;
use consort::core::{MidiData, MidiEvent, PostponedEventType};
use consort::prelude::*;
use consort::CallbackAction;
use proptest::prelude::*;
use proptest::test_runner::TestRunner;

fn run_block_with_midi(host: &ConsortHost, midi: &[MidiEvent]) {
    let silence = generate_silence(TEST_BUFFER_SIZE);
    let mut left = generate_silence(TEST_BUFFER_SIZE);
    let mut right = generate_silence(TEST_BUFFER_SIZE);
    host.engine()
        .process(&[&silence, &silence], &mut [&mut left, &mut right], midi, TEST_BUFFER_SIZE);
}

#[test]
fn test_parameter_clamp_is_idempotent() {
    let host = test_host();
    let id = host.add_plugin(LoadRequest::internal("sine")).unwrap();

    let mut runner = TestRunner::default();
    runner
        .run(&(0usize..2, -1.0e6f64..1.0e6), |(index, value)| {
            let (min, max, once, twice) = host
                .with_plugin(id, |s| {
                    let ranges = *s.parameter_ranges(index).unwrap();
                    s.set_parameter_value(index, value, false, false, false);
                    let once = s.parameter_value(index);
                    s.set_parameter_value(index, once, false, false, false);
                    (ranges.min, ranges.max, once, s.parameter_value(index))
                })
                .unwrap();
            prop_assert!(once >= min && once <= max, "{} outside [{}, {}]", once, min, max);
            prop_assert_eq!(once, twice);
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_unknown_parameter_index_is_ignored() {
    let host = test_host();
    let id = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    host.with_plugin(id, |s| {
        s.set_parameter_value(99, 0.5, true, true, true);
        assert_eq!(s.parameter_value(99), 0.0);
        assert_relative_eq!(s.parameter_value(0), 1.0, epsilon = PARAM_EPSILON);
    })
    .unwrap();
}

#[test]
fn test_set_program_refreshes_defaults() {
    let host = test_host();
    let id = host.add_plugin(LoadRequest::internal("sine")).unwrap();

    host.with_plugin(id, |s| {
        // Loading selects the first program.
        assert_eq!(s.current_program(), 0);
        assert_eq!(s.programs().count(), 3);

        s.set_program(2, false, false, false).unwrap();
        assert_eq!(s.current_program(), 2);
        assert_relative_eq!(s.parameter_value(0), 1760.0, epsilon = PARAM_EPSILON);

        s.set_parameter_value(0, 300.0, false, false, false);
        s.set_program(0, false, false, false).unwrap();
        assert_eq!(s.current_program(), 0);
        for k in 0..s.parameter_count() {
            let def = s.parameter_ranges(k).unwrap().def;
            assert_relative_eq!(def, s.parameter_value(k), epsilon = PARAM_EPSILON);
        }
        assert_relative_eq!(s.parameter_value(0), 110.0, epsilon = PARAM_EPSILON);

        assert!(s.set_program(3, false, false, false).is_err());
        assert_eq!(s.current_program(), 0);
        // -1 deselects without touching the plugin.
        s.set_program(-1, false, false, false).unwrap();
        assert_eq!(s.current_program(), -1);
        assert_relative_eq!(s.parameter_value(0), 110.0, epsilon = PARAM_EPSILON);
    })
    .unwrap();
}

#[test]
fn test_midi_cc_drives_bound_parameter() {
    let host = test_host();
    let id = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    let events = host.engine().host_callback().receiver();
    host.with_plugin(id, |s| s.set_parameter_midi_cc(0, 1, false, false))
        .unwrap()
        .unwrap();

    run_block_with_midi(&host, &[MidiEvent::new(0, MidiData::control_change(0, 1, 127))]);
    let value = host.with_plugin(id, |s| s.parameter_value(0)).unwrap();
    assert_relative_eq!(value, 2.0, epsilon = PARAM_EPSILON);

    // The audio thread only queued the change; polling publishes it.
    events.try_iter().for_each(drop);
    host.engine().poll_once();
    let changed = events
        .try_iter()
        .find(|e| e.action == CallbackAction::ParameterValueChanged && e.value1 == 0)
        .expect("parameter change published");
    assert_relative_eq!(changed.value3, 2.0, epsilon = PARAM_EPSILON);

    // A controller nobody is bound to changes nothing.
    run_block_with_midi(&host, &[MidiEvent::new(0, MidiData::control_change(0, 20, 0))]);
    let value = host.with_plugin(id, |s| s.parameter_value(0)).unwrap();
    assert_relative_eq!(value, 2.0, epsilon = PARAM_EPSILON);
}

#[test]
fn test_midi_program_change_selects_program() {
    let host = test_host();
    let id = host.add_plugin(LoadRequest::internal("sine")).unwrap();

    let program_change = MidiData::new(&[0xC0, 2]);
    run_block_with_midi(&host, &[MidiEvent::new(0, program_change)]);

    host.with_plugin(id, |s| {
        assert_eq!(s.current_midi_program(), 2);
        assert_relative_eq!(s.parameter_value(0), 1760.0, epsilon = PARAM_EPSILON);
    })
    .unwrap();
}

#[test]
fn test_postponed_overflow_keeps_earliest_events() {
    let host = test_host_with(ConsortHost::builder().config(EngineConfig {
        postponed_capacity: 4,
        ..EngineConfig::default()
    }));
    let id = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    let events = host.engine().host_callback().receiver();
    events.try_iter().for_each(drop);

    host.with_plugin(id, |s| {
        let queue = s.postponed().clone();
        let accepted = (0..10)
            .filter(|&i| queue.postpone(PostponedEventType::Debug, i, 0, 0.0))
            .count();
        assert_eq!(accepted, 4);
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.dropped(), 6);

        s.post_events_run();
        assert!(queue.is_empty());
        s.post_events_run();
        assert!(queue.is_empty());
    })
    .unwrap();

    let delivered: Vec<i32> = events
        .try_iter()
        .filter(|e| e.action == CallbackAction::Debug)
        .map(|e| e.value1)
        .collect();
    assert_eq!(delivered, [0, 1, 2, 3]);
}
