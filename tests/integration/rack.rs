//! Rack-mode signal flow
//!
//! The rack is one linear stereo chain: each slot reads what the previous
//! slot wrote, and generators mix onto the carried signal.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use consort::prelude::*;

#[test]
fn test_empty_rack_passes_audio_through() {
    let host = test_host();
    let left = generate_sine(440.0, TEST_SAMPLE_RATE, TEST_BUFFER_SIZE);
    let right = generate_sine(880.0, TEST_SAMPLE_RATE, TEST_BUFFER_SIZE);

    let (out_left, out_right) = process_block(&host, &left, &right);
    assert!(signals_approx_equal(&out_left, &left, FLOAT_EPSILON));
    assert!(signals_approx_equal(&out_right, &right, FLOAT_EPSILON));
}

#[test]
fn test_generator_mixes_onto_passthrough() {
    let host = test_host();
    host.add_plugin(LoadRequest::internal("passthrough-mono")).unwrap();
    let dc = host.add_plugin(LoadRequest::internal("dc")).unwrap();
    let level = host.with_plugin(dc, |s| s.parameter_value(0)).unwrap() as f32;

    let input = generate_sine(440.0, TEST_SAMPLE_RATE, TEST_BUFFER_SIZE);
    let (out_left, _) = process_block(&host, &input, &generate_silence(TEST_BUFFER_SIZE));

    let expected: Vec<f32> = input.iter().map(|s| s + level).collect();
    assert!(
        signals_approx_equal(&out_left, &expected, FLOAT_EPSILON),
        "generator output must add to the carried signal"
    );
}

#[test]
fn test_single_stereo_plugin_keeps_silence() {
    let host = test_host();
    let id = host.add_plugin(LoadRequest::internal("passthrough")).unwrap();
    assert_eq!(host.with_plugin(id, |s| (s.audio_in_count(), s.audio_out_count())).unwrap(), (2, 2));

    let silence = generate_silence(TEST_BUFFER_SIZE);
    let (out_left, out_right) = process_block(&host, &silence, &silence);
    assert_silence(&out_left, SILENCE_THRESHOLD);
    assert_silence(&out_right, SILENCE_THRESHOLD);
}

#[test]
fn test_chain_applies_gain_in_order() {
    let host = test_host();
    let sine = host.add_plugin(LoadRequest::internal("sine")).unwrap();
    let gain = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    host.with_plugin(gain, |s| s.set_parameter_value(0, 0.5, false, false, false))
        .unwrap();

    let silence = generate_silence(TEST_BUFFER_SIZE);
    let (out_left, _) = process_block(&host, &silence, &silence);

    let sine_level = host.with_plugin(sine, |s| s.parameter_value(1)).unwrap() as f32;
    let expected_peak = peak(&out_left);
    assert!(expected_peak > 0.0);
    assert!(expected_peak <= sine_level * 0.5 + DSP_EPSILON);

    // The gain's output parameter follows what it produced.
    let measured = host.with_plugin(gain, |s| s.parameter_value(1)).unwrap() as f32;
    assert!((measured - expected_peak).abs() < DSP_EPSILON);
}

#[test]
fn test_inactive_plugin_is_bypassed() {
    let host = test_host();
    let gain = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    host.with_plugin(gain, |s| {
        s.set_parameter_value(0, 0.0, false, false, false);
        s.set_active(false, false, false);
    })
    .unwrap();

    let input = generate_sine(440.0, TEST_SAMPLE_RATE, TEST_BUFFER_SIZE);
    let (out_left, out_right) = process_block(&host, &input, &input);
    assert!(signals_approx_equal(&out_left, &input, FLOAT_EPSILON));
    assert!(signals_approx_equal(&out_right, &input, FLOAT_EPSILON));
}

#[test]
fn test_volume_and_dry_wet_post_processing() {
    let host = test_host();
    let gain = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    host.with_plugin(gain, |s| {
        s.set_parameter_value(0, 0.0, false, false, false);
        s.set_dry_wet(0.5, false, false);
        s.set_volume(0.5, false, false);
    })
    .unwrap();

    let input = vec![0.8f32; TEST_BUFFER_SIZE];
    let (out_left, out_right) = process_block(&host, &input, &input);
    // Half wet silence, half dry input, then halved again.
    let expected = vec![0.2f32; TEST_BUFFER_SIZE];
    assert!(signals_approx_equal(&out_left, &expected, DSP_EPSILON));
    assert!(signals_approx_equal(&out_right, &expected, DSP_EPSILON));
}

#[test]
fn test_peaks_follow_the_last_block() {
    let host = test_host();
    let gain = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    host.with_plugin(gain, |s| s.set_parameter_value(0, 2.0, false, false, false))
        .unwrap();

    let input = vec![0.25f32; TEST_BUFFER_SIZE];
    process_block(&host, &input, &input);
    assert!((host.engine().input_peak(gain, 0) - 0.25).abs() < FLOAT_EPSILON);
    assert!((host.engine().output_peak(gain, 1) - 0.5).abs() < FLOAT_EPSILON);

    let silence = generate_silence(TEST_BUFFER_SIZE);
    process_block(&host, &silence, &silence);
    assert_eq!(host.engine().output_peak(gain, 0), 0.0);
}

#[test]
fn test_block_waits_for_a_busy_plugin() {
    let host = test_host();
    let gain = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    host.with_plugin(gain, |s| s.set_parameter_value(0, 2.0, false, false, false))
        .unwrap();

    let (entered_tx, entered_rx) = std::sync::mpsc::channel();
    let engine = host.engine().clone();
    let holder = std::thread::spawn(move || {
        engine
            .with_plugin(gain, |_| {
                entered_tx.send(()).unwrap();
                std::thread::sleep(std::time::Duration::from_millis(100));
            })
            .unwrap();
    });
    entered_rx.recv().unwrap();

    // The plugin is still processed: doubled, not passed through.
    let input = vec![0.25f32; TEST_BUFFER_SIZE];
    let (out_left, out_right) = process_block(&host, &input, &input);
    holder.join().unwrap();
    let expected = vec![0.5f32; TEST_BUFFER_SIZE];
    assert!(signals_approx_equal(&out_left, &expected, FLOAT_EPSILON));
    assert!(signals_approx_equal(&out_right, &expected, FLOAT_EPSILON));
}
