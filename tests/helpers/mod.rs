//! Test helpers and fixtures for Consort integration tests
//!
//! Hosts built here never open an audio device: blocks are processed on
//! the test thread through [`process_block`], so every test controls its
//! own cycle.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (passthrough, unity gain)
//! - `DSP_EPSILON` (1e-4): DSP processing (gain stages, oscillators)
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)

#![allow(dead_code)]

pub mod tolerances;

use consort::prelude::*;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

/// Default test sample rate (matches common hardware)
pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// Small blocks keep tests fast and deterministic.
pub const TEST_BUFFER_SIZE: usize = 64;

/// A rack-mode host with no driver and no poll thread.
pub fn test_host() -> ConsortHost {
    test_host_with(ConsortHost::builder())
}

/// Apply the test sample rate and buffer size to `builder` and build it
/// without a driver.
pub fn test_host_with(builder: ConsortHostBuilder) -> ConsortHost {
    builder
        .sample_rate(TEST_SAMPLE_RATE)
        .buffer_size(TEST_BUFFER_SIZE)
        .manual()
        .build()
        .expect("Failed to create test host")
}

/// Run one rack block with the given channel inputs and return both
/// output channels.
pub fn process_block(host: &ConsortHost, left: &[f32], right: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let frames = left.len().min(right.len());
    let mut out_left = vec![0.0f32; frames];
    let mut out_right = vec![0.0f32; frames];
    host.process(&[left, right], &mut [&mut out_left, &mut out_right], frames);
    (out_left, out_right)
}

/// Generate a test signal: sine wave at given frequency for specified samples.
pub fn generate_sine(frequency: f64, sample_rate: f64, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate;
            (2.0 * std::f64::consts::PI * frequency * t).sin() as f32
        })
        .collect()
}

/// Generate silence (zero samples).
pub fn generate_silence(num_samples: usize) -> Vec<f32> {
    vec![0.0; num_samples]
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

/// Assert that a signal is approximately silent (all values near zero).
pub fn assert_silence(samples: &[f32], tolerance: f32) {
    let max = peak(samples);
    assert!(
        max <= tolerance,
        "Expected silence, but peak amplitude was {}",
        max
    );
}

/// Check if two signals are approximately equal within tolerance.
pub fn signals_approx_equal(a: &[f32], b: &[f32], tolerance: f32) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tolerance)
}

/// Poll `condition` for up to five seconds.
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

/// A control UI stand-in: a UDP socket that registers with the host and
/// collects what the host publishes.
pub struct FakeUi {
    socket: UdpSocket,
}

impl FakeUi {
    pub fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind UI socket");
        socket
            .set_read_timeout(Some(Duration::from_millis(200)))
            .expect("Failed to set read timeout");
        Self { socket }
    }

    pub fn url(&self) -> String {
        let port = self.socket.local_addr().expect("UI socket address").port();
        format!("osc.udp://127.0.0.1:{}/ui", port)
    }

    /// Send `message` to the host's UDP listener.
    pub fn send(&self, host: &ConsortHost, message: &consort::OscMessage) {
        let url = host.url();
        self.socket
            .send_to(&message.encode(), (url.host.as_str(), url.port))
            .expect("Failed to send OSC message");
    }

    pub fn register(&self, host: &ConsortHost) {
        self.send(host, &consort::OscMessage::new("/register").arg(self.url()));
    }

    /// Receive until a message with `path` arrives or nothing arrives for a
    /// while.
    pub fn wait_for_path(&self, path: &str) -> Option<consort::OscMessage> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut buffer = vec![0u8; 65536];
        while Instant::now() < deadline {
            let Ok((len, _)) = self.socket.recv_from(&mut buffer) else {
                continue;
            };
            let Ok(messages) = consort::osc::decode_packet(&buffer[..len]) else {
                continue;
            };
            if let Some(found) = messages.into_iter().find(|m| m.path == path) {
                return Some(found);
            }
        }
        None
    }
}
