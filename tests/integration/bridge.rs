//! Bridge failures seen from the host
//!
//! The real `consort-bridge` round trips are tested in the bridge crate;
//! here only children that never answer or never start.

#![cfg(feature = "bridge")]

use crate::helpers::*;
use consort::prelude::*;
use consort::{last_error, BinaryType};
use std::time::{Duration, Instant};

fn bridged(label: &str) -> LoadRequest {
    LoadRequest::new(PluginType::Bridge, "", label)
}

#[cfg(unix)]
#[test]
fn test_silent_child_times_out_without_leaking_a_slot() {
    // `yes` runs until killed and never says a word over OSC.
    let host = test_host_with(
        ConsortHost::builder().bridge(
            BridgeConfig {
                handshake_step_ms: 20,
                close_grace_ms: 100,
                ..BridgeConfig::default()
            }
            .with_executable("yes")
            .with_handshake_timeout(Duration::from_millis(300)),
        ),
    );
    host.add_plugin(LoadRequest::internal("gain")).unwrap();

    let started = Instant::now();
    let err = host.add_plugin(bridged("sine")).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(err.to_string().contains("300ms"), "{}", err);
    assert!(last_error().contains("handshake"));

    assert_eq!(host.plugin_ids(), vec![0]);
    assert!(host.bridge_loader().routes().is_empty());
    // The slot is free for the next plugin.
    assert_eq!(host.add_plugin(LoadRequest::internal("sine")).unwrap(), 1);
}

#[test]
fn test_missing_bridge_binary() {
    let host = test_host_with(
        ConsortHost::builder().bridge_executable("/nonexistent/consort-bridge"),
    );
    assert!(host.add_plugin(bridged("sine")).is_err());
    assert!(last_error().contains("/nonexistent/consort-bridge"));
    assert!(host.plugin_ids().is_empty());
}

#[test]
fn test_foreign_binaries_are_bridged() {
    let host = test_host_with(
        ConsortHost::builder().bridge_executable("/nonexistent/consort-bridge"),
    );
    // A 32-bit Windows binary can only run in a bridge; with no bridge
    // binary available the add fails instead of loading in process.
    let request = LoadRequest::internal("gain").with_binary_type(BinaryType::Win32);
    assert!(host.add_plugin(request).is_err());

    // Internal plugins stay in process even when bridges are preferred.
    let host = test_host_with(
        ConsortHost::builder()
            .prefer_bridges(true)
            .bridge_executable("/nonexistent/consort-bridge"),
    );
    let id = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    assert!(!host.with_plugin(id, |s| s.is_bridge()).unwrap());
}
