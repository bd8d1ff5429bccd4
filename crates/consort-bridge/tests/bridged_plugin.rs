//! End-to-end tests against the real `consort-bridge` binary.

use consort_bridge::{BridgeConfig, BridgeLoader};
use consort_core::{Engine, EngineConfig, LoadRequest, PluginHints, PluginType};
use consort_osc::{ControlChannel, OscConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Host {
    engine: Arc<Engine>,
    loader: Arc<BridgeLoader>,
    _channel: ControlChannel,
}

impl Drop for Host {
    fn drop(&mut self) {
        self.engine.close();
    }
}

fn host(config: BridgeConfig) -> Host {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let channel = ControlChannel::start(&engine, &OscConfig::default()).unwrap();
    let loader = Arc::new(BridgeLoader::new(config));
    loader.set_channel(Some(channel.handle()));
    channel.set_bridge_router(Some(loader.clone()));
    engine.set_loader(loader.clone());
    Host {
        engine,
        loader,
        _channel: channel,
    }
}

fn bridge_config() -> BridgeConfig {
    BridgeConfig {
        save_timeout_ms: 3000,
        close_grace_ms: 2000,
        ..BridgeConfig::default().with_executable(env!("CARGO_BIN_EXE_consort-bridge"))
    }
}

fn bridged(label: &str) -> LoadRequest {
    LoadRequest::new(PluginType::Bridge, "", label)
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_bridged_sine_mirrors_the_child() {
    let host = host(bridge_config());
    let id = host.engine.add_plugin(bridged("sine")).unwrap();

    let (is_bridge, is_synth, params, programs, name) = host
        .engine
        .with_plugin(id, |s| {
            (
                s.is_bridge(),
                s.hints().contains(PluginHints::IS_SYNTH),
                s.parameter_count(),
                s.programs().count(),
                s.name().to_string(),
            )
        })
        .unwrap();
    assert!(is_bridge && is_synth);
    assert_eq!((params, programs), (2, 3));
    assert_eq!(name, "Sine");
    // The child selected its first program while loading.
    let frequency = host.engine.with_plugin(id, |s| s.parameter_value(0)).unwrap();
    assert_eq!(frequency, 110.0);

    // The program change runs in the child; its new values come back.
    host.engine
        .with_plugin(id, |s| s.set_program(2, false, false, false))
        .unwrap()
        .unwrap();
    assert!(wait_for(|| host
        .engine
        .with_plugin(id, |s| s.parameter_value(0))
        .unwrap()
        == 1760.0));

    // Peaks are measured in the child.
    assert!(wait_for(|| host
        .engine
        .with_plugin(id, |s| s.reported_peaks().unwrap()[2] > 0.0)
        .unwrap()));

    host.engine
        .with_plugin(id, |s| s.set_custom_data("string", "preset", "bright"))
        .unwrap()
        .unwrap();
    let saved = host.engine.save_plugin_state(id).unwrap();
    assert!(saved
        .custom_data
        .iter()
        .any(|d| d.key == "preset" && d.value == "bright"));

    host.engine.remove_plugin(id).unwrap();
    assert!(host.loader.routes().is_empty());
}

#[test]
fn test_rack_removal_renumbers_bridges() {
    let host = host(bridge_config());
    let first = host.engine.add_plugin(bridged("gain")).unwrap();
    let second = host.engine.add_plugin(bridged("sine")).unwrap();
    assert_eq!((first, second), (0, 1));

    host.engine.remove_plugin(first).unwrap();
    assert_eq!(host.engine.plugin_ids(), vec![0]);
    assert_eq!(host.loader.routes().len(), 1);

    // Saving waits for the child's acknowledgement, which only arrives if
    // the child now reports to plugin 0.
    let started = Instant::now();
    let saved = host.engine.save_plugin_state(0).unwrap();
    assert!(started.elapsed() < Duration::from_millis(3000));
    assert_eq!(saved.current_program, 0);
}

#[test]
fn test_missing_binary_leaves_no_slot() {
    let host = host(BridgeConfig::default().with_executable("/nonexistent/consort-bridge"));
    assert!(host.engine.add_plugin(bridged("sine")).is_err());
    assert!(host.engine.plugin_ids().is_empty());
    assert!(host.loader.routes().is_empty());
    assert!(consort_core::last_error().contains("consort-bridge"));
}

#[test]
fn test_child_load_failure_is_reported() {
    let host = host(bridge_config());
    let err = host.engine.add_plugin(bridged("no-such-plugin")).unwrap_err();
    assert!(err.to_string().contains("no-such-plugin"), "{}", err);
    assert!(host.engine.plugin_ids().is_empty());
}
