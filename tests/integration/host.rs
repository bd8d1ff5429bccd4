//! Host lifecycle integration tests
//!
//! Builder options, slot bookkeeping and the host callback channel.

use crate::helpers::*;
use consort::prelude::*;
use consort::osc::Protocol;
use consort::{last_error, CallbackAction, DummyDriver};
use std::time::Duration;

#[test]
fn test_builder_applies_engine_config() {
    let host = test_host_with(
        ConsortHost::builder()
            .client_name("Studio")
            .process_mode(ProcessMode::MultipleClients)
            .max_plugins(3),
    );
    let engine = host.engine();
    assert_eq!(engine.client_name(), "Studio");
    assert_eq!(engine.process_mode(), ProcessMode::MultipleClients);
    assert_eq!(engine.max_plugins(), 3);
    assert_eq!(engine.sample_rate(), TEST_SAMPLE_RATE);
    assert_eq!(engine.buffer_size(), TEST_BUFFER_SIZE);
    assert!(!engine.is_running());
    assert!(!engine.is_polling());
}

#[test]
fn test_builder_rejects_invalid_config() {
    let result = ConsortHost::builder().buffer_size(0).manual().build();
    assert!(matches!(result, Err(Error::Core(_))));

    let result = ConsortHost::builder().client_name("a/b").manual().build();
    assert!(matches!(result, Err(Error::Core(_))));
}

#[cfg(feature = "bridge")]
#[test]
fn test_builder_rejects_invalid_bridge_config() {
    let result = ConsortHost::builder()
        .bridge(BridgeConfig {
            handshake_step_ms: 0,
            ..BridgeConfig::default()
        })
        .manual()
        .build();
    assert!(matches!(result, Err(Error::Bridge(_))));
}

#[test]
fn test_control_urls() {
    let host = test_host_with(ConsortHost::builder().tcp_port(0));
    let udp = host.url();
    assert_eq!(udp.protocol, Protocol::Udp);
    assert_ne!(udp.port, 0);

    let tcp = host.tcp_url().expect("TCP listener requested");
    assert_eq!(tcp.protocol, Protocol::Tcp);
    assert_ne!(tcp.port, 0);

    assert!(test_host().tcp_url().is_none());
}

#[test]
fn test_default_build_polls_and_dummy_driver_runs() {
    let host = ConsortHost::builder().build().unwrap();
    assert!(host.engine().is_polling());
    assert!(!host.engine().is_running());

    let host = ConsortHost::builder()
        .driver(Box::new(DummyDriver::new(TEST_SAMPLE_RATE, 128)))
        .build()
        .unwrap();
    assert!(host.engine().is_running());
    assert!(host.engine().is_polling());
    // The driver's block size wins over the configured one.
    assert_eq!(host.engine().buffer_size(), 128);

    host.transport().set_playing(true);
    assert!(wait_for(|| host.transport().load().frame > 0));
}

#[test]
fn test_remove_then_lookup_fails() {
    let host = test_host();
    let id = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    assert!(host.engine().has_plugin(id));

    host.remove_plugin(id).unwrap();
    assert!(!host.engine().has_plugin(id));
    assert!(matches!(
        host.with_plugin(id, |_| ()),
        Err(Error::Core(consort::core::Error::PluginNotFound(_)))
    ));
    assert!(host.remove_plugin(id).is_err());
}

#[test]
fn test_rack_removal_shifts_ids_down() {
    let host = test_host();
    for label in ["gain", "sine", "dc", "passthrough"] {
        host.add_plugin(LoadRequest::internal(label)).unwrap();
    }
    host.remove_plugin(1).unwrap();

    assert_eq!(host.plugin_ids(), vec![0, 1, 2]);
    let labels: Vec<String> = host
        .plugin_ids()
        .into_iter()
        .map(|id| host.with_plugin(id, |s| s.label().to_string()).unwrap())
        .collect();
    assert_eq!(labels, ["gain", "dc", "passthrough"]);
    for id in host.plugin_ids() {
        assert_eq!(host.with_plugin(id, |s| s.id()).unwrap(), id);
    }
}

#[test]
fn test_other_modes_keep_ids() {
    let host = test_host_with(ConsortHost::builder().process_mode(ProcessMode::SingleClient));
    for label in ["gain", "sine", "dc"] {
        host.add_plugin(LoadRequest::internal(label)).unwrap();
    }
    host.remove_plugin(1).unwrap();
    assert_eq!(host.plugin_ids(), vec![0, 2]);

    // The freed id is reused by the next add.
    assert_eq!(host.add_plugin(LoadRequest::internal("gain")).unwrap(), 1);
}

#[test]
fn test_failed_add_leaves_no_slot() {
    let host = test_host_with(ConsortHost::builder().max_plugins(1));
    assert!(host.add_plugin(LoadRequest::internal("no-such-plugin")).is_err());
    assert!(host.plugin_ids().is_empty());
    assert!(last_error().contains("no-such-plugin"));

    host.add_plugin(LoadRequest::internal("gain")).unwrap();
    assert!(host.add_plugin(LoadRequest::internal("gain")).is_err());
    assert!(last_error().contains("Maximum number of plugins"));
    assert_eq!(host.plugin_ids(), vec![0]);
}

#[test]
fn test_duplicate_names_get_suffixes() {
    let host = test_host();
    let ids: Vec<PluginId> = (0..3)
        .map(|_| host.add_plugin(LoadRequest::internal("gain")).unwrap())
        .collect();
    let names: Vec<String> = ids
        .iter()
        .map(|&id| host.with_plugin(id, |s| s.name().to_string()).unwrap())
        .collect();
    assert_eq!(names, ["Gain", "Gain (2)", "Gain (3)"]);

    let named = host
        .add_plugin(LoadRequest::internal("gain").with_name("Bus: A"))
        .unwrap();
    assert_eq!(host.with_plugin(named, |s| s.name().to_string()).unwrap(), "Bus. A");
}

#[test]
fn test_host_callback_reports_lifecycle() {
    let host = test_host();
    let events = host.engine().host_callback().receiver();

    let id = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    host.remove_plugin(id).unwrap();

    let lifecycle: Vec<(CallbackAction, PluginId)> = events
        .try_iter()
        .filter(|e| {
            matches!(
                e.action,
                CallbackAction::PluginAdded | CallbackAction::PluginRemoved
            )
        })
        .map(|e| (e.action, e.plugin_id))
        .collect();
    assert_eq!(
        lifecycle,
        [
            (CallbackAction::PluginAdded, id),
            (CallbackAction::PluginRemoved, id)
        ]
    );
}

#[test]
fn test_driver_shutdown_disables_everything() {
    let host = test_host();
    let events = host.engine().host_callback().receiver();
    let id = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    events.try_iter().for_each(drop);

    host.engine().handle_driver_shutdown();
    assert!(!host.with_plugin(id, |s| s.is_enabled()).unwrap());
    let quit = events.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(quit.action, CallbackAction::Quit);
    assert!(last_error().contains("shut down"));
}

#[test]
fn test_close_is_idempotent() {
    let mut host = test_host();
    host.add_plugin(LoadRequest::internal("sine")).unwrap();
    host.close();
    assert!(host.plugin_ids().is_empty());
    assert!(!host.channel().is_running());
    assert!(host.add_plugin(LoadRequest::internal("sine")).is_err());
    host.close();
}
