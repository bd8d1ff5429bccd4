//! OSC control channel integration tests
//!
//! A UDP socket stands in for the control UI; commands go through the real
//! listener and command worker.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use approx::assert_relative_eq;
use consort::osc::{OscArg, OscError};
use consort::prelude::*;
use consort::OscMessage;
use std::io::Write;
use std::net::TcpStream;

fn volume(host: &ConsortHost, id: PluginId) -> f64 {
    host.with_plugin(id, |s| s.volume()).unwrap()
}

#[test]
fn test_unknown_method_is_a_no_op() {
    let host = test_host();
    let id = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    let before = host.save_plugin_state(id).unwrap();

    let unknown = OscMessage::new("/Consort/00/set_everything").arg(1.0f64);
    assert!(matches!(
        host.channel().dispatcher().dispatch(&unknown),
        Err(OscError::UnknownMethod(_))
    ));
    let wrong_types = OscMessage::new("/Consort/00/set_volume").arg(1i32);
    assert!(matches!(
        host.channel().dispatcher().dispatch(&wrong_types),
        Err(OscError::ArgumentMismatch { .. })
    ));
    let other_client = OscMessage::new("/Other/00/set_volume").arg(0.5f64);
    assert!(host.channel().dispatcher().dispatch(&other_client).is_err());
    assert_eq!(host.save_plugin_state(id).unwrap(), before);

    // Over the wire: the bad message is dropped and the channel keeps serving.
    let ui = FakeUi::bind();
    ui.send(&host, &unknown);
    ui.send(&host, &OscMessage::new("/Consort/00/set_volume").arg(0.5f64));
    assert!(wait_for(|| (volume(&host, id) - 0.5).abs() < PARAM_EPSILON));
    let after = host.save_plugin_state(id).unwrap();
    assert_eq!(after.parameters, before.parameters);
}

#[test]
fn test_commands_for_missing_plugins_are_dropped() {
    let host = test_host();
    let message = OscMessage::new("/Consort/05/set_volume").arg(0.5f64);
    assert!(host.channel().dispatcher().dispatch(&message).is_err());
}

#[test]
fn test_registered_ui_receives_state() {
    let host = test_host();
    let id = host.add_plugin(LoadRequest::internal("gain")).unwrap();

    let ui = FakeUi::bind();
    ui.register(&host);
    let added = ui.wait_for_path("/ui/add_plugin").expect("dump after /register");
    assert_eq!(added.args[0], OscArg::Int(id as i32));
    assert_eq!(added.args[1], OscArg::Str("Gain".to_string()));

    host.with_plugin(id, |s| s.set_parameter_value(0, 0.5, false, true, false))
        .unwrap();
    let changed = ui
        .wait_for_path("/ui/set_parameter_value")
        .expect("parameter change published");
    assert_eq!(changed.int(0).unwrap(), id as i32);

    host.add_plugin(LoadRequest::internal("sine")).unwrap();
    let added = ui.wait_for_path("/ui/add_plugin").expect("new plugin published");
    assert_eq!(added.str(1).unwrap(), "Sine");

    ui.send(&host, &OscMessage::new("/unregister"));
    assert!(wait_for(|| !host.channel().client().is_registered()));
}

#[test]
fn test_ui_commands_reach_plugins() {
    let host = test_host();
    let id = host.add_plugin(LoadRequest::internal("sine")).unwrap();
    let ui = FakeUi::bind();

    ui.send(&host, &OscMessage::new("/Consort/00/set_program").arg(2i32));
    assert!(wait_for(|| host.with_plugin(id, |s| s.current_program()).unwrap() == 2));
    assert_relative_eq!(
        host.with_plugin(id, |s| s.parameter_value(0)).unwrap(),
        1760.0,
        epsilon = PARAM_EPSILON
    );

    ui.send(
        &host,
        &OscMessage::new("/Consort/00/set_parameter_value")
            .arg(1i32)
            .arg(7.5f64),
    );
    // Out-of-range values are clamped, not rejected.
    assert!(wait_for(|| host.with_plugin(id, |s| s.parameter_value(1)).unwrap() == 1.0));

    ui.send(&host, &OscMessage::new("/Consort/00/set_active").arg(0i32));
    assert!(wait_for(|| !host.with_plugin(id, |s| s.is_active()).unwrap()));
}

#[test]
fn test_tcp_commands_use_length_prefix() {
    let host = test_host_with(ConsortHost::builder().tcp_port(0));
    let id = host.add_plugin(LoadRequest::internal("gain")).unwrap();
    let url = host.tcp_url().unwrap();

    let mut stream = TcpStream::connect((url.host.as_str(), url.port)).unwrap();
    let packet = OscMessage::new("/Consort/00/set_volume").arg(0.25f64).encode();
    stream
        .write_all(&(packet.len() as u32).to_be_bytes())
        .unwrap();
    stream.write_all(&packet).unwrap();
    stream.flush().unwrap();

    assert!(wait_for(|| (volume(&host, id) - 0.25).abs() < PARAM_EPSILON));
}
