use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use synth_core::engine::{DeviceBackend, DeviceCommand};
use synth_core::DirectionSymbol;
use synth_hardware::{HardwareError, OptaBackend, OptaConfig};

/// Controlador de pruebas: responde `OK:<línea>` (o `ERROR:` para `REL_04:ON`)
/// y devuelve todo lo recibido al cerrarse la conexión.
fn fake_controller() -> (OptaConfig, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut received = Vec::new();
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else { break };
            let reply = if line == "REL_04:ON" { format!("ERROR:{line}") } else { format!("OK:{line}") };
            received.push(line);
            if writeln!(writer, "{reply}").is_err() {
                break;
            }
        }
        received
    });
    let mut config = OptaConfig::new("127.0.0.1");
    config.port = port;
    config.timeout = Duration::from_secs(2);
    (config, handle)
}

#[test]
fn line_protocol_round_trip_and_safe_disconnect() {
    let (config, server) = fake_controller();
    let mut backend = OptaBackend::new(config);
    assert!(!backend.is_connected());
    assert!(backend.connect());
    assert!(backend.is_connected());

    assert_eq!(backend.send(&DeviceCommand::ValveGoto { position: 3 }).unwrap(), "OK:VICI_01:GOTO:3");
    assert_eq!(backend.send(&DeviceCommand::PumpSpeed { rpm: 12.5,
                                                        direction: DirectionSymbol::Reverse })
                      .unwrap(),
               "OK:MFLEX_01:SPEED:12.5:-");
    assert_eq!(backend.send(&DeviceCommand::SolenoidOn).unwrap(), "ERROR:REL_04:ON");
    assert_eq!(backend.status().unwrap(), "OK:STATUS");

    assert!(backend.disconnect());
    assert!(!backend.is_connected());
    let received = server.join().unwrap();
    assert_eq!(received,
               vec!["VICI_01:GOTO:3", "MFLEX_01:SPEED:12.5:-", "REL_04:ON", "STATUS", "MFLEX_01:STOP", "REL_04:OFF"]);
}

#[test]
fn send_without_connection_is_a_transport_error() {
    let mut backend = OptaBackend::new(OptaConfig::new("127.0.0.1"));
    assert!(backend.send(&DeviceCommand::PumpStart).is_err());
    assert!(matches!(backend.status(), Err(HardwareError::NotConnected)));
}

#[test]
fn controller_hangup_surfaces_as_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        // acepta y cierra sin responder
        let (stream, _) = listener.accept().unwrap();
        drop(stream);
    });
    let mut config = OptaConfig::new("127.0.0.1");
    config.port = port;
    config.timeout = Duration::from_secs(2);
    let mut backend = OptaBackend::new(config);
    assert!(backend.connect());
    server.join().unwrap();

    match backend.status() {
        Err(HardwareError::Transport(e)) => assert!(e.to_string().starts_with("transport:"), "{e}"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(!backend.is_connected());
}

#[test]
fn refused_connection_reports_address() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let mut config = OptaConfig::new("127.0.0.1");
    config.port = port;
    config.timeout = Duration::from_millis(500);
    let mut backend = OptaBackend::new(config);
    let err = backend.try_connect().unwrap_err();
    assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
    assert!(!backend.connect());
}
