#![cfg(feature = "cli")]

use std::net::TcpListener;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use gwlink_channel::ControlMessage;
use gwlink_frame::{priority, FrameReader, FrameWriter};

/// Reserve a loopback port. Racy in principle, fine for tests.
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe");
    listener.local_addr().expect("addr").port()
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_gwlink"))
        .arg("version")
        .output()
        .expect("version command should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn version_extended_lists_build_fields() {
    let output = Command::new(env!("CARGO_BIN_EXE_gwlink"))
        .arg("version")
        .arg("--extended")
        .output()
        .expect("version command should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("target_os:"));
    assert!(stdout.contains("features: cli=true"));
}

#[test]
fn send_against_mock_gateway_succeeds() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let gateway = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .expect("read timeout");
        let mut reader = FrameReader::new(stream.try_clone().expect("clone"));
        let mut writer = FrameWriter::new(stream);

        let frame = reader.read_frame().expect("auth request");
        let request = ControlMessage::parse(&frame.payload).expect("handshake json");
        assert_eq!(request.msg_type, "auth_request");
        let response = ControlMessage::auth_response_active(None)
            .to_bytes()
            .expect("serialize");
        writer.send(priority::AUTH, &response).expect("send grant");

        let data = reader.read_frame().expect("payload frame");
        assert_eq!(data.payload.as_ref(), b"field report");
        assert_eq!(data.priority, priority::URGENT);
    });

    let output = Command::new(env!("CARGO_BIN_EXE_gwlink"))
        .args([
            "--format",
            "json",
            "--log-level",
            "error",
            "send",
            "127.0.0.1",
            "--port",
            &port.to_string(),
            "--priority",
            "urgent",
            "--data",
            "field report",
            "--timeout",
            "10s",
        ])
        .output()
        .expect("send command should run");

    gateway.join().expect("gateway thread");
    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"sent\":true"));
}

#[test]
fn send_times_out_when_no_gateway() {
    let port = free_port();
    let output = Command::new(env!("CARGO_BIN_EXE_gwlink"))
        .args([
            "--log-level",
            "error",
            "send",
            "127.0.0.1",
            "--port",
            &port.to_string(),
            "--data",
            "nobody home",
            "--timeout",
            "1s",
        ])
        .stdout(Stdio::null())
        .output()
        .expect("send command should run");

    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn listen_prints_received_frame_and_exits_at_count() {
    let port = free_port();
    let mut child = Command::new(env!("CARGO_BIN_EXE_gwlink"))
        .args([
            "--format",
            "json",
            "--log-level",
            "error",
            "listen",
            "--port",
            &port.to_string(),
            "--no-auth",
            "--count",
            "1",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen command should start");

    // Wait for the listener to come up, then send one frame.
    let mut stream = None;
    for _ in 0..100 {
        match std::net::TcpStream::connect(("127.0.0.1", port)) {
            Ok(connected) => {
                stream = Some(connected);
                break;
            }
            Err(_) => thread::sleep(Duration::from_millis(25)),
        }
    }
    let stream = stream.expect("listener should accept within budget");
    let mut writer = FrameWriter::new(stream);
    writer
        .send(priority::NORMAL, b"uplink data")
        .expect("send frame");

    let output = child.wait_with_output().expect("listen should exit");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("uplink data"));
}
