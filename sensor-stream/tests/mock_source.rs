//! Simulated source streaming through the full pipeline

#![cfg(feature = "mock")]

use crossbeam_channel::Receiver;
use sensor_stream::streaming::Notification;
use sensor_stream::{CommandStatus, Config, Pipeline};
use std::io::Read;
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

fn wait_connected(events: &Receiver<Notification>) {
    match events.recv_timeout(Duration::from_secs(5)) {
        Ok(Notification::Connected { .. }) => {}
        other => panic!("expected Connected, got {:?}", other),
    }
}

#[test]
fn test_variant_d_frames_from_mock_source() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let collector = thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut frames = vec![0u8; 28 * 5];
        socket.read_exact(&mut frames).unwrap();
        frames
    });

    let text = include_str!("../configs/variant_d.toml")
        .replace("host = \"10.0.0.157\"", "host = \"127.0.0.1\"")
        .replace("port = 1234", &format!("port = {}", port))
        .replace("rate_hz = 50.0", "rate_hz = 200.0")
        .replace("random_seed = 0", "random_seed = 7");
    let config = Config::from_toml(&text).unwrap();

    let mut pipeline = Pipeline::from_config(&config).unwrap();
    assert_eq!(pipeline.layout().size(), 28);

    let events = pipeline.subscribe();
    pipeline.connect();
    wait_connected(&events);
    assert_eq!(pipeline.start(), CommandStatus::Ok);

    let frames = collector.join().unwrap();
    assert_eq!(pipeline.stop(), CommandStatus::Ok);

    for frame in frames.chunks_exact(28) {
        let values: Vec<f32> = frame
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(values.len(), 7);
        assert!(values.iter().all(|v| v.is_finite()));
        // Small tilt keeps the quaternion close to unit length
        let norm = values[3..].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.1, "norm {}", norm);
    }

    assert!(pipeline.stats().aggregator.frames_emitted >= 5);
}
