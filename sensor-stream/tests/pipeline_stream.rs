//! End-to-end pipeline tests against a loopback collector

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use sensor_stream::core::types::ChannelId;
use sensor_stream::fusion::layout::ChannelSpec;
use sensor_stream::streaming::{ConnectionState, Notification};
use sensor_stream::{
    CommandStatus, Config, Pipeline, Result, SampleCallback, SensorSample, SensorSource,
};
use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

/// Source driven by the test: hands out the subscribed callback
#[derive(Default, Clone)]
struct ManualSource {
    callback: Arc<Mutex<Option<SampleCallback>>>,
}

impl ManualSource {
    fn push(&self, channel: usize, values: &[f32]) {
        let callback = self.callback.lock().clone().expect("source not subscribed");
        callback(SensorSample::new(ChannelId(channel), values.to_vec()));
    }
}

impl SensorSource for ManualSource {
    fn subscribe(&mut self, _channels: &[ChannelSpec], callback: SampleCallback) -> Result<()> {
        *self.callback.lock() = Some(callback);
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<()> {
        self.callback.lock().take();
        Ok(())
    }
}

fn layout_a_config(port: u16, connect_timeout_ms: u64) -> Config {
    Config::from_toml(&format!(
        r#"
[network]
host = "127.0.0.1"
port = {port}
connect_timeout_ms = {connect_timeout_ms}

[[frame.channels]]
name = "accel"
dimension = 3

[[frame.channels]]
name = "gyro"
dimension = 3

[[frame.channels]]
name = "magnet"
dimension = 3
"#
    ))
    .unwrap()
}

fn wait_for<F>(events: &Receiver<Notification>, mut matches: F) -> Notification
where
    F: FnMut(&Notification) -> bool,
{
    let deadline = Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = events
            .recv_timeout(remaining)
            .expect("timed out waiting for notification");
        if matches(&event) {
            return event;
        }
    }
}

fn decode(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn test_layout_a_frame_reaches_collector() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let collector = thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut frame = [0u8; 36];
        socket.read_exact(&mut frame).unwrap();
        frame
    });

    let source = ManualSource::default();
    let mut pipeline =
        Pipeline::new(&layout_a_config(addr.port(), 5000), Box::new(source.clone())).unwrap();
    assert_eq!(pipeline.layout().size(), 36);

    let events = pipeline.subscribe();
    assert_eq!(pipeline.connect(), CommandStatus::Ok);
    wait_for(&events, |n| matches!(n, Notification::Connected { .. }));
    assert_eq!(pipeline.start(), CommandStatus::Ok);

    // Out-of-order arrival, one duplicate that must be discarded
    source.push(2, &[4.0, 5.0, 6.0]);
    source.push(0, &[1.0, 2.0, 3.0]);
    source.push(0, &[9.0, 9.0, 9.0]);
    source.push(1, &[0.0, 0.0, 0.0]);

    let frame = collector.join().unwrap();
    assert_eq!(
        decode(&frame),
        vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 4.0, 5.0, 6.0]
    );

    let stats = pipeline.stats();
    assert_eq!(stats.aggregator.frames_emitted, 1);
    assert_eq!(stats.aggregator.samples_discarded, 1);
    assert_eq!(stats.frames_unsent, 0);
}

#[test]
fn test_connect_refused_reports_promptly() {
    let pipeline = Pipeline::new(
        &layout_a_config(closed_port(), 50),
        Box::new(ManualSource::default()),
    )
    .unwrap();
    let events = pipeline.subscribe();

    let started = Instant::now();
    assert_eq!(pipeline.connect(), CommandStatus::Ok);

    let event = wait_for(&events, |_| true);
    assert!(matches!(event, Notification::ConnectFailed { .. }), "{:?}", event);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(pipeline.connection_state(), ConnectionState::Disconnected);

    // Nothing else follows a failed attempt
    assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_remote_close_degrades_to_disconnected() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let collector = thread::spawn(move || {
        let (socket, _) = listener.accept().unwrap();
        drop(socket);
    });

    let source = ManualSource::default();
    let mut pipeline =
        Pipeline::new(&layout_a_config(port, 5000), Box::new(source.clone())).unwrap();
    let events = pipeline.subscribe();
    pipeline.connect();
    wait_for(&events, |n| matches!(n, Notification::Connected { .. }));
    collector.join().unwrap();
    pipeline.start();

    // Keep producing frames until a write notices the closed peer
    let deadline = Instant::now() + WAIT;
    let closed = loop {
        source.push(0, &[1.0, 2.0, 3.0]);
        source.push(1, &[0.0, 0.0, 0.0]);
        source.push(2, &[4.0, 5.0, 6.0]);
        if let Ok(Notification::RemoteClosed { reason }) = events.try_recv() {
            break reason;
        }
        assert!(Instant::now() < deadline, "peer close never detected");
        thread::sleep(Duration::from_millis(5));
    };
    assert!(!closed.is_empty());
    assert_eq!(pipeline.connection_state(), ConnectionState::Disconnected);

    // Frames completed from now on are counted as unsent
    let unsent = pipeline.stats().frames_unsent;
    source.push(0, &[1.0, 2.0, 3.0]);
    source.push(1, &[0.0, 0.0, 0.0]);
    source.push(2, &[4.0, 5.0, 6.0]);
    assert_eq!(pipeline.stats().frames_unsent, unsent + 1);
    assert!(pipeline.is_active());

    assert_eq!(pipeline.disconnect(), CommandStatus::AlreadyInState);
}

#[test]
fn test_disconnect_then_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let collector = thread::spawn(move || {
        let mut sockets = Vec::new();
        for _ in 0..2 {
            let (socket, _) = listener.accept().unwrap();
            sockets.push(socket);
        }
        sockets.len()
    });

    let pipeline =
        Pipeline::new(&layout_a_config(port, 5000), Box::new(ManualSource::default())).unwrap();
    let events = pipeline.subscribe();

    pipeline.connect();
    wait_for(&events, |n| matches!(n, Notification::Connected { .. }));
    assert_eq!(pipeline.disconnect(), CommandStatus::Ok);
    assert_eq!(pipeline.disconnect(), CommandStatus::AlreadyInState);
    assert_eq!(wait_for(&events, |_| true), Notification::Disconnected);

    assert_eq!(pipeline.connect(), CommandStatus::Ok);
    wait_for(&events, |n| matches!(n, Notification::Connected { .. }));
    assert_eq!(collector.join().unwrap(), 2);
}
