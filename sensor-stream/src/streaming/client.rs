//! Telemetry stream client: connection state machine and single-writer send path.
//!
//! A dedicated writer thread owns the TCP socket. Callers never touch it:
//! `connect`, `send` and `disconnect` only update state and push onto
//! channels, so sensor callback threads never block on network I/O and
//! writes reach the socket strictly in order, one at a time.
//!
//! # State machine
//!
//! ```text
//!               connect()                ok
//! Disconnected ──────────▶ Connecting ──────────▶ Connected
//!      ▲                       │                   │   │
//!      │   timeout / refused   │                   │   │ write error
//!      ├───────────────────────┘                   │   │ (RemoteClosed)
//!      │                                           │   │
//!      │        socket closed           disconnect()   │
//!      ├──────────────────────── Closing ◀─────────┘   │
//!      └───────────────────────────────────────────────┘
//! ```
//!
//! # Send queue
//!
//! Frames go through a bounded queue drained by the writer. When the queue
//! is full the newest frame is dropped and `send` returns
//! [`Error::SendQueueFull`]. Frames still queued when the connection closes
//! are discarded; nothing is buffered across connections.

use crate::core::types::CommandStatus;
use crate::error::{Error, Result};
use crate::streaming::notify::{ConnectionState, Notification, Notifier};
use crate::streaming::wire::Frame;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select, unbounded};
use parking_lot::Mutex;
use std::io::{ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Stream client tuning
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// Per-write timeout; a write blocked longer than this tears the connection down
    pub write_timeout: Option<Duration>,
    /// Frames that may wait for the writer before new ones are dropped
    pub send_queue_capacity: usize,
    /// Disable Nagle's algorithm on the socket
    pub nodelay: bool,
}

impl Default for StreamClientConfig {
    fn default() -> Self {
        Self {
            write_timeout: Some(Duration::from_millis(1000)),
            send_queue_capacity: 64,
            nodelay: true,
        }
    }
}

/// Snapshot of send counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    /// Frames dropped because the queue was full or the connection closed under them
    pub frames_dropped: u64,
}

/// Requests handled by the writer thread, in order
enum Control {
    Connect { address: String, timeout: Duration },
    Disconnect,
    Shutdown,
}

/// State shared between the client handle and its writer thread
struct Shared {
    state: Mutex<ConnectionState>,
    notifier: Notifier,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    frames_dropped: AtomicU64,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) -> ConnectionState {
        std::mem::replace(&mut *self.state.lock(), state)
    }
}

/// Client that streams frames to a single remote collector
pub struct TelemetryStreamClient {
    shared: Arc<Shared>,
    control_tx: Sender<Control>,
    frame_tx: Sender<Frame>,
    worker: Option<JoinHandle<()>>,
}

impl TelemetryStreamClient {
    /// Create a client and spawn its writer thread. Starts `Disconnected`.
    pub fn new(config: StreamClientConfig) -> Result<Self> {
        if config.send_queue_capacity == 0 {
            return Err(Error::Config(
                "send queue capacity must be at least 1".to_string(),
            ));
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(ConnectionState::Disconnected),
            notifier: Notifier::new(),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        });

        let (control_tx, control_rx) = unbounded();
        let (frame_tx, frame_rx) = bounded(config.send_queue_capacity);

        let worker = StreamWorker {
            shared: Arc::clone(&shared),
            config,
            control_rx,
            frame_rx,
            stream: None,
        };

        let handle = thread::Builder::new()
            .name("stream-writer".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            shared,
            control_tx,
            frame_tx,
            worker: Some(handle),
        })
    }

    /// Current connection state (diagnostics only; react to notifications instead)
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Receive every future state-change notification
    pub fn subscribe(&self) -> Receiver<Notification> {
        self.shared.notifier.subscribe()
    }

    /// Start connecting to `address` (`host:port`).
    ///
    /// Returns immediately. The outcome arrives as [`Notification::Connected`]
    /// or [`Notification::ConnectFailed`]. Ignored unless `Disconnected`.
    pub fn connect(&self, address: &str, timeout: Duration) -> CommandStatus {
        let mut state = self.shared.state.lock();
        if *state != ConnectionState::Disconnected {
            log::debug!("connect ignored while {}", *state);
            return CommandStatus::AlreadyInState;
        }

        let request = Control::Connect {
            address: address.to_string(),
            timeout,
        };
        if self.control_tx.send(request).is_err() {
            return CommandStatus::Failed("stream writer not running".to_string());
        }
        *state = ConnectionState::Connecting;
        log::info!("Connecting to {} (timeout {:?})", address, timeout);
        CommandStatus::Ok
    }

    /// Queue a frame for the writer.
    ///
    /// Returns [`Error::NotConnected`] without doing any I/O unless the
    /// client is `Connected`.
    pub fn send(&self, frame: Frame) -> Result<()> {
        // Held across try_send so a frame cannot slip in after the writer
        // has drained the queue for a disconnect
        let state = self.shared.state.lock();
        if *state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }

        match self.frame_tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(frame)) => {
                drop(state);
                let dropped = self.shared.frames_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 100 == 1 {
                    log::warn!(
                        "Send queue full, dropped frame {} ({} dropped so far)",
                        frame.sequence,
                        dropped
                    );
                }
                Err(Error::SendQueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(Error::NotConnected),
        }
    }

    /// Close the connection. Idempotent.
    ///
    /// A write already in progress finishes first; queued frames are dropped.
    /// While `Connecting`, the close is carried out once the attempt resolves.
    pub fn disconnect(&self) -> CommandStatus {
        let mut state = self.shared.state.lock();
        match *state {
            ConnectionState::Disconnected | ConnectionState::Closing => {
                CommandStatus::AlreadyInState
            }
            ConnectionState::Connected | ConnectionState::Connecting => {
                if self.control_tx.send(Control::Disconnect).is_err() {
                    return CommandStatus::Failed("stream writer not running".to_string());
                }
                if *state == ConnectionState::Connected {
                    *state = ConnectionState::Closing;
                }
                CommandStatus::Ok
            }
        }
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            frames_sent: self.shared.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.shared.bytes_sent.load(Ordering::Relaxed),
            frames_dropped: self.shared.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for TelemetryStreamClient {
    fn drop(&mut self) {
        let _ = self.control_tx.send(Control::Shutdown);

        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            log::error!("Stream writer thread panicked");
        }
    }
}

/// Writer thread: sole owner of the socket
struct StreamWorker {
    shared: Arc<Shared>,
    config: StreamClientConfig,
    control_rx: Receiver<Control>,
    frame_rx: Receiver<Frame>,
    stream: Option<TcpStream>,
}

impl StreamWorker {
    fn run(mut self) {
        log::debug!("Stream writer started");

        loop {
            select! {
                recv(self.control_rx) -> msg => match msg {
                    Ok(Control::Connect { address, timeout }) => self.handle_connect(&address, timeout),
                    Ok(Control::Disconnect) => self.handle_disconnect(),
                    Ok(Control::Shutdown) | Err(_) => break,
                },
                recv(self.frame_rx) -> msg => match msg {
                    Ok(frame) => self.handle_frame(frame),
                    Err(_) => break,
                },
            }
        }

        // Close anything still open so the transition is not silent
        let state = *self.shared.state.lock();
        if self.stream.is_some() || state != ConnectionState::Disconnected {
            self.handle_disconnect();
        }

        log::debug!(
            "Stream writer exiting ({} frames sent)",
            self.shared.frames_sent.load(Ordering::Relaxed)
        );
    }

    fn handle_connect(&mut self, address: &str, timeout: Duration) {
        match open_stream(address, timeout, &self.config) {
            Ok((stream, peer)) => {
                self.stream = Some(stream);
                self.shared.set_state(ConnectionState::Connected);
                self.shared
                    .notifier
                    .publish(Notification::Connected { peer });
            }
            Err(e) => {
                self.shared.set_state(ConnectionState::Disconnected);
                let reason = match e {
                    Error::ConnectFailed(reason) => reason,
                    other => other.to_string(),
                };
                self.shared
                    .notifier
                    .publish(Notification::ConnectFailed { reason });
            }
        }
    }

    fn handle_disconnect(&mut self) {
        // Leave Connected before draining so `send` cannot queue behind the drain
        let previous = self.shared.set_state(ConnectionState::Disconnected);

        let had_stream = match self.stream.take() {
            Some(stream) => {
                if let Err(e) = stream.shutdown(Shutdown::Both) {
                    log::debug!("Socket shutdown: {}", e);
                }
                true
            }
            None => false,
        };
        self.discard_queued();

        if had_stream || previous != ConnectionState::Disconnected {
            self.shared.notifier.publish(Notification::Disconnected);
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        if *self.shared.state.lock() != ConnectionState::Connected {
            log::trace!("Frame {} dropped, connection not open", frame.sequence);
            self.shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        match stream.write_all(frame.as_bytes()) {
            Ok(()) => {
                let sent = self.shared.frames_sent.fetch_add(1, Ordering::Relaxed) + 1;
                self.shared
                    .bytes_sent
                    .fetch_add(frame.len() as u64, Ordering::Relaxed);
                log::trace!("Sent frame {} ({} total)", frame.sequence, sent);
            }
            Err(e) => self.handle_write_error(e),
        }
    }

    fn handle_write_error(&mut self, error: std::io::Error) {
        let reason = describe_write_error(&error);

        // Errors after a disconnect request are expected while tearing down
        {
            let mut state = self.shared.state.lock();
            if *state != ConnectionState::Connected {
                log::debug!("Write error during {} ignored: {}", *state, reason);
                return;
            }
            *state = ConnectionState::Disconnected;
        }

        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.discard_queued();

        self.shared
            .notifier
            .publish(Notification::RemoteClosed { reason });
    }

    fn discard_queued(&mut self) {
        let mut discarded = 0u64;
        while self.frame_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            self.shared
                .frames_dropped
                .fetch_add(discarded, Ordering::Relaxed);
            log::debug!("Discarded {} queued frames", discarded);
        }
    }
}

/// Resolve `address` and connect to the first address that answers
fn open_stream(
    address: &str,
    timeout: Duration,
    config: &StreamClientConfig,
) -> Result<(TcpStream, SocketAddr)> {
    let candidates: Vec<SocketAddr> = address
        .to_socket_addrs()
        .map_err(|e| Error::ConnectFailed(format!("cannot resolve {}: {}", address, e)))?
        .collect();

    // One deadline bounds the whole attempt, however many addresses resolve
    let deadline = Instant::now() + timeout;
    let mut last_error = None;
    for addr in candidates {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            last_error = Some(std::io::Error::from(ErrorKind::TimedOut));
            break;
        }
        match TcpStream::connect_timeout(&addr, remaining) {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(config.nodelay) {
                    log::warn!("Failed to set TCP_NODELAY: {}", e);
                }
                if let Err(e) = stream.set_write_timeout(config.write_timeout) {
                    log::warn!("Failed to set write timeout: {}", e);
                }
                return Ok((stream, addr));
            }
            Err(e) => {
                log::debug!("Connect to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(Error::ConnectFailed(match last_error {
        Some(e) if e.kind() == ErrorKind::TimedOut => {
            format!("timed out after {:?} connecting to {}", timeout, address)
        }
        Some(e) => format!("{}: {}", address, e),
        None => format!("{} resolved to no addresses", address),
    }))
}

fn describe_write_error(error: &std::io::Error) -> String {
    match error.kind() {
        ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::UnexpectedEof => format!("peer closed connection ({})", error),
        ErrorKind::TimedOut | ErrorKind::WouldBlock => format!("write timed out ({})", error),
        _ => format!("write failed ({})", error),
    }
}
