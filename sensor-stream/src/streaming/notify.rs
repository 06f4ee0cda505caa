//! Connection state and status notifications.
//!
//! Every connection state transition produces exactly one [`Notification`],
//! fanned out to all subscribers over unbounded channels. Subscribers that
//! drop their receiver are pruned on the next publish.

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;

/// Connection state owned by the stream client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Human-readable status change reported to the command surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Socket open, frames will be written
    Connected { peer: SocketAddr },
    /// Connect attempt timed out, was refused or could not be resolved
    ConnectFailed { reason: String },
    /// Closed on request
    Disconnected,
    /// Peer closed or a write failed; a new `connect` is required
    RemoteClosed { reason: String },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Connected { peer } => write!(f, "Connected to server {}", peer),
            Notification::ConnectFailed { reason } => {
                write!(f, "Could not connect to server: {}", reason)
            }
            Notification::Disconnected => write!(f, "Disconnected from server"),
            Notification::RemoteClosed { reason } => write!(f, "Remote server closed: {}", reason),
        }
    }
}

/// Fan-out of notifications to any number of subscribers
#[derive(Default)]
pub struct Notifier {
    subscribers: Mutex<Vec<Sender<Notification>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<Notification> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, notification: Notification) {
        match &notification {
            Notification::Connected { .. } | Notification::Disconnected => {
                log::info!("{}", notification)
            }
            Notification::ConnectFailed { .. } | Notification::RemoteClosed { .. } => {
                log::warn!("{}", notification)
            }
        }

        self.subscribers
            .lock()
            .retain(|tx| tx.send(notification.clone()).is_ok());
    }
}
