//! Connection status tracking.
//!
//! The status lives in a `watch` channel so that interested parties can
//! both poll it and wait for it to change.

use tokio::sync::watch;

/// Status of the link to the debugger backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Nothing attempted yet.
    NotConnected,
    /// A connection attempt is in progress.
    WaitingForConnection,
    /// The backend is reachable and requests can be sent.
    Connected,
    /// The backend closed the connection.
    Disconnected,
    /// The connection attempt failed.
    ConnectionFailed,
}

/// Shared, observable connection status.
#[derive(Debug)]
pub struct ConnectionState {
    tx: watch::Sender<ConnectionStatus>,
}

impl ConnectionState {
    /// Create a state in [`ConnectionStatus::NotConnected`].
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionStatus::NotConnected);
        Self { tx }
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    /// Whether the status is [`ConnectionStatus::Connected`].
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Publish a new status. Listeners are only woken on actual changes.
    pub fn set_status(&self, status: ConnectionStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            tracing::debug!(?status, "connection status changed");
        }
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}
