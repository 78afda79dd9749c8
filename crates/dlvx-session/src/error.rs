//! Debugger session error types.

use thiserror::Error;

/// Errors from backend communication and session operations.
#[derive(Debug, Error)]
pub enum DlvError {
    /// Socket-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection to the backend broke while a request was in flight.
    #[error("transport error: {0}")]
    Transport(String),

    /// No connection has been attached to the command processor yet.
    #[error("not connected to the debugger backend")]
    NotConnected,

    /// The backend did not reply within the configured timeout.
    #[error("request timed out after {secs} seconds: {method}")]
    Timeout {
        /// The RPC method that timed out.
        method: String,
        /// Timeout that elapsed.
        secs: u64,
    },

    /// The backend refused the request. Displays the backend's own message
    /// so it can be shown to the user unchanged.
    #[error("{message}")]
    Rpc {
        /// Error text reported by the backend.
        message: String,
    },

    /// The backend sent something that is not a valid reply.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Encoding a request or decoding a result failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A command name outside the supported set.
    #[error("unknown debugger command: {0}")]
    UnknownCommand(String),

    /// The session has already been terminated.
    #[error("session already terminated")]
    Terminated,
}
