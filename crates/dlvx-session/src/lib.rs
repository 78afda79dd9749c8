//! dlvx-session: control layer for a Delve-style debugger backend.
//!
//! This crate sends run-state and breakpoint commands over a single
//! JSON-RPC connection, keeps the mapping from backend breakpoint ids to
//! front-end breakpoints, installs configured breakpoints exactly once per
//! connection and turns backend state snapshots into host stop events.

pub mod breakpoint;
pub mod codec;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod host;
pub mod processor;
pub mod protocol;
pub mod registry;
pub mod request;
pub mod session;
pub mod state;
pub mod suspend;

// Re-export key types for convenience.
pub use breakpoint::{BreakpointConfig, BreakpointHandle};
pub use connection::{ConnectionState, ConnectionStatus};
pub use error::DlvError;
pub use host::{BreakpointPresentation, DebugHost};
pub use processor::CommandProcessor;
pub use protocol::{CommandKind, DebuggerState};
pub use registry::BreakpointRegistry;
pub use session::{BreakpointHandler, DebugSession, SessionOptions};
pub use state::{SessionState, StopOutcome};
pub use suspend::{StackFrame, SuspendContext};
