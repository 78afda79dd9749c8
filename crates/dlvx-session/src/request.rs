//! Typed backend requests.
//!
//! Each request knows its RPC method, how to encode its single argument,
//! and which type its result decodes into.

use serde::de::DeserializeOwned;

use crate::error::DlvError;
use crate::protocol::{
    Breakpoint, BreakpointSpec, CommandKind, DebuggerCommand, DebuggerState, Location,
    StacktraceArgs,
};

/// A request that can be sent through the
/// [`CommandProcessor`](crate::processor::CommandProcessor).
pub trait DlvRequest {
    /// Decoded result type.
    type Response: DeserializeOwned;

    /// Fully qualified RPC method name.
    fn method(&self) -> &'static str;

    /// The JSON-RPC `params` array.
    fn params(&self) -> Result<serde_json::Value, DlvError>;

    /// Whether the reply must arrive within the processor's request
    /// timeout. Requests that only complete when the debuggee next stops
    /// return `false` and wait for as long as it runs.
    fn is_bounded(&self) -> bool {
        true
    }
}

fn single_param<T: serde::Serialize>(arg: &T) -> Result<serde_json::Value, DlvError> {
    let value = serde_json::to_value(arg).map_err(|e| DlvError::Serialization(e.to_string()))?;
    Ok(serde_json::Value::Array(vec![value]))
}

/// Run-state command (`continue`, `next`, `step`, `halt`, `switchThread`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: DebuggerCommand,
}

impl Command {
    /// A command that takes no thread argument.
    pub fn new(kind: CommandKind) -> Self {
        Self {
            args: DebuggerCommand {
                name: kind,
                thread_id: None,
            },
        }
    }

    /// A `switchThread` command targeting `thread_id`.
    pub fn switch_thread(thread_id: i64) -> Self {
        Self {
            args: DebuggerCommand {
                name: CommandKind::SwitchThread,
                thread_id: Some(thread_id),
            },
        }
    }

    /// Parse a command by wire name; unknown names are rejected here.
    pub fn from_name(name: &str) -> Result<Self, DlvError> {
        Ok(Self::new(name.parse()?))
    }

    /// The command kind.
    pub fn kind(&self) -> CommandKind {
        self.args.name
    }
}

impl DlvRequest for Command {
    // The backend answers `null` when it has no state to report.
    type Response = Option<DebuggerState>;

    fn method(&self) -> &'static str {
        "RPCServer.Command"
    }

    fn params(&self) -> Result<serde_json::Value, DlvError> {
        single_param(&self.args)
    }

    // `continue`, `next` and `step` reply when the debuggee stops again.
    fn is_bounded(&self) -> bool {
        !self.args.name.resumes()
    }
}

/// Query the current run state without changing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct State;

impl DlvRequest for State {
    type Response = Option<DebuggerState>;

    fn method(&self) -> &'static str {
        "RPCServer.State"
    }

    fn params(&self) -> Result<serde_json::Value, DlvError> {
        Ok(serde_json::Value::Array(Vec::new()))
    }
}

/// Install a line breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetBreakpoint {
    spec: BreakpointSpec,
}

impl SetBreakpoint {
    /// `line` is 1-based.
    pub fn new(file: impl Into<String>, line: i64) -> Self {
        Self {
            spec: BreakpointSpec {
                file: file.into(),
                line,
            },
        }
    }
}

impl DlvRequest for SetBreakpoint {
    type Response = Option<Breakpoint>;

    fn method(&self) -> &'static str {
        "RPCServer.CreateBreakpoint"
    }

    fn params(&self) -> Result<serde_json::Value, DlvError> {
        single_param(&self.spec)
    }
}

/// Remove a breakpoint by backend id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearBreakpoint {
    id: i64,
}

impl ClearBreakpoint {
    /// Clear the breakpoint the backend knows as `id`.
    pub fn new(id: i64) -> Self {
        Self { id }
    }
}

impl DlvRequest for ClearBreakpoint {
    type Response = Option<Breakpoint>;

    fn method(&self) -> &'static str {
        "RPCServer.ClearBreakpoint"
    }

    fn params(&self) -> Result<serde_json::Value, DlvError> {
        single_param(&self.id)
    }
}

/// Fetch the stack of the current goroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stacktrace {
    depth: u32,
}

impl Stacktrace {
    /// Request at most `depth` frames.
    pub fn new(depth: u32) -> Self {
        Self { depth }
    }
}

impl DlvRequest for Stacktrace {
    type Response = Vec<Location>;

    fn method(&self) -> &'static str {
        "RPCServer.StacktraceGoroutine"
    }

    fn params(&self) -> Result<serde_json::Value, DlvError> {
        single_param(&StacktraceArgs {
            id: -1,
            depth: self.depth,
        })
    }
}
