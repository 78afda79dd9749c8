//! Backend payload types.
//!
//! Mirrors the JSON shapes exchanged with a Delve-style JSON-RPC backend.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DlvError;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// The closed set of run-state commands the backend understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// Resume until the next stop.
    #[serde(rename = "continue")]
    Continue,
    /// Step over the current source line.
    #[serde(rename = "next")]
    Next,
    /// Step into the current source line.
    #[serde(rename = "step")]
    Step,
    /// Interrupt a running debuggee.
    #[serde(rename = "halt")]
    Halt,
    /// Make another thread current.
    #[serde(rename = "switchThread")]
    SwitchThread,
}

impl CommandKind {
    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Continue => "continue",
            CommandKind::Next => "next",
            CommandKind::Step => "step",
            CommandKind::Halt => "halt",
            CommandKind::SwitchThread => "switchThread",
        }
    }

    /// Whether the command lets the debuggee run until its next stop.
    pub fn resumes(self) -> bool {
        matches!(
            self,
            CommandKind::Continue | CommandKind::Next | CommandKind::Step
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = DlvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue" => Ok(CommandKind::Continue),
            "next" => Ok(CommandKind::Next),
            "step" => Ok(CommandKind::Step),
            "halt" => Ok(CommandKind::Halt),
            "switchThread" => Ok(CommandKind::SwitchThread),
            other => Err(DlvError::UnknownCommand(other.to_string())),
        }
    }
}

/// Argument of `RPCServer.Command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebuggerCommand {
    /// Which command to run.
    pub name: CommandKind,
    /// Target thread, only meaningful for `switchThread`.
    #[serde(rename = "threadID", skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A breakpoint as known by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    /// Backend-assigned identifier.
    pub id: i64,
    /// Source file the breakpoint resolved to.
    #[serde(default)]
    pub file: String,
    /// 1-based line the breakpoint resolved to.
    #[serde(default)]
    pub line: i64,
    /// Enclosing function, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
}

/// Location argument of `RPCServer.CreateBreakpoint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointSpec {
    /// Canonical path of the source file.
    pub file: String,
    /// 1-based line.
    pub line: i64,
}

/// A debuggee OS thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    /// Backend thread id.
    pub id: i64,
    /// Current program counter.
    #[serde(default)]
    pub pc: u64,
    /// Source file of the current position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// 1-based line of the current position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
}

/// Snapshot of the debuggee's run state returned after run-state commands.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebuggerState {
    /// Breakpoint the debuggee stopped at, if any.
    #[serde(rename = "breakPoint", default, skip_serializing_if = "Option::is_none")]
    pub breakpoint: Option<Breakpoint>,
    /// Thread that is current after the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_thread: Option<Thread>,
    /// Whether the debuggee has exited.
    #[serde(default)]
    pub exited: bool,
    /// Exit status, valid when `exited` is set.
    #[serde(default)]
    pub exit_status: i64,
}

impl DebuggerState {
    /// Id of the current thread, or 0 when the backend did not report one.
    pub fn current_thread_id(&self) -> i64 {
        self.current_thread.as_ref().map_or(0, |t| t.id)
    }
}

/// A function descriptor inside a stack location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    /// Fully qualified function name.
    pub name: String,
}

/// One entry of a stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Program counter.
    #[serde(default)]
    pub pc: u64,
    /// Source file.
    #[serde(default)]
    pub file: String,
    /// 1-based line.
    #[serde(default)]
    pub line: i64,
    /// Enclosing function, if known.
    #[serde(default)]
    pub function: Option<Function>,
}

/// Argument of `RPCServer.StacktraceGoroutine`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StacktraceArgs {
    /// Goroutine id; -1 selects the current one.
    #[serde(rename = "Id")]
    pub id: i64,
    /// Maximum number of frames.
    #[serde(rename = "Depth")]
    pub depth: u32,
}
