//! Suspended-execution context reported to the host on every stop.

use crate::protocol::Location;

/// One frame of the suspended thread's stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Source file.
    pub file: String,
    /// 1-based line.
    pub line: i64,
    /// Enclosing function name, if the backend knows it.
    pub function: Option<String>,
    /// Program counter.
    pub pc: u64,
}

impl StackFrame {
    /// 0-based line for editor positioning.
    pub fn source_line(&self) -> u32 {
        u32::try_from(self.line.saturating_sub(1)).unwrap_or(0)
    }
}

impl From<Location> for StackFrame {
    fn from(loc: Location) -> Self {
        Self {
            file: loc.file,
            line: loc.line,
            function: loc.function.map(|f| f.name),
            pc: loc.pc,
        }
    }
}

/// Where and on which thread execution is suspended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspendContext {
    thread_id: i64,
    frames: Vec<StackFrame>,
}

impl SuspendContext {
    /// Build a context from the stack fetched for `thread_id`.
    pub fn new(thread_id: i64, locations: Vec<Location>) -> Self {
        Self {
            thread_id,
            frames: locations.into_iter().map(StackFrame::from).collect(),
        }
    }

    /// A context whose stack could not be fetched.
    pub fn unknown_stack(thread_id: i64) -> Self {
        Self {
            thread_id,
            frames: Vec::new(),
        }
    }

    /// Backend id of the suspended thread.
    pub fn thread_id(&self) -> i64 {
        self.thread_id
    }

    /// Frames, innermost first.
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// The innermost frame.
    pub fn active_frame(&self) -> Option<&StackFrame> {
        self.frames.first()
    }

    /// Whether the stack is unavailable.
    pub fn is_stack_unknown(&self) -> bool {
        self.frames.is_empty()
    }
}
