//! Run-state tracking and stop classification.
//!
//! Every run-state command reply (and every unsolicited state notification)
//! passes through [`StateSynchronizer::consume`], which either ends the
//! session or fetches the stack and reports the stop to the host.
use std::sync::Mutex;

use crate::breakpoint::BreakpointHandle;
use crate::gate::OneShot;
use crate::host::DebugHost;
use crate::processor::CommandProcessor;
use crate::protocol::DebuggerState;
use crate::registry::BreakpointRegistry;
use crate::request::Stacktrace;
use crate::suspend::SuspendContext;

/// Coarse run state of the debuggee as seen by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No run-state command has been issued yet.
    Initializing,
    /// A run-state command is executing.
    Running,
    /// Suspended at a breakpoint or after a step.
    Stopped,
    /// The session has ended; further replies are ignored.
    Terminated,
}

/// Session state plus the one-shot termination flag.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<SessionState>,
    terminated: OneShot,
}

impl Lifecycle {
    /// Start in [`SessionState::Initializing`].
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Initializing),
            terminated: OneShot::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move to `next` unless the session has already terminated.
    pub fn transition(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *state != SessionState::Terminated {
            *state = next;
        }
    }

    /// Mark the session terminated. Returns `true` only the first time.
    pub fn terminate(&self) -> bool {
        if !self.terminated.claim() {
            return false;
        }
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
            SessionState::Terminated;
        true
    }

    /// Whether the session has terminated.
    pub fn is_terminated(&self) -> bool {
        self.terminated.is_claimed()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// What a state notification turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The debuggee exited (or the backend had no state); the session ended.
    Terminated,
    /// Stopped at a known breakpoint.
    BreakpointReached(BreakpointHandle),
    /// Stopped somewhere else.
    PositionReached,
    /// The session was already over; nothing was reported.
    Ignored,
}

/// Turns backend state snapshots into host events.
pub struct StateSynchronizer<'a> {
    processor: &'a CommandProcessor,
    registry: &'a BreakpointRegistry,
    lifecycle: &'a Lifecycle,
    host: &'a dyn DebugHost,
    stack_depth: u32,
}

impl<'a> StateSynchronizer<'a> {
    /// Borrow the session parts needed to process one notification.
    pub fn new(
        processor: &'a CommandProcessor,
        registry: &'a BreakpointRegistry,
        lifecycle: &'a Lifecycle,
        host: &'a dyn DebugHost,
        stack_depth: u32,
    ) -> Self {
        Self {
            processor,
            registry,
            lifecycle,
            host,
            stack_depth,
        }
    }

    /// End the session, telling the host exactly once.
    pub fn terminate(&self) {
        if self.lifecycle.terminate() {
            tracing::info!("debug session terminated");
            self.host.stop();
        }
    }

    /// Process one state snapshot.
    ///
    /// A missing or exited state ends the session without a stack fetch.
    /// Otherwise the stack is fetched and the stop is reported as a
    /// breakpoint hit when the reported breakpoint is registered. A failed
    /// stack fetch does not drop the stop: it is reported with an empty
    /// stack under the same classification.
    pub async fn consume(&self, state: Option<DebuggerState>) -> StopOutcome {
        if self.lifecycle.is_terminated() {
            tracing::debug!("ignoring state notification after session end");
            return StopOutcome::Ignored;
        }

        let state = match state {
            Some(state) if !state.exited => state,
            Some(state) => {
                tracing::info!(exit_status = state.exit_status, "debuggee exited");
                self.terminate();
                return StopOutcome::Terminated;
            }
            None => {
                tracing::info!("backend reported no state");
                self.terminate();
                return StopOutcome::Terminated;
            }
        };

        self.lifecycle.transition(SessionState::Stopped);

        let hit = state
            .breakpoint
            .as_ref()
            .and_then(|bp| self.registry.find(bp.id));
        let thread_id = state.current_thread_id();

        let context = match self.processor.send(Stacktrace::new(self.stack_depth)).await {
            Ok(locations) => SuspendContext::new(thread_id, locations),
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch stack trace, reporting stop with empty stack");
                SuspendContext::unknown_stack(thread_id)
            }
        };

        if self.lifecycle.is_terminated() {
            tracing::debug!("dropping stop event, session ended during stack fetch");
            return StopOutcome::Ignored;
        }

        match hit {
            Some(breakpoint) => {
                tracing::debug!(
                    path = %breakpoint.path().display(),
                    line = breakpoint.source_line(),
                    thread_id,
                    "breakpoint reached"
                );
                self.host.breakpoint_reached(&breakpoint, None, context);
                StopOutcome::BreakpointReached(breakpoint)
            }
            None => {
                tracing::debug!(thread_id, "position reached");
                self.host.position_reached(context);
                StopOutcome::PositionReached
            }
        }
    }
}
