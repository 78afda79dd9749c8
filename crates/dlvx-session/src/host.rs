//! The interface the embedding front-end implements to receive session
//! events.

use crate::breakpoint::BreakpointHandle;
use crate::suspend::SuspendContext;

/// How a breakpoint should be presented after a backend round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointPresentation {
    /// The backend accepted the breakpoint.
    Verified,
    /// The backend refused it.
    Invalid {
        /// Error text to show next to the marker.
        message: Option<String>,
    },
}

/// Receiver of session lifecycle and breakpoint events.
///
/// Methods are called from runtime tasks and must not block.
pub trait DebugHost: Send + Sync + 'static {
    /// Execution stopped somewhere that is not a known breakpoint.
    fn position_reached(&self, context: SuspendContext);

    /// Execution stopped at `breakpoint`.
    fn breakpoint_reached(
        &self,
        breakpoint: &BreakpointHandle,
        log_expression: Option<&str>,
        context: SuspendContext,
    );

    /// A breakpoint's marker should change.
    fn update_breakpoint_presentation(
        &self,
        breakpoint: &BreakpointHandle,
        presentation: BreakpointPresentation,
    );

    /// The session is over.
    fn stop(&self);
}
