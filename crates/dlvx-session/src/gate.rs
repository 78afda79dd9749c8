//! One-shot flags guarding breakpoint installation.
//!
//! Two independent flags: one for the installation itself and one for the
//! connection listener that may trigger it later. Each is won by exactly
//! one caller.

use std::sync::atomic::{AtomicBool, Ordering};

/// A flag that can be claimed exactly once.
#[derive(Debug, Default)]
pub struct OneShot {
    claimed: AtomicBool,
}

impl OneShot {
    /// Create an unclaimed flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag. Returns `true` only for the first caller.
    pub fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the flag has been claimed.
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

/// State of the connection lifecycle gate.
#[derive(Debug, Default)]
pub struct InitGate {
    breakpoints_initiated: OneShot,
    listener_added: OneShot,
}

impl InitGate {
    /// Create a gate with both flags unclaimed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Win the right to install breakpoints.
    pub fn begin_initialization(&self) -> bool {
        self.breakpoints_initiated.claim()
    }

    /// Win the right to register the connection listener.
    pub fn begin_listening(&self) -> bool {
        self.listener_added.claim()
    }

    /// Whether installation has started.
    pub fn is_initialized(&self) -> bool {
        self.breakpoints_initiated.is_claimed()
    }

    /// Whether the listener has been registered.
    pub fn is_listening(&self) -> bool {
        self.listener_added.is_claimed()
    }
}
