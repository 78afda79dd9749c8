//! Backend breakpoint id to front-end handle mapping.
//!
//! Written by breakpoint set/remove completions and read by stop
//! notifications, possibly from different tasks at once.
use std::collections::HashMap;
use std::sync::RwLock;

use crate::breakpoint::BreakpointHandle;

/// Concurrency-safe map from backend breakpoint id to front-end handle.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    entries: RwLock<HashMap<i64, BreakpointHandle>>,
}

impl BreakpointRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `id` with `handle`, replacing any previous mapping.
    pub fn add(&self, id: i64, handle: BreakpointHandle) {
        let previous = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, handle);
        if previous.is_some() {
            tracing::debug!(id, "replaced existing breakpoint mapping");
        }
    }

    /// Drop the mapping for `id`. Absent ids are ignored.
    pub fn remove(&self, id: i64) -> Option<BreakpointHandle> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id)
    }

    /// Handle registered for `id`, if any.
    pub fn find(&self, id: i64) -> Option<BreakpointHandle> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .cloned()
    }

    /// Number of installed breakpoints.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Whether no breakpoints are installed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
