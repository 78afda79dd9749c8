//! Front-end line breakpoints and the host's breakpoint configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug)]
struct LineBreakpoint {
    path: PathBuf,
    line: u32,
    backend_id: Mutex<Option<i64>>,
}

/// The host's breakpoint object.
///
/// Cloning yields another reference to the same breakpoint; equality is
/// identity, not location. A handle carries the backend id only between a
/// successful set and the following remove.
#[derive(Clone)]
pub struct BreakpointHandle {
    inner: Arc<LineBreakpoint>,
}

impl BreakpointHandle {
    /// Create a breakpoint at a 0-based `line` of `path`.
    pub fn new(path: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            inner: Arc::new(LineBreakpoint {
                path: path.into(),
                line,
                backend_id: Mutex::new(None),
            }),
        }
    }

    /// Source file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The path sent to the backend: the canonical form of [`path`](Self::path)
    /// when the file can be resolved, otherwise the path as given.
    pub fn resolved_path(&self) -> PathBuf {
        std::fs::canonicalize(&self.inner.path).unwrap_or_else(|_| self.inner.path.clone())
    }

    /// 0-based line.
    pub fn line(&self) -> u32 {
        self.inner.line
    }

    /// 1-based line, as the backend expects it.
    pub fn source_line(&self) -> i64 {
        i64::from(self.inner.line) + 1
    }

    /// Backend id, if the breakpoint is currently installed.
    pub fn backend_id(&self) -> Option<i64> {
        *self.id_slot()
    }

    /// Record the id the backend assigned.
    pub fn set_backend_id(&self, id: i64) {
        *self.id_slot() = Some(id);
    }

    /// Clear and return the recorded id.
    pub fn take_backend_id(&self) -> Option<i64> {
        self.id_slot().take()
    }

    fn id_slot(&self) -> std::sync::MutexGuard<'_, Option<i64>> {
        self.inner
            .backend_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PartialEq for BreakpointHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for BreakpointHandle {}

impl fmt::Debug for BreakpointHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakpointHandle")
            .field("path", &self.inner.path)
            .field("line", &self.inner.line)
            .field("backend_id", &self.backend_id())
            .finish()
    }
}

/// Line breakpoints the user has configured in the host.
///
/// Installation reads it through [`BreakpointConfig::snapshot_if`], which
/// holds the read lock only for the duration of the copy.
#[derive(Debug, Default)]
pub struct BreakpointConfig {
    breakpoints: RwLock<Vec<BreakpointHandle>>,
}

impl BreakpointConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breakpoint. Adding the same handle twice is a no-op.
    ///
    /// Returns `true` if it was added.
    pub fn add(&self, handle: BreakpointHandle) -> bool {
        self.add_then(handle, || ()).is_some()
    }

    /// Add a breakpoint and run `then` before releasing the write lock.
    ///
    /// Returns `None` without running `then` if the handle was already
    /// present.
    pub fn add_then<T>(&self, handle: BreakpointHandle, then: impl FnOnce() -> T) -> Option<T> {
        let mut list = self
            .breakpoints
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if list.contains(&handle) {
            return None;
        }
        list.push(handle);
        Some(then())
    }

    /// Remove a breakpoint.
    ///
    /// Returns `true` if it was present.
    pub fn remove(&self, handle: &BreakpointHandle) -> bool {
        let mut list = self
            .breakpoints
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = list.len();
        list.retain(|bp| bp != handle);
        before != list.len()
    }

    /// Find a configured breakpoint by location.
    pub fn find(&self, path: &Path, line: u32) -> Option<BreakpointHandle> {
        self.snapshot()
            .into_iter()
            .find(|bp| bp.path() == path && bp.line() == line)
    }

    /// Number of configured breakpoints.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether no breakpoints are configured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the configured breakpoints, in insertion order.
    pub fn snapshot(&self) -> Vec<BreakpointHandle> {
        let guard = self
            .breakpoints
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone()
    }

    /// Copy the configured breakpoints if `claim` returns `true`.
    ///
    /// `claim` runs under the read lock, so a concurrent [`add_then`] either
    /// lands in the copy or observes the claim.
    ///
    /// [`add_then`]: BreakpointConfig::add_then
    pub fn snapshot_if(&self, claim: impl FnOnce() -> bool) -> Option<Vec<BreakpointHandle>> {
        let guard = self
            .breakpoints
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        claim().then(|| guard.clone())
    }
}
