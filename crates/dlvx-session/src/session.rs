//! Debug session: maps host actions onto backend requests.
//!
//! A [`DebugSession`] is a cheap handle; every clone talks to the same
//! backend connection. Operations that reach the backend spawn a task and
//! return its [`JoinHandle`] so callers can fire and forget.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::breakpoint::{BreakpointConfig, BreakpointHandle};
use crate::connection::{ConnectionState, ConnectionStatus};
use crate::dispatcher::NotificationHandler;
use crate::error::DlvError;
use crate::gate::InitGate;
use crate::host::{BreakpointPresentation, DebugHost};
use crate::processor::CommandProcessor;
use crate::protocol::{CommandKind, DebuggerState};
use crate::registry::BreakpointRegistry;
use crate::request::{ClearBreakpoint, Command, SetBreakpoint, State};
use crate::state::{Lifecycle, SessionState, StateSynchronizer, StopOutcome};

/// Method name of the backend's unsolicited stop notification.
const STATE_NOTIFICATION: &str = "State";

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// How long to wait for each reply.
    pub request_timeout: Duration,
    /// How long to wait for the TCP connection.
    pub connect_timeout: Duration,
    /// Frames requested on every stop.
    pub stack_depth: u32,
    /// Issue `continue` once breakpoints are installed after a late connect.
    pub resume_on_connect: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            stack_depth: 50,
            resume_on_connect: true,
        }
    }
}

struct SessionInner {
    host: Arc<dyn DebugHost>,
    processor: CommandProcessor,
    registry: BreakpointRegistry,
    config: BreakpointConfig,
    gate: InitGate,
    lifecycle: Lifecycle,
    options: SessionOptions,
}

/// Handle to one debug attachment.
#[derive(Clone)]
pub struct DebugSession {
    inner: Arc<SessionInner>,
}

impl DebugSession {
    /// Create a session with its own connection state.
    pub fn new(host: Arc<dyn DebugHost>, options: SessionOptions) -> Self {
        Self::with_connection(host, Arc::new(ConnectionState::new()), options)
    }

    /// Create a session publishing to an existing connection state.
    pub fn with_connection(
        host: Arc<dyn DebugHost>,
        connection: Arc<ConnectionState>,
        options: SessionOptions,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<SessionInner>| {
            let processor = CommandProcessor::with_notification_handler(
                connection,
                options.request_timeout,
                notification_handler(weak.clone()),
            );
            SessionInner {
                host,
                processor,
                registry: BreakpointRegistry::new(),
                config: BreakpointConfig::new(),
                gate: InitGate::new(),
                lifecycle: Lifecycle::new(),
                options,
            }
        });
        Self { inner }
    }

    /// Connect to the backend over TCP.
    pub async fn connect(&self, addr: &str) -> Result<(), DlvError> {
        if self.inner.lifecycle.is_terminated() {
            return Err(DlvError::Terminated);
        }
        self.inner
            .processor
            .connect(addr, self.inner.options.connect_timeout)
            .await
    }

    /// Attach to an already established byte stream.
    pub fn attach<R, W>(&self, reader: R, writer: W)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.inner.processor.attach(reader, writer);
    }

    /// Ask whether configured breakpoints can be pushed to the backend.
    ///
    /// When connected, installation starts right away and `true` is
    /// returned if this call started it. Otherwise a single listener is
    /// registered that installs and resumes once the connection comes up,
    /// and `false` is returned. Must be called inside a Tokio runtime.
    pub fn check_can_init_breakpoints(&self) -> bool {
        if self.connection().is_connected() {
            return self.initialize_breakpoints(false).is_some();
        }

        if self.inner.gate.begin_listening() {
            tracing::debug!("waiting for backend connection before installing breakpoints");
            let status = self.connection().subscribe();
            tokio::spawn(install_when_connected(
                Arc::downgrade(&self.inner),
                status,
            ));
        }
        false
    }

    fn initialize_breakpoints(&self, resume: bool) -> Option<JoinHandle<()>> {
        let breakpoints = self
            .inner
            .config
            .snapshot_if(|| self.inner.gate.begin_initialization())?;
        let session = self.clone();
        Some(tokio::spawn(async move {
            session.install_breakpoints(&breakpoints).await;
            if resume {
                session.run_command(Command::new(CommandKind::Continue)).await;
            }
        }))
    }

    async fn install_breakpoints(&self, breakpoints: &[BreakpointHandle]) {
        tracing::info!(count = breakpoints.len(), "installing configured breakpoints");
        for breakpoint in breakpoints {
            self.install_breakpoint(breakpoint).await;
        }
    }

    async fn install_breakpoint(&self, breakpoint: &BreakpointHandle) {
        let request = SetBreakpoint::new(
            breakpoint.resolved_path().to_string_lossy(),
            breakpoint.source_line(),
        );
        let result = self.inner.processor.send(request).await;

        if self.inner.lifecycle.is_terminated() {
            tracing::debug!(?breakpoint, "ignoring breakpoint reply after session end");
            return;
        }

        let presentation = match result {
            Ok(Some(installed)) => {
                tracing::debug!(id = installed.id, ?breakpoint, "breakpoint installed");
                breakpoint.set_backend_id(installed.id);
                self.inner.registry.add(installed.id, breakpoint.clone());
                BreakpointPresentation::Verified
            }
            Ok(None) => {
                tracing::warn!(?breakpoint, "backend returned no breakpoint");
                BreakpointPresentation::Invalid {
                    message: Some("backend returned no breakpoint".into()),
                }
            }
            Err(e) => {
                tracing::warn!(?breakpoint, error = %e, "failed to set breakpoint");
                BreakpointPresentation::Invalid {
                    message: Some(e.to_string()),
                }
            }
        };
        self.inner
            .host
            .update_breakpoint_presentation(breakpoint, presentation);
    }

    /// Push one breakpoint to the backend.
    ///
    /// On success the backend id is recorded on the handle and in the
    /// registry, and the host shows it verified. On failure the host
    /// shows it invalid with the backend's message.
    pub fn add_breakpoint(&self, breakpoint: BreakpointHandle) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move { session.install_breakpoint(&breakpoint).await })
    }

    /// Remove one breakpoint from the backend.
    ///
    /// Returns `None` when the handle has no backend id (never installed or
    /// already removed). The clear request is fire-and-forget.
    pub fn remove_breakpoint(&self, breakpoint: &BreakpointHandle) -> Option<JoinHandle<()>> {
        let Some(id) = breakpoint.take_backend_id() else {
            tracing::debug!(?breakpoint, "breakpoint not installed, nothing to remove");
            return None;
        };
        self.inner.registry.remove(id);

        let session = self.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = session.inner.processor.send(ClearBreakpoint::new(id)).await {
                tracing::warn!(id, error = %e, "failed to clear breakpoint");
            }
        }))
    }

    /// Step over the current line.
    pub fn step_over(&self) -> JoinHandle<()> {
        self.dispatch(Command::new(CommandKind::Next))
    }

    /// Step into the current line.
    pub fn step_into(&self) -> JoinHandle<()> {
        self.dispatch(Command::new(CommandKind::Step))
    }

    /// Not supported by this backend; does nothing.
    pub fn step_out(&self) {
        tracing::debug!("step out is not supported");
    }

    /// Whether [`DebugSession::step_out`] does anything.
    pub fn is_step_out_supported(&self) -> bool {
        false
    }

    /// Continue execution.
    pub fn resume(&self) -> JoinHandle<()> {
        self.dispatch(Command::new(CommandKind::Continue))
    }

    /// Interrupt the running debuggee.
    pub fn pause(&self) -> JoinHandle<()> {
        self.dispatch(Command::new(CommandKind::Halt))
    }

    /// Make `thread_id` the current thread.
    pub fn switch_thread(&self, thread_id: i64) -> JoinHandle<()> {
        self.dispatch(Command::switch_thread(thread_id))
    }

    /// Not supported by this backend; does nothing.
    pub fn run_to_position(&self, path: &std::path::Path, line: u32) {
        tracing::debug!(path = %path.display(), line, "run to position is not supported");
    }

    /// Ask the backend for its current state and report it like a stop.
    pub fn refresh_state(&self) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            match session.inner.processor.send(State).await {
                Ok(state) => {
                    session.handle_state(state).await;
                }
                Err(e) => tracing::warn!(error = %e, "failed to fetch debugger state"),
            }
        })
    }

    /// End the session without a backend round-trip.
    pub fn stop(&self) {
        self.synchronizer().terminate();
    }

    /// Feed a state snapshot through the stop classifier.
    pub async fn handle_state(&self, state: Option<DebuggerState>) -> StopOutcome {
        self.synchronizer().consume(state).await
    }

    fn dispatch(&self, command: Command) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move { session.run_command(command).await })
    }

    async fn run_command(&self, command: Command) {
        let kind = command.kind();
        if self.inner.lifecycle.is_terminated() {
            tracing::debug!(command = %kind, "session ended, dropping command");
            return;
        }
        if kind.resumes() {
            self.inner.lifecycle.transition(SessionState::Running);
        }

        tracing::debug!(command = %kind, "sending debugger command");
        match self.inner.processor.send(command).await {
            Ok(state) => {
                self.handle_state(state).await;
            }
            Err(e) => tracing::warn!(command = %kind, error = %e, "debugger command failed"),
        }
    }

    fn synchronizer(&self) -> StateSynchronizer<'_> {
        StateSynchronizer::new(
            &self.inner.processor,
            &self.inner.registry,
            &self.inner.lifecycle,
            self.inner.host.as_ref(),
            self.inner.options.stack_depth,
        )
    }

    /// Handler to register with the host's breakpoint manager.
    pub fn breakpoint_handler(&self) -> BreakpointHandler {
        BreakpointHandler {
            session: self.clone(),
        }
    }

    /// Current run state.
    pub fn state(&self) -> SessionState {
        self.inner.lifecycle.state()
    }

    /// Whether the session has ended.
    pub fn is_terminated(&self) -> bool {
        self.inner.lifecycle.is_terminated()
    }

    /// Installed breakpoints by backend id.
    pub fn registry(&self) -> &BreakpointRegistry {
        &self.inner.registry
    }

    /// Breakpoints configured by the host.
    pub fn breakpoint_config(&self) -> &BreakpointConfig {
        &self.inner.config
    }

    /// The underlying command processor.
    pub fn processor(&self) -> &CommandProcessor {
        &self.inner.processor
    }

    /// Observable connection status.
    pub fn connection(&self) -> &Arc<ConnectionState> {
        self.inner.processor.connection()
    }
}

impl std::fmt::Debug for DebugSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugSession")
            .field("state", &self.state())
            .field("connection", &self.connection().status())
            .field("breakpoints", &self.inner.registry.len())
            .finish()
    }
}

fn notification_handler(session: Weak<SessionInner>) -> NotificationHandler {
    Box::new(move |method, params| {
        if method != STATE_NOTIFICATION {
            tracing::debug!(method = %method, "ignoring backend notification");
            return;
        }
        let Some(inner) = session.upgrade() else {
            return;
        };
        let state = match serde_json::from_value::<Option<DebuggerState>>(params) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "malformed state notification");
                return;
            }
        };
        let session = DebugSession { inner };
        tokio::spawn(async move {
            session.handle_state(state).await;
        });
    })
}

async fn install_when_connected(
    session: Weak<SessionInner>,
    mut status: watch::Receiver<ConnectionStatus>,
) {
    let connected = status
        .wait_for(|status| *status == ConnectionStatus::Connected)
        .await
        .is_ok();
    drop(status);
    if !connected {
        return;
    }

    let Some(inner) = session.upgrade() else {
        return;
    };
    let session = DebugSession { inner };
    let resume = session.inner.options.resume_on_connect;
    if let Some(install) = session.initialize_breakpoints(resume) {
        if let Err(e) = install.await {
            tracing::error!(error = %e, "breakpoint installation task failed");
        }
    }
}

/// Receives breakpoint add/remove events from the host.
#[derive(Clone, Debug)]
pub struct BreakpointHandler {
    session: DebugSession,
}

impl BreakpointHandler {
    /// The user added a breakpoint.
    ///
    /// Before initialization the breakpoint is only recorded; it is pushed
    /// with the rest once the backend is ready.
    pub fn register(&self, breakpoint: BreakpointHandle) -> Option<JoinHandle<()>> {
        let inner = &self.session.inner;
        let initialized = inner
            .config
            .add_then(breakpoint.clone(), || inner.gate.is_initialized())?;
        initialized.then(|| self.session.add_breakpoint(breakpoint))
    }

    /// The user removed a breakpoint.
    pub fn unregister(&self, breakpoint: &BreakpointHandle) -> Option<JoinHandle<()>> {
        self.session.inner.config.remove(breakpoint);
        self.session.remove_breakpoint(breakpoint)
    }
}
