mod console;
mod logging;

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::{info, warn};

use dlvx_config::{load_config, Config};
use dlvx_session::{
    BreakpointHandle, BreakpointHandler, ConnectionStatus, DebugSession, SessionOptions,
};

use crate::console::{ConsoleCommand, ConsoleHost};
use crate::logging::init_logging;

/// `DLVX_CONFIG_DIR` wins; otherwise `~/.config/dlvx`.
fn resolve_config_dir(dir_override: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    match dir_override {
        Some(dir) => Some(PathBuf::from(dir)),
        None => home.map(|home| home.join(".config").join("dlvx")),
    }
}

fn config_dir() -> Result<PathBuf> {
    resolve_config_dir(env::var_os("DLVX_CONFIG_DIR"), dirs::home_dir())
        .context("could not determine home directory; set DLVX_CONFIG_DIR")
}

fn session_options(config: &Config) -> SessionOptions {
    SessionOptions {
        request_timeout: config.backend.request_timeout(),
        connect_timeout: config.backend.connect_timeout(),
        stack_depth: config.session.stack_depth,
        resume_on_connect: config.session.resume_on_connect,
    }
}

/// Apply one console command. Returns `false` when the user asked to quit.
fn apply(session: &DebugSession, handler: &BreakpointHandler, command: ConsoleCommand) -> bool {
    match command {
        ConsoleCommand::Break { file, line } => {
            if session.breakpoint_config().find(&file, line).is_some() {
                println!("breakpoint already set at {}:{}", file.display(), line + 1);
            } else {
                handler.register(BreakpointHandle::new(file, line));
            }
        }
        ConsoleCommand::Clear { file, line } => {
            match session.breakpoint_config().find(&file, line) {
                Some(breakpoint) => {
                    handler.unregister(&breakpoint);
                    println!("breakpoint cleared at {}:{}", file.display(), line + 1);
                }
                None => println!("no breakpoint at {}:{}", file.display(), line + 1),
            }
        }
        ConsoleCommand::Next => {
            session.step_over();
        }
        ConsoleCommand::Step => {
            session.step_into();
        }
        ConsoleCommand::Continue => {
            session.resume();
        }
        ConsoleCommand::Halt => {
            session.pause();
        }
        ConsoleCommand::Thread(id) => {
            session.switch_thread(id);
        }
        ConsoleCommand::State => {
            session.refresh_state();
        }
        ConsoleCommand::Quit => return false,
    }
    true
}

async fn run(addr: Option<String>) -> Result<()> {
    let config_dir = config_dir()?;
    let project_dir = env::current_dir().ok();
    let config = load_config(&config_dir, project_dir.as_deref())
        .with_context(|| format!("failed to load config from {}", config_dir.display()))?;

    init_logging(&config.log).context("failed to set up logging")?;

    let addr = addr.unwrap_or_else(|| config.backend.address.clone());
    let ended = Arc::new(Notify::new());
    let session = DebugSession::new(
        Arc::new(ConsoleHost::new(ended.clone())),
        session_options(&config),
    );
    let handler = session.breakpoint_handler();

    // Not connected yet: registers the listener that installs breakpoints
    // and resumes once the connection is up.
    session.check_can_init_breakpoints();

    info!(addr = %addr, "connecting to debugger backend");
    session
        .connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;
    println!("connected to {addr}");

    let mut status = session.connection().subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read from stdin")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match line.parse::<ConsoleCommand>() {
                    Ok(command) => {
                        if !apply(&session, &handler, command) {
                            break;
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }
            _ = ended.notified() => break,
            changed = status.changed() => {
                let disconnected = changed.is_err()
                    || *status.borrow_and_update() == ConnectionStatus::Disconnected;
                if disconnected {
                    warn!("debugger backend went away");
                    println!("backend disconnected");
                    break;
                }
            }
        }
        if session.is_terminated() {
            break;
        }
    }

    session.stop();
    Ok(())
}

#[tokio::main]
async fn main() {
    let addr = env::args().nth(1);

    if let Err(e) = run(addr).await {
        eprintln!("dlvx: {:#}", e);
        std::process::exit(1);
    }
}
