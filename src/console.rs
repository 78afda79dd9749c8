//! Line-oriented console front-end: command parsing and event printing.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::Notify;

use dlvx_session::{BreakpointHandle, BreakpointPresentation, DebugHost, SuspendContext};

/// One line typed at the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `break FILE:LINE`
    Break { file: PathBuf, line: u32 },
    /// `clear FILE:LINE`
    Clear { file: PathBuf, line: u32 },
    /// `next`
    Next,
    /// `step`
    Step,
    /// `continue`
    Continue,
    /// `halt`
    Halt,
    /// `thread ID`
    Thread(i64),
    /// `state`
    State,
    /// `quit`
    Quit,
}

/// Why a console line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ParseCommandError(String);

impl FromStr for ConsoleCommand {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let verb = words
            .next()
            .ok_or_else(|| ParseCommandError("empty command".into()))?;
        let arg = words.next();
        if words.next().is_some() {
            return Err(ParseCommandError(format!("too many arguments to {verb}")));
        }

        let command = match (verb, arg) {
            ("break" | "b", Some(location)) => {
                let (file, line) = parse_location(location)?;
                ConsoleCommand::Break { file, line }
            }
            ("clear", Some(location)) => {
                let (file, line) = parse_location(location)?;
                ConsoleCommand::Clear { file, line }
            }
            ("thread", Some(id)) => ConsoleCommand::Thread(
                id.parse()
                    .map_err(|_| ParseCommandError(format!("invalid thread id: {id}")))?,
            ),
            ("next" | "n", None) => ConsoleCommand::Next,
            ("step" | "s", None) => ConsoleCommand::Step,
            ("continue" | "c", None) => ConsoleCommand::Continue,
            ("halt", None) => ConsoleCommand::Halt,
            ("state", None) => ConsoleCommand::State,
            ("quit" | "q", None) => ConsoleCommand::Quit,
            ("break" | "b" | "clear", None) => {
                return Err(ParseCommandError(format!("usage: {verb} FILE:LINE")))
            }
            ("thread", None) => return Err(ParseCommandError("usage: thread ID".into())),
            (_, Some(_)) if is_known(verb) => {
                return Err(ParseCommandError(format!("{verb} takes no arguments")))
            }
            _ => return Err(ParseCommandError(format!("unknown command: {verb}"))),
        };
        Ok(command)
    }
}

fn is_known(verb: &str) -> bool {
    matches!(
        verb,
        "next" | "n" | "step" | "s" | "continue" | "c" | "halt" | "state" | "quit" | "q"
    )
}

/// Split `FILE:LINE` (1-based) into a path and a 0-based line.
fn parse_location(location: &str) -> Result<(PathBuf, u32), ParseCommandError> {
    let (file, line) = location
        .rsplit_once(':')
        .ok_or_else(|| ParseCommandError(format!("expected FILE:LINE, got {location}")))?;
    if file.is_empty() {
        return Err(ParseCommandError(format!("missing file in {location}")));
    }
    let line: u32 = line
        .parse()
        .map_err(|_| ParseCommandError(format!("invalid line number: {line}")))?;
    if line == 0 {
        return Err(ParseCommandError("line numbers start at 1".into()));
    }
    Ok((PathBuf::from(file), line - 1))
}

/// Prints session events to stdout.
///
/// `ended` is notified when the session terminates so the input loop can
/// exit without waiting for another line.
#[derive(Debug)]
pub struct ConsoleHost {
    ended: Arc<Notify>,
}

impl ConsoleHost {
    pub fn new(ended: Arc<Notify>) -> Self {
        Self { ended }
    }

    fn print_location(context: &SuspendContext) {
        match context.active_frame() {
            Some(frame) => {
                let function = frame.function.as_deref().unwrap_or("??");
                println!("  at {} {}:{}", function, frame.file, frame.line);
            }
            None => println!("  (stack unavailable)"),
        }
    }
}

impl DebugHost for ConsoleHost {
    fn position_reached(&self, context: SuspendContext) {
        println!("stopped (thread {})", context.thread_id());
        Self::print_location(&context);
    }

    fn breakpoint_reached(
        &self,
        breakpoint: &BreakpointHandle,
        _log_expression: Option<&str>,
        context: SuspendContext,
    ) {
        println!(
            "breakpoint {}:{} hit (thread {})",
            breakpoint.path().display(),
            breakpoint.source_line(),
            context.thread_id()
        );
        Self::print_location(&context);
    }

    fn update_breakpoint_presentation(
        &self,
        breakpoint: &BreakpointHandle,
        presentation: BreakpointPresentation,
    ) {
        let location = format!(
            "{}:{}",
            breakpoint.path().display(),
            breakpoint.source_line()
        );
        match presentation {
            BreakpointPresentation::Verified => match breakpoint.backend_id() {
                Some(id) => println!("breakpoint {id} set at {location}"),
                None => println!("breakpoint set at {location}"),
            },
            BreakpointPresentation::Invalid { message } => println!(
                "breakpoint at {location} rejected: {}",
                message.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    fn stop(&self) {
        println!("debug session ended");
        self.ended.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_wakes_the_input_loop() {
        let ended = Arc::new(Notify::new());
        let host = ConsoleHost::new(ended.clone());

        // Notified before anyone waits; the permit is kept.
        host.stop();
        tokio::time::timeout(std::time::Duration::from_secs(1), ended.notified())
            .await
            .expect("stop should notify");
    }

    #[test]
    fn parse_break_converts_to_zero_based() {
        let cmd: ConsoleCommand = "break main.go:10".parse().unwrap();
        assert_eq!(
            cmd,
            ConsoleCommand::Break {
                file: PathBuf::from("main.go"),
                line: 9
            }
        );
    }

    #[test]
    fn parse_clear_with_absolute_path() {
        let cmd: ConsoleCommand = "clear /src/app/main.go:42".parse().unwrap();
        assert_eq!(
            cmd,
            ConsoleCommand::Clear {
                file: PathBuf::from("/src/app/main.go"),
                line: 41
            }
        );
    }

    #[test]
    fn parse_run_state_commands() {
        assert_eq!("next".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Next);
        assert_eq!("s".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Step);
        assert_eq!(
            "  continue  ".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Continue
        );
        assert_eq!("halt".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Halt);
        assert_eq!("state".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::State);
        assert_eq!("q".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Quit);
    }

    #[test]
    fn parse_thread_switch() {
        assert_eq!(
            "thread 3".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Thread(3)
        );
        assert!("thread x".parse::<ConsoleCommand>().is_err());
        assert!("thread".parse::<ConsoleCommand>().is_err());
    }

    #[test]
    fn parse_rejects_bad_locations() {
        assert!("break main.go".parse::<ConsoleCommand>().is_err());
        assert!("break main.go:0".parse::<ConsoleCommand>().is_err());
        assert!("break :10".parse::<ConsoleCommand>().is_err());
        assert!("break main.go:ten".parse::<ConsoleCommand>().is_err());
        assert!("break".parse::<ConsoleCommand>().is_err());
    }

    #[test]
    fn parse_rejects_unknown_and_extra_arguments() {
        let err = "stepout".parse::<ConsoleCommand>().unwrap_err();
        assert_eq!(err.to_string(), "unknown command: stepout");
        let err = "next 2".parse::<ConsoleCommand>().unwrap_err();
        assert_eq!(err.to_string(), "next takes no arguments");
        assert!("break a.go:1 b.go:2".parse::<ConsoleCommand>().is_err());
        assert!("".parse::<ConsoleCommand>().is_err());
    }
}
