//! Operator commands read from stdin while the bot runs.

use std::io::BufRead;
use std::sync::{Arc, LazyLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Result, bail};
use regex::Regex;
use tracing::{info, warn};

use crate::control::{PauseControl, StatusBoard};

static TIMED_PAUSE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^t(\d+)$").unwrap());

pub const HELP: &str = "commands: p = pause, r = resume, s = status, tNN = pause NN seconds, q = save and quit, h = help";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Pause,
    Resume,
    Status,
    PauseFor(Duration),
    Quit,
    Help,
}

/// Parse one trimmed, case-insensitive console line.
pub fn parse_command(line: &str) -> Result<ConsoleCommand> {
    let line = line.trim().to_lowercase();
    let command = match line.as_str() {
        "p" => ConsoleCommand::Pause,
        "r" => ConsoleCommand::Resume,
        "s" => ConsoleCommand::Status,
        "q" => ConsoleCommand::Quit,
        "h" | "?" => ConsoleCommand::Help,
        other => {
            let Some(caps) = TIMED_PAUSE_RE.captures(other) else {
                bail!("unknown command {other:?} ({HELP})");
            };
            let secs: u64 = caps[1].parse()?;
            if secs == 0 {
                bail!("timed pause needs at least one second");
            }
            ConsoleCommand::PauseFor(Duration::from_secs(secs))
        }
    };
    Ok(command)
}

/// Apply `command` and return the text to show the operator.
pub fn apply(command: ConsoleCommand, control: &PauseControl, board: &StatusBoard) -> String {
    match command {
        ConsoleCommand::Pause => {
            control.pause();
            info!("paused by operator");
            "paused, type 'r' to resume".to_string()
        }
        ConsoleCommand::Resume => {
            control.resume();
            info!("resumed by operator");
            "resumed".to_string()
        }
        ConsoleCommand::PauseFor(duration) => {
            control.pause_for(duration);
            info!(secs = duration.as_secs(), "timed pause by operator");
            format!("paused for {}s", duration.as_secs())
        }
        ConsoleCommand::Status => {
            let snapshots = board.snapshots();
            if snapshots.is_empty() {
                return "no instance has reported yet".to_string();
            }
            let mut lines: Vec<String> = snapshots.iter().map(|s| s.summary()).collect();
            lines.push(format!("paused: {}", control.is_paused()));
            lines.join("\n")
        }
        ConsoleCommand::Quit => {
            control.request_shutdown();
            info!("shutdown requested by operator");
            "saving state and stopping".to_string()
        }
        ConsoleCommand::Help => HELP.to_string(),
    }
}

/// Read commands from stdin until EOF or shutdown.
pub fn spawn_console(control: Arc<PauseControl>, board: Arc<StatusBoard>) -> JoinHandle<()> {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!(err = %err, "console read failed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Ok(command) => println!("{}", apply(command, &control, &board)),
                Err(err) => println!("{err:#}"),
            }
            if control.is_shutdown() {
                break;
            }
        }
    })
}
