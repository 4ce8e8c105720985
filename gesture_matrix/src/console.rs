//! Line-oriented keyboard control alongside the gesture loop.
//!
//! ```text
//!   +   volume up
//!   -   volume down
//!   p   pause / resume
//!   q   quit
//! ```
//!
//! End of input counts as `q`.

use std::io::{self, BufRead};
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::control::ControlState;
use crate::signal::StopSignal;

pub const CONSOLE_VOLUME_STEP: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    VolumeUp,
    VolumeDown,
    TogglePause,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "+" => Ok(ConsoleCommand::VolumeUp),
            "-" => Ok(ConsoleCommand::VolumeDown),
            "p" => Ok(ConsoleCommand::TogglePause),
            "q" => Ok(ConsoleCommand::Quit),
            other => Err(format!("unknown command {:?}", other)),
        }
    }
}

/// Apply one command.  Returns false when the console should stop reading.
pub fn apply_command(cmd: ConsoleCommand, controls: &ControlState, stop: &StopSignal) -> bool {
    match cmd {
        ConsoleCommand::VolumeUp => {
            let v = controls.adjust_volume(CONSOLE_VOLUME_STEP);
            println!("Volume increased to {:.0}%", v * 100.0);
        }
        ConsoleCommand::VolumeDown => {
            let v = controls.adjust_volume(-CONSOLE_VOLUME_STEP);
            println!("Volume decreased to {:.0}%", v * 100.0);
        }
        ConsoleCommand::TogglePause => {
            let paused = controls.toggle_pause();
            println!("{}", if paused { "Paused" } else { "Resumed" });
        }
        ConsoleCommand::Quit => {
            info!("quit requested from console");
            stop.request_stop();
            return false;
        }
    }
    true
}

/// Read commands from `input` until `q`, end of input or a stop request.
pub fn run_console<R: BufRead>(input: R, controls: &ControlState, stop: &StopSignal) {
    for line in input.lines() {
        if stop.is_stopped() {
            return;
        }
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!("console input failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ConsoleCommand>() {
            Ok(cmd) => {
                if !apply_command(cmd, controls, stop) {
                    return;
                }
            }
            Err(e) => println!("{} (use + - p q)", e),
        }
    }
    stop.request_stop();
}

/// Start the console on its own thread, reading stdin.
///
/// The thread blocks in `read_line`, so the scene never joins it.
pub fn spawn_console(controls: Arc<ControlState>, stop: StopSignal) -> io::Result<JoinHandle<()>> {
    println!("Controls: + (volume up), - (volume down), p (pause/resume), q (quit)");
    thread::Builder::new()
        .name("console".into())
        .spawn(move || run_console(io::stdin().lock(), &controls, &stop))
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
