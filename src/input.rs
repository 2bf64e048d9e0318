//! Operator input.
//! Maps typed commands to session events, using the same letters as the original key bindings
//! (N/P/M/L/S/E/B, arrows to nudge). Runs on its own blocking thread and forwards everything to the
//! session actor; the board picker is a `dialoguer` selection over the catalog labels.

use crate::controller::{AppEvent, Command};
use anyhow::{bail, Context, Result};
use dialoguer::{Input, Select};
use tokio::sync::mpsc::UnboundedSender;

pub const HELP: &str = "[n] Next [p] Prev [m] Middle [l] Layer [s] Save [e] Export [a] Export all [b] Batch \
[drag X Y] [frame I] [left|right|up|down [STEP]] [goto [I]] [info] [q] Quit";

/// What one line of operator input asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum Request {
    Event(Command),
    Info,
    Help,
    PickBoard,
    Quit,
}

fn parse_arg<T: std::str::FromStr>(arg: Option<&str>, what: &str) -> Result<T> {
    let raw = arg.with_context(|| format!("Missing {what}"))?;
    raw.parse()
        .map_err(|_| anyhow::anyhow!("Invalid {what}: '{raw}'"))
}

pub fn parse_line(line: &str) -> Result<Request> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Ok(Request::Info);
    };
    let word = word.to_lowercase();

    let step = |arg: Option<&str>| -> Result<i32> {
        match arg {
            Some(_) => parse_arg(arg, "step"),
            None => Ok(1),
        }
    };
    let back = |arg: Option<&str>| -> Result<i32> {
        step(arg)?
            .checked_neg()
            .with_context(|| format!("Step out of range: '{}'", arg.unwrap_or_default()))
    };

    let request = match word.as_str() {
        "n" | "next" => Request::Event(Command::Next),
        "p" | "prev" => Request::Event(Command::Previous),
        "m" | "middle" => Request::Event(Command::ToggleMiddle),
        "l" | "layer" => Request::Event(Command::ToggleLayer),
        "s" | "save" => Request::Event(Command::Save),
        "e" | "export" => Request::Event(Command::ExportCurrent),
        "a" | "all" => Request::Event(Command::ExportAll),
        "b" | "batch" => Request::Event(Command::ExportBatch),
        "drag" => Request::Event(Command::Drag {
            x: parse_arg(parts.next(), "x")?,
            y: parse_arg(parts.next(), "y")?,
        }),
        "frame" | "f" => Request::Event(Command::SelectFrame(parse_arg(parts.next(), "frame index")?)),
        "left" => Request::Event(Command::Nudge { dx: back(parts.next())?, dy: 0 }),
        "right" => Request::Event(Command::Nudge { dx: step(parts.next())?, dy: 0 }),
        "up" => Request::Event(Command::Nudge { dx: 0, dy: back(parts.next())? }),
        "down" => Request::Event(Command::Nudge { dx: 0, dy: step(parts.next())? }),
        "goto" | "g" => match parts.next() {
            Some(index) => Request::Event(Command::SelectBoard(parse_arg(Some(index), "board index")?)),
            None => Request::PickBoard,
        },
        "info" | "i" => Request::Info,
        "help" | "h" | "?" => Request::Help,
        "q" | "quit" | "exit" => Request::Quit,
        other => bail!("Unknown command '{}' (type 'help')", other),
    };
    Ok(request)
}

/// Reads operator input until quit or until the session actor goes away.
pub fn run_input_loop(labels: Vec<String>, events: UnboundedSender<AppEvent>) {
    loop {
        let line = match Input::<String>::new()
            .with_prompt("fit")
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Input closed: {}", e);
                let _ = events.send(AppEvent::Quit);
                return;
            }
        };

        let event = match parse_line(&line) {
            Ok(Request::Event(command)) => AppEvent::Command(command),
            Ok(Request::Info) => AppEvent::Info,
            Ok(Request::Help) => {
                println!("{HELP}");
                continue;
            }
            Ok(Request::PickBoard) => {
                match Select::new()
                    .with_prompt("Board")
                    .items(&labels)
                    .default(0)
                    .interact_opt()
                {
                    Ok(Some(index)) => AppEvent::Command(Command::SelectBoard(index)),
                    Ok(None) => continue,
                    Err(e) => {
                        eprintln!("Board picker failed: {}", e);
                        continue;
                    }
                }
            }
            Ok(Request::Quit) => {
                let _ = events.send(AppEvent::Quit);
                return;
            }
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        if events.send(event).is_err() {
            return;
        }
    }
}
