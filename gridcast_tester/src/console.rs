// Line-oriented tuning console on stdin. Each command publishes a new tuning
// snapshot through the pipeline's `ConfigHandle`; the frame loop picks it up
// on its next tick.

use anyhow::{Context, Result, anyhow, bail};
use gridcast::{ConfigHandle, Tuning};
use std::io::BufRead;
use tracing::{info, warn};

pub const HELP: &str = "commands: threshold <0..1> | level <0..255> | invert | step <n> | show";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Threshold(f32),
    Level(u8),
    Invert,
    Step(u32),
    Show,
}

/// Parses one console line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    let argument = words.next();
    if words.next().is_some() {
        bail!("too many arguments");
    }

    let command = match (name, argument) {
        ("threshold", Some(value)) => Command::Threshold(
            value
                .parse()
                .with_context(|| format!("`{value}` is not a number"))?,
        ),
        ("level", Some(value)) => Command::Level(
            value
                .parse()
                .with_context(|| format!("`{value}` is not a level in 0..=255"))?,
        ),
        ("step", Some(value)) => Command::Step(
            value
                .parse()
                .with_context(|| format!("`{value}` is not a step size"))?,
        ),
        ("invert", None) => Command::Invert,
        ("show", None) => Command::Show,
        ("threshold" | "level" | "step", None) => bail!("`{name}` needs a value"),
        ("invert" | "show", Some(_)) => bail!("`{name}` takes no value"),
        _ => return Err(anyhow!("unknown command `{name}`")),
    };
    Ok(Some(command))
}

pub fn apply(handle: &ConfigHandle, command: Command) -> Result<Tuning> {
    let tuning = match command {
        Command::Threshold(value) => handle.set_binarize_threshold(value)?,
        Command::Level(value) => handle.set_activation_threshold(value)?,
        Command::Invert => handle.toggle_invert()?,
        Command::Step(value) => handle.set_sample_step(value)?,
        Command::Show => handle.current(),
    };
    Ok(tuning)
}

/// Reads commands until stdin closes. Runs on its own thread: a blocking
/// stdin read must not hold up process exit.
pub fn run(handle: ConfigHandle) {
    info!("{HELP}");
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(%err, "console input closed");
                return;
            }
        };
        match parse(&line).and_then(|command| command.map(|c| apply(&handle, c)).transpose()) {
            Ok(Some(tuning)) => info!(?tuning, "tuning"),
            Ok(None) => {}
            Err(err) => warn!("{err:#}; {HELP}"),
        }
    }
}
