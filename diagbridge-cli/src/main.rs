//! `diagbridge` - drive the debugger bridge against the simulated engine.

mod scenario;

use anyhow::{anyhow, bail, Context as _, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use diagbridge_core::{
    BroadcastListener, ChannelClient, ContextInfo, Debugger, DebuggerConfig, InspectorEvent,
    PauseCommand, PauseOnExceptionsState, PauseRemote, PauseReply, SimulatedEngine,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::rc::Rc;
use std::thread;
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario file (JSON list of steps); a built-in demo runs otherwise
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Debugger configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Context group of the debuggee context
    #[arg(short, long, default_value_t = 1)]
    group: i32,

    /// Aux data attached to the debuggee context
    #[arg(long, default_value = "")]
    aux: String,

    /// Resume automatically on every pause instead of reading stdin
    #[arg(long)]
    no_interactive: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<DebuggerConfig> {
    let Some(path) = path else {
        return Ok(DebuggerConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

/// Parse one stdin line. Empty lines yield `None`.
fn parse_command(line: &str) -> Result<Option<PauseCommand>> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();
    let command = match (head, args.as_slice()) {
        ("c" | "continue", []) => PauseCommand::Resume,
        ("s" | "step", []) => PauseCommand::StepInto,
        ("n" | "next", []) => PauseCommand::StepOver,
        ("o" | "out", []) => PauseCommand::StepOut,
        ("bt", []) => PauseCommand::CallFrames,
        ("b" | "break", [script, line, rest @ ..]) if rest.len() <= 1 => PauseCommand::SetBreakpoint {
            script_id: (*script).to_string(),
            line: line.parse().with_context(|| format!("bad line {line:?}"))?,
            column: match rest {
                [column] => column.parse().with_context(|| format!("bad column {column:?}"))?,
                _ => 0,
            },
        },
        ("d" | "delete", [id]) => PauseCommand::RemoveBreakpoint((*id).to_string()),
        ("pe", [state]) => PauseCommand::SetPauseOnExceptions(match *state {
            "none" => PauseOnExceptionsState::DontPause,
            "uncaught" => PauseOnExceptionsState::PauseOnUncaught,
            "all" => PauseOnExceptionsState::PauseOnAll,
            other => bail!("unknown exception state {other:?}"),
        }),
        _ => return Err(anyhow!("unknown command {line:?}")),
    };
    Ok(Some(command))
}

fn spawn_stdin_reader(remote: PauseRemote) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Ok(Some(command)) => {
                    if remote.send(command).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => eprintln!("{e}"),
            }
        }
    });
}

/// Answer a pause with `Resume`. Stops auto-resuming once the pause loop is gone.
fn resume_on_pause(event: &InspectorEvent, auto_resume: &mut Option<PauseRemote>) {
    let (InspectorEvent::Paused { .. }, Some(remote)) = (event, auto_resume.as_ref()) else {
        return;
    };
    if let Err(e) = remote.send(PauseCommand::Resume) {
        log::warn!("auto-resume disabled: {e}");
        *auto_resume = None;
    }
}

fn spawn_event_printer(
    mut events: broadcast::Receiver<InspectorEvent>,
    mut auto_resume: Option<PauseRemote>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        match events.blocking_recv() {
            Ok(event) => {
                match serde_json::to_string(&event) {
                    Ok(json) => println!("{json}"),
                    Err(e) => log::warn!("cannot print event: {e}"),
                }
                resume_on_pause(&event, &mut auto_resume);
            }
            Err(RecvError::Lagged(skipped)) => log::warn!("skipped {skipped} events"),
            Err(RecvError::Closed) => break,
        }
    })
}

/// Holds only the reply side, so stdin EOF still disconnects the pause loop.
fn spawn_reply_printer(replies: Receiver<PauseReply>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(reply) = replies.recv() {
            match reply {
                PauseReply::BreakpointSet(location) => println!(
                    "breakpoint {} at line {} column {}",
                    location.breakpoint_id, location.line, location.column
                ),
                PauseReply::CallFrames(frames) => {
                    for frame in frames {
                        println!(
                            "#{} {} script {} line {}",
                            frame.index,
                            frame.function_name.as_deref().unwrap_or("<anonymous>"),
                            frame.script_id,
                            frame.line
                        );
                    }
                }
                PauseReply::Error(message) => eprintln!("error: {message}"),
            }
        }
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    let steps = match &cli.scenario {
        Some(path) => scenario::load(path)?,
        None => scenario::default_steps(),
    };

    let engine = Rc::new(SimulatedEngine::new());
    let (client, remote) = ChannelClient::new();
    let debugger = Debugger::new(engine.clone(), Rc::new(client), config);
    debugger.enable()?;

    let context = engine.create_context();
    let context_id = debugger.mark_context(&ContextInfo::new(context, cli.group, cli.aux.clone()))?;
    engine.enter_context(context);
    log::info!("debuggee context {context_id} in group {}", cli.group);

    let listener = Rc::new(BroadcastListener::new());
    let printer = spawn_event_printer(
        listener.subscribe(),
        cli.no_interactive.then(|| remote.clone()),
    );
    let replies = spawn_reply_printer(remote.replies().clone());
    if !cli.no_interactive {
        eprintln!("commands: c s n o bt | b <script> <line> [col] | d <id> | pe none|uncaught|all");
        spawn_stdin_reader(remote);
    }
    debugger.register_listener(cli.group, listener.clone());

    let outcome = scenario::run(&engine, &debugger, &steps);

    debugger.disable()?;
    drop(listener);
    drop(debugger);
    printer.join().map_err(|_| anyhow!("event printer panicked"))?;
    replies.join().map_err(|_| anyhow!("reply printer panicked"))?;
    outcome
}
