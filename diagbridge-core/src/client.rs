//! Embedder hooks for the nested pause loop.

use crate::debug::breakpoint::BreakpointLocation;
use crate::debug::{Debugger, PauseOnExceptionsState};
use crate::script::CallFrame;
use crossbeam_channel::{Receiver, Sender};
use std::cell::Cell;

/// Owner of the host event loop.
///
/// `run_message_loop_on_pause` is entered on the thread that delivered the
/// break, with the paused script's native stack still below it. It must keep
/// processing host work (and may call back into `debugger`) until
/// `quit_message_loop_on_pause` is signalled.
pub trait InspectorClient {
    fn run_message_loop_on_pause(&self, debugger: &Debugger, group_id: i32);

    fn quit_message_loop_on_pause(&self);
}

/// Commands accepted by [`ChannelClient`] while paused.
#[derive(Debug, Clone)]
pub enum PauseCommand {
    Resume,
    StepInto,
    StepOver,
    StepOut,
    SetBreakpoint { script_id: String, line: i64, column: i64 },
    RemoveBreakpoint(String),
    SetPauseOnExceptions(PauseOnExceptionsState),
    CallFrames,
}

/// Results sent back for commands that produce one.
#[derive(Debug, Clone)]
pub enum PauseReply {
    BreakpointSet(BreakpointLocation),
    CallFrames(Vec<CallFrame>),
    Error(String),
}

/// The remote end of a [`ChannelClient`]; may live on any thread.
#[derive(Debug, Clone)]
pub struct PauseRemote {
    command_tx: Sender<PauseCommand>,
    reply_rx: Receiver<PauseReply>,
}

impl PauseRemote {
    pub fn send(&self, cmd: PauseCommand) -> anyhow::Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|_| anyhow::anyhow!("pause loop is gone"))
    }

    pub fn replies(&self) -> &Receiver<PauseReply> {
        &self.reply_rx
    }
}

/// An [`InspectorClient`] whose nested loop is fed from a channel.
pub struct ChannelClient {
    command_rx: Receiver<PauseCommand>,
    reply_tx: Sender<PauseReply>,
    quit: Cell<bool>,
    loops_run: Cell<usize>,
}

impl ChannelClient {
    pub fn new() -> (Self, PauseRemote) {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (reply_tx, reply_rx) = crossbeam_channel::unbounded();
        (
            Self {
                command_rx,
                reply_tx,
                quit: Cell::new(false),
                loops_run: Cell::new(0),
            },
            PauseRemote { command_tx, reply_rx },
        )
    }

    /// Number of nested loops entered so far.
    pub fn loops_run(&self) -> usize {
        self.loops_run.get()
    }

    fn apply(&self, debugger: &Debugger, cmd: PauseCommand) {
        let reply = match cmd {
            PauseCommand::Resume => {
                debugger.continue_program();
                None
            }
            PauseCommand::StepInto => debugger.step_into().err().map(|e| PauseReply::Error(e.to_string())),
            PauseCommand::StepOver => debugger.step_over().err().map(|e| PauseReply::Error(e.to_string())),
            PauseCommand::StepOut => debugger.step_out().err().map(|e| PauseReply::Error(e.to_string())),
            PauseCommand::SetBreakpoint { script_id, line, column } => {
                Some(match debugger.set_breakpoint(&script_id, line, column) {
                    Ok(location) => PauseReply::BreakpointSet(location),
                    Err(e) => PauseReply::Error(e.to_string()),
                })
            }
            PauseCommand::RemoveBreakpoint(id) => {
                debugger.remove_breakpoint(&id);
                None
            }
            PauseCommand::SetPauseOnExceptions(state) => debugger
                .set_pause_on_exceptions_state(state)
                .err()
                .map(|e| PauseReply::Error(e.to_string())),
            PauseCommand::CallFrames => Some(PauseReply::CallFrames(debugger.current_call_frames(0))),
        };
        if let Some(reply) = reply {
            if let Err(e) = self.reply_tx.send(reply) {
                log::trace!("pause reply dropped, remote gone: {:?}", e.into_inner());
            }
        }
    }
}

impl InspectorClient for ChannelClient {
    fn run_message_loop_on_pause(&self, debugger: &Debugger, group_id: i32) {
        self.quit.set(false);
        self.loops_run.set(self.loops_run.get() + 1);
        log::debug!("entering pause loop for group {group_id}");

        while !self.quit.get() {
            match self.command_rx.recv() {
                Ok(cmd) => self.apply(debugger, cmd),
                Err(_) => {
                    log::warn!("pause remote disconnected, resuming");
                    debugger.continue_program();
                    break;
                }
            }
        }
        log::debug!("leaving pause loop for group {group_id}");
    }

    fn quit_message_loop_on_pause(&self) {
        self.quit.set(true);
    }
}
