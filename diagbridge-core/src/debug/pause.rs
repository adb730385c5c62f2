//! Pause session state.

use crate::native::ContextHandle;
use serde::Serialize;
use std::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PauseState {
    Running,
    /// A break event arrived; the listener has not answered yet.
    Pausing,
    /// The listener was notified; the nested loop may be running.
    Paused,
    /// Resumption was requested or the nested loop returned.
    Resuming,
}

/// The single pause session of a debugger.
///
/// `nested_loop_active` implies `paused_context.is_some()`.
#[derive(Debug)]
pub struct PauseSession {
    state: Cell<PauseState>,
    paused_context: Cell<Option<ContextHandle>>,
    nested_loop_active: Cell<bool>,
    pause_on_next_statement: Cell<bool>,
}

impl PauseSession {
    pub fn new() -> Self {
        Self {
            state: Cell::new(PauseState::Running),
            paused_context: Cell::new(None),
            nested_loop_active: Cell::new(false),
            pause_on_next_statement: Cell::new(false),
        }
    }

    pub fn state(&self) -> PauseState {
        self.state.get()
    }

    pub fn paused_context(&self) -> Option<ContextHandle> {
        self.paused_context.get()
    }

    pub fn nested_loop_active(&self) -> bool {
        self.nested_loop_active.get()
    }

    pub fn begin(&self, context: ContextHandle) {
        self.paused_context.set(Some(context));
        self.transition(PauseState::Pausing);
    }

    pub fn transition(&self, next: PauseState) {
        let prev = self.state.replace(next);
        if prev != next {
            log::debug!("pause state {prev:?} -> {next:?}");
        }
    }

    pub fn enter_nested_loop(&self) {
        debug_assert!(self.paused_context.get().is_some());
        self.nested_loop_active.set(true);
    }

    pub fn leave_nested_loop(&self) {
        self.nested_loop_active.set(false);
    }

    /// Back to running with no paused context.
    pub fn finish(&self) {
        self.nested_loop_active.set(false);
        self.paused_context.set(None);
        self.transition(PauseState::Running);
    }

    pub fn arm_pause_on_next_statement(&self, armed: bool) {
        self.pause_on_next_statement.set(armed);
    }

    pub fn pause_on_next_statement(&self) -> bool {
        self.pause_on_next_statement.get()
    }

    /// Consume the armed flag; true if it was set.
    pub fn take_pause_on_next_statement(&self) -> bool {
        self.pause_on_next_statement.replace(false)
    }
}

impl Default for PauseSession {
    fn default() -> Self {
        Self::new()
    }
}
