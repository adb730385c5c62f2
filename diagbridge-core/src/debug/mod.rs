//! Debug control module.
//!
//! [`Debugger`] is the protocol-facing surface over a [`DiagEngine`]:
//! enable/disable, context marking, breakpoints, stepping, pause/resume and
//! async task bookkeeping. Native events enter through the demultiplexer in
//! [`demux`] and pauses are driven by the state machine in [`pause`].

pub mod breakpoint;
pub mod demux;
pub mod pause;

pub use breakpoint::{Breakpoint, BreakpointLocation, BreakpointManager};
pub use pause::{PauseSession, PauseState};

use crate::async_tasks::{AsyncChainEntry, AsyncTaskId, AsyncTaskTracker};
use crate::client::InspectorClient;
use crate::config::DebuggerConfig;
use crate::context::{ContextInfo, ContextRegistry};
use crate::error::{contract_violation, DebuggerError, Result};
use crate::listener::{DebuggerListener, ListenerId, ListenerRegistry, UnattendedBreak};
use crate::native::{break_on_exception, ContextHandle, DiagEngine, EventHandler, NativeEvent, StepType};
use crate::props;
use crate::script::{CallFrame, ScriptInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseOnExceptionsState {
    DontPause,
    PauseOnUncaught,
    PauseOnAll,
}

impl PauseOnExceptionsState {
    pub fn from_native(attributes: u32) -> Option<Self> {
        match attributes {
            break_on_exception::NONE => Some(Self::DontPause),
            break_on_exception::UNCAUGHT => Some(Self::PauseOnUncaught),
            break_on_exception::FIRST_CHANCE => Some(Self::PauseOnAll),
            _ => None,
        }
    }

    pub fn to_native(self) -> u32 {
        match self {
            Self::DontPause => break_on_exception::NONE,
            Self::PauseOnUncaught => break_on_exception::UNCAUGHT,
            Self::PauseOnAll => break_on_exception::FIRST_CHANCE,
        }
    }
}

/// Debugger bridge for one engine instance.
///
/// Single-threaded: every native event is delivered on the thread running
/// script, and a pause blocks that thread inside
/// [`InspectorClient::run_message_loop_on_pause`] until the client resumes.
/// There is no timeout, so a stalled client stalls the debuggee; serving
/// paths must never share a thread with a debugger-enabled context.
pub struct Debugger {
    engine: Rc<dyn DiagEngine>,
    client: Rc<dyn InspectorClient>,
    config: DebuggerConfig,
    contexts: ContextRegistry,
    breakpoints: RefCell<BreakpointManager>,
    async_tasks: AsyncTaskTracker,
    listeners: ListenerRegistry,
    pause: PauseSession,
    enable_count: Cell<u32>,
    muted_script_events: Cell<u32>,
    unattended: RefCell<VecDeque<UnattendedBreak>>,
    this: Weak<Debugger>,
}

impl Debugger {
    pub fn new(
        engine: Rc<dyn DiagEngine>,
        client: Rc<dyn InspectorClient>,
        config: DebuggerConfig,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            engine,
            client,
            breakpoints: RefCell::new(BreakpointManager::new(config.breakpoints_activated)),
            config,
            contexts: ContextRegistry::new(),
            async_tasks: AsyncTaskTracker::new(),
            listeners: ListenerRegistry::new(),
            pause: PauseSession::new(),
            enable_count: Cell::new(0),
            muted_script_events: Cell::new(0),
            unattended: RefCell::new(VecDeque::new()),
            this: this.clone(),
        })
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    // --- Enable / disable ---

    /// Enable debugging. Nested calls are counted; the first one installs
    /// the native event callback.
    pub fn enable(&self) -> Result<()> {
        if self.enable_count.get() == 0 {
            let this = self.this.clone();
            let handler: EventHandler = Rc::new(move |event: NativeEvent, data: &Value| {
                if let Some(debugger) = this.upgrade() {
                    debugger.handle_native_event(event, data);
                }
            });
            self.engine.set_debug_event_handler(Some(handler))?;
            log::info!("debugger enabled");
        }
        self.enable_count.set(self.enable_count.get() + 1);
        Ok(())
    }

    /// Balance one [`enable`](Self::enable). The last call removes every
    /// breakpoint and uninstalls the callback.
    pub fn disable(&self) -> Result<()> {
        let count = self.enable_count.get();
        if count == 0 {
            return Err(DebuggerError::NotEnabled);
        }
        self.enable_count.set(count - 1);
        if count == 1 {
            self.breakpoints.borrow_mut().clear_breakpoints(&*self.engine);
            self.engine.set_debug_event_handler(None)?;
            log::info!("debugger disabled");
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enable_count.get() > 0
    }

    // --- Contexts ---

    /// Attach a fresh context id and the group/aux data to a context.
    pub fn mark_context(&self, info: &ContextInfo) -> Result<i32> {
        self.contexts.mark_context(&*self.engine, info)
    }

    pub fn resolve_context_id(&self, context: ContextHandle) -> i32 {
        self.contexts.resolve_context_id(&*self.engine, context)
    }

    pub fn resolve_group_id(&self, context: ContextHandle) -> i32 {
        self.contexts.resolve_group_id(&*self.engine, context)
    }

    pub fn resolve_aux_data(&self, context: ContextHandle) -> Option<String> {
        self.contexts.resolve_aux_data(&*self.engine, context)
    }

    // --- Listeners ---

    /// Make `listener` the enabled listener of `group_id`, replacing any
    /// previous one. Breaks queued for the group are handed over.
    pub fn register_listener(&self, group_id: i32, listener: Rc<dyn DebuggerListener>) -> ListenerId {
        let (id, replaced) = self.listeners.register(group_id, Rc::clone(&listener));
        if let Some(old) = replaced {
            log::warn!("listener {old:?} for group {group_id} replaced by {id:?}");
            self.async_tasks.set_async_call_stack_depth(old, 0);
        } else {
            log::info!("listener {id:?} registered for group {group_id}");
        }

        let missed: Vec<UnattendedBreak> = {
            let mut queue = self.unattended.borrow_mut();
            let (mine, rest): (VecDeque<_>, VecDeque<_>) =
                queue.drain(..).partition(|b| b.group_id == group_id);
            *queue = rest;
            mine.into_iter().collect()
        };
        for pause in &missed {
            listener.on_missed_pause(pause);
        }
        id
    }

    pub fn unregister_listener(&self, id: ListenerId) {
        if let Some(group_id) = self.listeners.unregister(id) {
            log::info!("listener {id:?} for group {group_id} unregistered");
            self.async_tasks.set_async_call_stack_depth(id, 0);
        }
    }

    // --- Breakpoints ---

    pub fn set_breakpoint(&self, script_id: &str, line: i64, column: i64) -> Result<BreakpointLocation> {
        self.breakpoints
            .borrow_mut()
            .set_breakpoint(&*self.engine, script_id, line, column)
    }

    pub fn remove_breakpoint(&self, breakpoint_id: &str) {
        self.breakpoints.borrow_mut().remove_breakpoint(&*self.engine, breakpoint_id);
    }

    pub fn set_breakpoints_activated(&self, activated: bool) {
        self.breakpoints
            .borrow_mut()
            .set_breakpoints_activated(&*self.engine, activated);
    }

    pub fn breakpoints_activated(&self) -> bool {
        self.breakpoints.borrow().activated()
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints.borrow().list()
    }

    // --- Engine queries ---

    pub fn compiled_scripts(&self) -> Result<Vec<ScriptInfo>> {
        let scripts = self.engine.scripts()?;
        Ok(props::expect_elements(&scripts, "listing scripts")
            .iter()
            .map(ScriptInfo::from_engine)
            .collect())
    }

    pub fn pause_on_exceptions_state(&self) -> Result<PauseOnExceptionsState> {
        let attributes = self.engine.break_on_exception()?;
        Ok(PauseOnExceptionsState::from_native(attributes)
            .unwrap_or_else(|| contract_violation("reading break-on-exception", attributes)))
    }

    pub fn set_pause_on_exceptions_state(&self, state: PauseOnExceptionsState) -> Result<()> {
        self.engine.set_break_on_exception(state.to_native())?;
        Ok(())
    }

    /// Frames of the current stack, innermost first. `limit == 0` uses the
    /// configured limit (itself 0 for all frames).
    pub fn current_call_frames(&self, limit: usize) -> Vec<CallFrame> {
        if self.engine.current_context().is_none() {
            return Vec::new();
        }
        let limit = if limit == 0 { self.config.call_frame_limit } else { limit };
        let trace = self
            .engine
            .stack_trace()
            .unwrap_or_else(|e| contract_violation("capturing stack trace", e));
        let frames = props::expect_elements(&trace, "capturing stack trace");
        let count = if limit > 0 { limit.min(frames.len()) } else { frames.len() };
        frames[..count].iter().map(CallFrame::from_engine).collect()
    }

    pub fn set_script_source(&self, _script_id: &str, _source: &str, _dry_run: bool) -> Result<()> {
        Err(DebuggerError::Unsupported("live script editing"))
    }

    pub fn internal_properties(&self, _value: &Value) -> Result<Value> {
        Err(DebuggerError::Unsupported("internal properties"))
    }

    // --- Pause control ---

    /// Arm (or cancel) a pause at the next statement. Ignored while paused.
    pub fn set_pause_on_next_statement(&self, pause: bool) {
        if self.pause.nested_loop_active() {
            return;
        }
        self.pause.arm_pause_on_next_statement(pause);
        if pause {
            if let Err(e) = self.engine.request_async_break() {
                contract_violation("requesting async break", e);
            }
        }
    }

    pub fn can_break_program(&self) -> bool {
        self.breakpoints_activated() && self.engine.current_context().is_some()
    }

    pub fn break_program(&self) -> Result<()> {
        Err(DebuggerError::Unsupported("synchronous break"))
    }

    /// Leave the current pause. A no-op when not paused.
    pub fn continue_program(&self) {
        if self.pause.state() != PauseState::Paused {
            log::debug!("continue requested in state {:?}", self.pause.state());
            return;
        }
        self.pause.transition(PauseState::Resuming);
        self.client.quit_message_loop_on_pause();
    }

    pub fn step_into(&self) -> Result<()> {
        self.step_and_continue(StepType::StepIn)
    }

    pub fn step_over(&self) -> Result<()> {
        self.step_and_continue(StepType::StepOver)
    }

    pub fn step_out(&self) -> Result<()> {
        self.step_and_continue(StepType::StepOut)
    }

    /// Cancel a pending step without leaving the pause.
    pub fn clear_stepping(&self) -> Result<()> {
        self.require_paused()?;
        self.issue_step(StepType::Continue);
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.pause.state() == PauseState::Paused
    }

    pub fn pause_state(&self) -> PauseState {
        self.pause.state()
    }

    pub fn paused_context(&self) -> Option<ContextHandle> {
        self.pause.paused_context()
    }

    fn require_paused(&self) -> Result<()> {
        if self.is_paused() {
            Ok(())
        } else {
            Err(DebuggerError::NotPaused)
        }
    }

    fn step_and_continue(&self, step: StepType) -> Result<()> {
        self.require_paused()?;
        self.issue_step(step);
        self.continue_program();
        Ok(())
    }

    fn issue_step(&self, step: StepType) {
        if let Err(e) = self.engine.set_step_type(step) {
            contract_violation("setting step type", e);
        }
    }

    // --- Async tasks ---

    pub fn set_async_call_stack_depth(&self, listener: ListenerId, depth: i32) {
        self.async_tasks.set_async_call_stack_depth(listener, depth);
    }

    pub fn max_async_call_stack_depth(&self) -> i32 {
        self.async_tasks.max_depth()
    }

    pub fn async_task_scheduled(&self, name: &str, task: AsyncTaskId, recurring: bool) {
        self.async_tasks
            .async_task_scheduled(self.current_context_id(), name, task, recurring);
    }

    pub fn async_task_started(&self, task: AsyncTaskId) {
        self.async_tasks.async_task_started(self.current_context_id(), task);
    }

    pub fn async_task_finished(&self, task: AsyncTaskId) {
        self.async_tasks.async_task_finished(task);
    }

    pub fn async_task_canceled(&self, task: AsyncTaskId) {
        self.async_tasks.async_task_canceled(task);
    }

    pub fn all_async_tasks_canceled(&self) {
        self.async_tasks.all_async_tasks_canceled();
    }

    pub fn current_async_call_chain(&self) -> Vec<AsyncChainEntry> {
        self.async_tasks.current_async_call_chain(self.current_context_id())
    }

    pub fn async_tasks(&self) -> &AsyncTaskTracker {
        &self.async_tasks
    }

    fn current_context_id(&self) -> i32 {
        self.engine
            .current_context()
            .map_or(0, |ctx| self.contexts.resolve_context_id(&*self.engine, ctx))
    }

    // --- Script parse events ---

    pub fn mute_script_parsed_events(&self) {
        self.muted_script_events.set(self.muted_script_events.get() + 1);
    }

    pub fn unmute_script_parsed_events(&self) {
        self.muted_script_events
            .set(self.muted_script_events.get().saturating_sub(1));
    }

    /// Breaks queued for groups that had no listener yet.
    pub fn unattended_breaks(&self) -> Vec<UnattendedBreak> {
        self.unattended.borrow().iter().cloned().collect()
    }
}
