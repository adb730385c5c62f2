//! In-process simulated engine.
//!
//! [`SimulatedEngine`] implements [`DiagEngine`] over plain data and exposes
//! drivers (`execute_line`, `hit_debugger_statement`, `throw_exception`, ...)
//! that raise debug events the way a real engine would: synchronously, on
//! the calling thread, through the installed handler.

use crate::native::{
    break_on_exception, ContextHandle, DiagEngine, EventHandler, NativeError, NativeEvent,
    NativeResult, StepType,
};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct SimScript {
    url: String,
    breakable_lines: Vec<i64>,
    line_count: i64,
    source_length: i64,
}

#[derive(Debug, Clone, Copy)]
struct SimBreakpoint {
    script_id: i64,
    line: i64,
    column: i64,
}

#[derive(Debug, Clone)]
struct SimFrame {
    script_id: i64,
    function_name: String,
    line: i64,
}

#[derive(Default)]
pub struct SimulatedEngine {
    handler: RefCell<Option<EventHandler>>,
    scripts: RefCell<BTreeMap<i64, SimScript>>,
    breakpoints: RefCell<BTreeMap<i64, SimBreakpoint>>,
    next_breakpoint_id: Cell<i64>,
    contexts: RefCell<BTreeMap<ContextHandle, Option<Value>>>,
    next_context: Cell<u64>,
    current: Cell<Option<ContextHandle>>,
    break_on_exception: Cell<u32>,
    async_break_requested: Cell<bool>,
    pending_step: Cell<Option<StepType>>,
    last_step: Cell<Option<StepType>>,
    frames: RefCell<Vec<SimFrame>>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_event_handler(&self) -> bool {
        self.handler.borrow().is_some()
    }

    // --- Contexts ---

    pub fn create_context(&self) -> ContextHandle {
        let handle = ContextHandle(self.next_context.get() + 1);
        self.next_context.set(handle.0);
        self.contexts.borrow_mut().insert(handle, None);
        handle
    }

    pub fn enter_context(&self, context: ContextHandle) {
        self.current.set(Some(context));
    }

    pub fn leave_context(&self) {
        self.current.set(None);
    }

    // --- Scripts ---

    /// Register a script without raising a compile event.
    pub fn add_script(&self, script_id: i64, url: &str, breakable_lines: &[i64]) {
        let mut lines = breakable_lines.to_vec();
        lines.sort_unstable();
        lines.dedup();
        let line_count = lines.last().map_or(0, |l| l + 1);
        self.scripts.borrow_mut().insert(
            script_id,
            SimScript {
                url: url.to_string(),
                breakable_lines: lines,
                line_count,
                source_length: 0,
            },
        );
    }

    /// Compile `source`; every line is breakable.
    pub fn compile_script(&self, script_id: i64, url: &str, source: &str) {
        let line_count = source.lines().count().max(1) as i64;
        let script = SimScript {
            url: url.to_string(),
            breakable_lines: (0..line_count).collect(),
            line_count,
            source_length: source.len() as i64,
        };
        let payload = script_record(script_id, &script);
        self.scripts.borrow_mut().insert(script_id, script);
        self.fire(NativeEvent::SourceCompile.raw(), payload);
    }

    pub fn fail_compile(&self, script_id: i64, url: &str, message: &str) {
        self.fire(
            NativeEvent::CompileError.raw(),
            json!({
                "scriptId": script_id,
                "fileName": url,
                "error": { "message": message },
            }),
        );
    }

    // --- Execution ---

    /// Run one line. Raises a breakpoint event if one is set there, else a
    /// step event if a step is pending.
    pub fn execute_line(&self, script_id: i64, line: i64) {
        let hit = self
            .breakpoints
            .borrow()
            .iter()
            .find(|(_, bp)| bp.script_id == script_id && bp.line == line)
            .map(|(id, bp)| (*id, *bp));

        if let Some((id, bp)) = hit {
            self.pending_step.set(None);
            self.fire(
                NativeEvent::Breakpoint.raw(),
                json!({
                    "breakpointId": id,
                    "scriptId": script_id,
                    "line": bp.line,
                    "column": bp.column,
                }),
            );
        } else if self.pending_step.take().is_some() {
            self.fire(
                NativeEvent::StepComplete.raw(),
                json!({ "scriptId": script_id, "line": line, "column": 0 }),
            );
        }
    }

    pub fn hit_debugger_statement(&self) {
        self.fire(NativeEvent::DebuggerStatement.raw(), json!({}));
    }

    /// Throw `exception`, honoring the break-on-exception attributes.
    pub fn throw_exception(&self, exception: Value, uncaught: bool) {
        let breaks = match self.break_on_exception.get() {
            break_on_exception::FIRST_CHANCE => true,
            break_on_exception::UNCAUGHT => uncaught,
            _ => false,
        };
        if breaks {
            self.fire(
                NativeEvent::RuntimeException.raw(),
                json!({ "exception": exception, "uncaught": uncaught }),
            );
        }
    }

    /// A point where a requested async break is delivered.
    pub fn safe_point(&self) {
        if self.async_break_requested.replace(false) {
            self.fire(NativeEvent::AsyncBreak.raw(), json!({}));
        }
    }

    /// Deliver a raw event to the installed handler.
    pub fn fire(&self, raw_kind: i32, payload: Value) {
        let handler = self.handler.borrow().clone();
        match handler {
            Some(handler) => handler(NativeEvent::from_raw(raw_kind), &payload),
            None => log::trace!("no debug handler, dropping event {raw_kind}"),
        }
    }

    // --- Stack ---

    pub fn push_frame(&self, script_id: i64, function_name: &str, line: i64) {
        self.frames.borrow_mut().push(SimFrame {
            script_id,
            function_name: function_name.to_string(),
            line,
        });
    }

    pub fn pop_frame(&self) {
        self.frames.borrow_mut().pop();
    }

    // --- Inspection ---

    pub fn breakpoint_ids(&self) -> Vec<i64> {
        self.breakpoints.borrow().keys().copied().collect()
    }

    pub fn last_step_type(&self) -> Option<StepType> {
        self.last_step.get()
    }

    pub fn async_break_requested(&self) -> bool {
        self.async_break_requested.get()
    }
}

fn script_record(script_id: i64, script: &SimScript) -> Value {
    json!({
        "scriptId": script_id,
        "fileName": script.url,
        "lineCount": script.line_count,
        "sourceLength": script.source_length,
    })
}

impl DiagEngine for SimulatedEngine {
    fn set_debug_event_handler(&self, handler: Option<EventHandler>) -> NativeResult<()> {
        *self.handler.borrow_mut() = handler;
        Ok(())
    }

    fn scripts(&self) -> NativeResult<Value> {
        Ok(Value::Array(
            self.scripts
                .borrow()
                .iter()
                .map(|(id, script)| script_record(*id, script))
                .collect(),
        ))
    }

    fn set_breakpoint(&self, script_id: i64, line: i64, _column: i64) -> NativeResult<Value> {
        let scripts = self.scripts.borrow();
        let script = scripts.get(&script_id).ok_or(NativeError::InvalidArgument)?;
        let line = script
            .breakable_lines
            .iter()
            .copied()
            .find(|l| *l >= line)
            .ok_or_else(|| NativeError::Failed(format!("no breakable location at or after line {line}")))?;

        let id = self.next_breakpoint_id.get() + 1;
        self.next_breakpoint_id.set(id);
        self.breakpoints
            .borrow_mut()
            .insert(id, SimBreakpoint { script_id, line, column: 0 });
        Ok(json!({ "breakpointId": id, "scriptId": script_id, "line": line, "column": 0 }))
    }

    fn remove_breakpoint(&self, breakpoint_id: i64) -> NativeResult<()> {
        self.breakpoints
            .borrow_mut()
            .remove(&breakpoint_id)
            .map(|_| ())
            .ok_or(NativeError::NotFound)
    }

    fn breakpoints(&self) -> NativeResult<Value> {
        Ok(Value::Array(
            self.breakpoints
                .borrow()
                .iter()
                .map(|(id, bp)| {
                    json!({
                        "breakpointId": id,
                        "scriptId": bp.script_id,
                        "line": bp.line,
                        "column": bp.column,
                    })
                })
                .collect(),
        ))
    }

    fn break_on_exception(&self) -> NativeResult<u32> {
        Ok(self.break_on_exception.get())
    }

    fn set_break_on_exception(&self, attributes: u32) -> NativeResult<()> {
        self.break_on_exception.set(attributes);
        Ok(())
    }

    fn request_async_break(&self) -> NativeResult<()> {
        self.async_break_requested.set(true);
        Ok(())
    }

    fn set_step_type(&self, step: StepType) -> NativeResult<()> {
        self.last_step.set(Some(step));
        self.pending_step
            .set(if step == StepType::Continue { None } else { Some(step) });
        Ok(())
    }

    fn stack_trace(&self) -> NativeResult<Value> {
        if self.current.get().is_none() {
            return Err(NativeError::NotInContext);
        }
        Ok(Value::Array(
            self.frames
                .borrow()
                .iter()
                .rev()
                .enumerate()
                .map(|(index, frame)| {
                    json!({
                        "index": index,
                        "scriptId": frame.script_id,
                        "line": frame.line,
                        "column": 0,
                        "functionName": frame.function_name,
                    })
                })
                .collect(),
        ))
    }

    fn current_context(&self) -> Option<ContextHandle> {
        self.current.get()
    }

    fn context_debug_data(&self, context: ContextHandle) -> Option<Value> {
        self.contexts.borrow().get(&context).cloned().flatten()
    }

    fn set_context_debug_data(&self, context: ContextHandle, data: Value) -> NativeResult<()> {
        match self.contexts.borrow_mut().get_mut(&context) {
            Some(slot) => {
                *slot = Some(data);
                Ok(())
            }
            None => Err(NativeError::InvalidArgument),
        }
    }
}
