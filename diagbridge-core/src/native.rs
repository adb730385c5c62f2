//! Native engine seam.
//!
//! The diagnostics facility of the underlying script engine, described as a
//! trait. Engine-constructed objects (event payloads, breakpoint records,
//! script lists, stack traces) are property bags and are carried as
//! [`serde_json::Value`] trees.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::rc::Rc;
use thiserror::Error;

/// Result of a native diagnostics call.
pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Error codes reported by the native diagnostics API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("object not found")]
    NotFound,
    #[error("operation not supported by the engine")]
    NotSupported,
    #[error("no script context is active")]
    NotInContext,
    #[error("native call failed: {0}")]
    Failed(String),
}

/// Identity of a native execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextHandle(pub u64);

/// Debug event kinds delivered by the engine's global callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeEvent {
    SourceCompile,
    CompileError,
    Breakpoint,
    StepComplete,
    DebuggerStatement,
    AsyncBreak,
    RuntimeException,
    /// A kind added by a newer engine.
    Unknown(i32),
}

impl NativeEvent {
    /// Classify a raw engine event code.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => Self::SourceCompile,
            1 => Self::CompileError,
            2 => Self::Breakpoint,
            3 => Self::StepComplete,
            4 => Self::DebuggerStatement,
            5 => Self::AsyncBreak,
            6 => Self::RuntimeException,
            other => Self::Unknown(other),
        }
    }

    /// The raw engine code of this kind.
    pub fn raw(self) -> i32 {
        match self {
            Self::SourceCompile => 0,
            Self::CompileError => 1,
            Self::Breakpoint => 2,
            Self::StepComplete => 3,
            Self::DebuggerStatement => 4,
            Self::AsyncBreak => 5,
            Self::RuntimeException => 6,
            Self::Unknown(code) => code,
        }
    }
}

/// Native stepping modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepType {
    StepIn,
    StepOut,
    StepOver,
    Continue,
}

/// Native break-on-exception attribute values.
pub mod break_on_exception {
    pub const NONE: u32 = 0;
    pub const UNCAUGHT: u32 = 1;
    pub const FIRST_CHANCE: u32 = 2;
}

/// Callback installed into the engine. Receives every debug event together
/// with its engine-constructed payload.
pub type EventHandler = Rc<dyn Fn(NativeEvent, &Value)>;

/// The native diagnostics API of one engine instance.
///
/// Implementations must not deliver debug events synchronously from inside
/// these calls; events are delivered from script execution only.
pub trait DiagEngine {
    /// Install (`Some`) or uninstall (`None`) the global debug-event callback.
    fn set_debug_event_handler(&self, handler: Option<EventHandler>) -> NativeResult<()>;

    /// Array of loaded script records.
    fn scripts(&self) -> NativeResult<Value>;

    /// Set a breakpoint; returns the breakpoint record
    /// (`breakpointId`, `scriptId`, `line`, `column`) at the adjusted location.
    fn set_breakpoint(&self, script_id: i64, line: i64, column: i64) -> NativeResult<Value>;

    fn remove_breakpoint(&self, breakpoint_id: i64) -> NativeResult<()>;

    /// Array of all breakpoint records known to the engine.
    fn breakpoints(&self) -> NativeResult<Value>;

    /// Toggle all breakpoints natively. Backends without the capability keep
    /// the default.
    fn set_breakpoints_active(&self, _active: bool) -> NativeResult<()> {
        Err(NativeError::NotSupported)
    }

    /// Current break-on-exception attributes (see [`break_on_exception`]).
    fn break_on_exception(&self) -> NativeResult<u32>;

    fn set_break_on_exception(&self, attributes: u32) -> NativeResult<()>;

    /// Ask the engine to deliver an [`NativeEvent::AsyncBreak`] at its next
    /// safe point.
    fn request_async_break(&self) -> NativeResult<()>;

    fn set_step_type(&self, step: StepType) -> NativeResult<()>;

    /// Array of frame records of the current call stack, innermost first.
    fn stack_trace(&self) -> NativeResult<Value>;

    /// The context currently executing script, if any.
    fn current_context(&self) -> Option<ContextHandle>;

    /// Read the engine-visible debug-data slot of a context.
    fn context_debug_data(&self, context: ContextHandle) -> Option<Value>;

    fn set_context_debug_data(&self, context: ContextHandle, data: Value) -> NativeResult<()>;
}
