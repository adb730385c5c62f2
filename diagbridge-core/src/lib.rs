//! Diagbridge Core - debugger bridge over a native script-engine diagnostics API.
//!
//! This crate maps an inspector-style debugging model (contexts and context
//! groups, breakpoints, pause/resume/step, async task chains) onto the
//! callback-driven diagnostics facility of a script engine, described by the
//! [`DiagEngine`] trait.

pub mod async_tasks;
pub mod client;
pub mod config;
pub mod context;
pub mod debug;
pub mod error;
pub mod listener;
pub mod native;
pub mod props;
pub mod script;
pub mod session;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

// Re-export commonly used types
pub use async_tasks::{AsyncChainEntry, AsyncTaskId, AsyncTaskState, AsyncTaskTracker};
pub use client::{ChannelClient, InspectorClient, PauseCommand, PauseRemote, PauseReply};
pub use config::{DebuggerConfig, UnattendedBreakPolicy};
pub use context::{ContextInfo, ContextMarker};
pub use debug::{Breakpoint, BreakpointLocation, Debugger, PauseOnExceptionsState, PauseState};
pub use error::{DebuggerError, Result};
pub use listener::{DebuggerListener, ListenerId, PausedContext, SkipDecision, UnattendedBreak};
pub use native::{ContextHandle, DiagEngine, EventHandler, NativeError, NativeEvent, StepType};
pub use script::{CallFrame, ScriptInfo};
pub use session::{BroadcastListener, InspectorEvent};
#[cfg(any(test, feature = "sim"))]
pub use sim::SimulatedEngine;
