//! Error types for the debugger bridge.

use crate::native::NativeError;
use std::fmt::Display;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DebuggerError {
    #[error("context is already marked with id {context_id}")]
    AlreadyMarked { context_id: i32 },

    #[error("no context ids left to assign")]
    ContextIdsExhausted,

    #[error("invalid script id: {0:?}")]
    InvalidScript(String),

    #[error("failed to set breakpoint at {script_id}:{line}:{column}")]
    SetFailed {
        script_id: i64,
        line: i64,
        column: i64,
        #[source]
        source: NativeError,
    },

    #[error("not paused")]
    NotPaused,

    #[error("debugger is not enabled")]
    NotEnabled,

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    Native(#[from] NativeError),
}

pub type Result<T> = std::result::Result<T, DebuggerError>;

/// Abort on an engine/bridge contract mismatch.
///
/// Used where the engine returned something a conforming engine never
/// returns. Continuing would leave the pause session in an undefined state.
#[track_caller]
pub fn contract_violation(what: &str, detail: impl Display) -> ! {
    log::error!("engine contract violation: {what}: {detail}");
    panic!("engine contract violation: {what}: {detail}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_failed_keeps_native_source() {
        let err = DebuggerError::SetFailed {
            script_id: 5,
            line: 10,
            column: 0,
            source: NativeError::InvalidArgument,
        };
        assert_eq!(err.to_string(), "failed to set breakpoint at 5:10:0");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("invalid argument"));
    }

    #[test]
    #[should_panic(expected = "engine contract violation")]
    fn test_contract_violation_panics() {
        contract_violation("reading breakpointId", "not an integer");
    }
}
