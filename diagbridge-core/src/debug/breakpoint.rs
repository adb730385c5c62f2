//! Breakpoint management module.

use crate::error::{contract_violation, DebuggerError, Result};
use crate::native::{DiagEngine, NativeError};
use crate::props;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A live breakpoint. `protocol_id` is the decimal form of `native_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breakpoint {
    pub protocol_id: String,
    pub native_id: i64,
    pub script_id: i64,
    pub line: i64,
    pub column: i64,
}

/// Where the engine actually placed a requested breakpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointLocation {
    pub breakpoint_id: String,
    pub line: i64,
    pub column: i64,
}

/// Manager for script breakpoints.
pub struct BreakpointManager {
    breakpoints: BTreeMap<i64, Breakpoint>,
    activated: bool,
}

impl BreakpointManager {
    pub fn new(activated: bool) -> Self {
        Self { breakpoints: BTreeMap::new(), activated }
    }

    /// Set a breakpoint and return the engine-adjusted location.
    pub fn set_breakpoint(
        &mut self,
        engine: &dyn DiagEngine,
        script_id: &str,
        line: i64,
        column: i64,
    ) -> Result<BreakpointLocation> {
        let script: i64 = script_id
            .parse()
            .map_err(|_| DebuggerError::InvalidScript(script_id.to_string()))?;

        // The engine answers InvalidArgument for a script handle it does not know.
        let record = engine.set_breakpoint(script, line, column).map_err(|source| match source {
            NativeError::InvalidArgument => DebuggerError::InvalidScript(script_id.to_string()),
            source => DebuggerError::SetFailed { script_id: script, line, column, source },
        })?;

        let native_id = props::expect_int(&record, "breakpointId");
        let breakpoint = Breakpoint {
            protocol_id: native_id.to_string(),
            native_id,
            script_id: script,
            line: props::expect_int(&record, "line"),
            column: props::expect_int(&record, "column"),
        };
        log::debug!(
            "breakpoint {} at {}:{}:{} (requested {}:{})",
            breakpoint.protocol_id,
            script,
            breakpoint.line,
            breakpoint.column,
            line,
            column
        );

        let location = BreakpointLocation {
            breakpoint_id: breakpoint.protocol_id.clone(),
            line: breakpoint.line,
            column: breakpoint.column,
        };
        self.breakpoints.insert(native_id, breakpoint);
        Ok(location)
    }

    /// Remove a breakpoint. Unknown or already-removed ids are a no-op.
    pub fn remove_breakpoint(&mut self, engine: &dyn DiagEngine, protocol_id: &str) {
        let Ok(native_id) = protocol_id.parse::<i64>() else {
            log::debug!("ignoring removal of malformed breakpoint id {protocol_id:?}");
            return;
        };
        self.breakpoints.remove(&native_id);

        match engine.remove_breakpoint(native_id) {
            Ok(()) => log::debug!("removed breakpoint {native_id}"),
            Err(NativeError::NotFound | NativeError::InvalidArgument) => {
                log::debug!("breakpoint {native_id} already removed");
            }
            Err(e) => log::warn!("removing breakpoint {native_id} failed: {e}"),
        }
    }

    /// Remove every breakpoint the engine knows about.
    pub fn clear_breakpoints(&mut self, engine: &dyn DiagEngine) {
        let records = engine
            .breakpoints()
            .unwrap_or_else(|e| contract_violation("listing breakpoints", e));
        for record in props::expect_elements(&records, "listing breakpoints") {
            let native_id = props::expect_int(record, "breakpointId");
            if let Err(e) = engine.remove_breakpoint(native_id) {
                contract_violation("removing listed breakpoint", e);
            }
        }
        self.breakpoints.clear();
    }

    pub fn set_breakpoints_activated(&mut self, engine: &dyn DiagEngine, activated: bool) {
        match engine.set_breakpoints_active(activated) {
            Ok(()) => {}
            Err(NativeError::NotSupported) => {
                log::debug!("engine cannot toggle breakpoints, gating locally");
            }
            Err(e) => log::warn!("toggling native breakpoints failed: {e}"),
        }
        self.activated = activated;
    }

    pub fn activated(&self) -> bool {
        self.activated
    }

    pub fn get(&self, protocol_id: &str) -> Option<&Breakpoint> {
        let native_id = protocol_id.parse::<i64>().ok()?;
        self.breakpoints.get(&native_id)
    }

    /// Live breakpoints ordered by native id.
    pub fn list(&self) -> Vec<Breakpoint> {
        self.breakpoints.values().cloned().collect()
    }
}

impl Default for BreakpointManager {
    fn default() -> Self {
        Self::new(true)
    }
}
