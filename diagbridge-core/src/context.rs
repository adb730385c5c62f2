//! Context registry.
//!
//! Assigns composite identifiers to execution contexts. The identifiers are
//! stored in the context's own engine-visible debug-data slot as
//! `"<groupId>,<contextId>,<auxData>"`, so the registry keeps no table keyed
//! by context and never extends a context's lifetime.

use crate::error::{DebuggerError, Result};
use crate::native::{ContextHandle, DiagEngine};
use serde_json::Value;
use std::cell::Cell;

/// Description of a context about to be marked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    pub context: ContextHandle,
    pub group_id: i32,
    pub aux_data: String,
}

impl ContextInfo {
    pub fn new(context: ContextHandle, group_id: i32, aux_data: impl Into<String>) -> Self {
        Self { context, group_id, aux_data: aux_data.into() }
    }
}

/// The decoded debug-data marker of a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextMarker {
    pub group_id: i32,
    pub context_id: i32,
    pub aux_data: String,
}

impl ContextMarker {
    pub fn encode(&self) -> String {
        format!("{},{},{}", self.group_id, self.context_id, self.aux_data)
    }

    /// Decode a marker. Only the first two comma-delimited fields are
    /// structural; everything after the second comma is aux data. A numeric
    /// field that does not parse reads as 0.
    pub fn parse(data: &str) -> Option<Self> {
        let (group, rest) = data.split_once(',')?;
        let (context, aux) = rest.split_once(',')?;
        Some(Self {
            group_id: group.parse().unwrap_or(0),
            context_id: context.parse().unwrap_or(0),
            aux_data: aux.to_string(),
        })
    }

    fn from_slot(slot: Option<Value>) -> Option<Self> {
        match slot? {
            Value::String(data) if !data.is_empty() => Self::parse(&data),
            _ => None,
        }
    }
}

/// Hands out context ids and resolves them back from the engine slot.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    last_context_id: Cell<i32>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next context id to `info.context` and store its marker.
    pub fn mark_context(&self, engine: &dyn DiagEngine, info: &ContextInfo) -> Result<i32> {
        if let Some(existing) = ContextMarker::from_slot(engine.context_debug_data(info.context)) {
            return Err(DebuggerError::AlreadyMarked { context_id: existing.context_id });
        }

        let context_id = self
            .last_context_id
            .get()
            .checked_add(1)
            .ok_or(DebuggerError::ContextIdsExhausted)?;
        let marker = ContextMarker {
            group_id: info.group_id,
            context_id,
            aux_data: info.aux_data.clone(),
        };
        engine.set_context_debug_data(info.context, Value::String(marker.encode()))?;
        self.last_context_id.set(context_id);

        log::debug!(
            "marked context {:?} as {} (group {})",
            info.context,
            context_id,
            info.group_id
        );
        Ok(context_id)
    }

    pub fn marker(&self, engine: &dyn DiagEngine, context: ContextHandle) -> Option<ContextMarker> {
        ContextMarker::from_slot(engine.context_debug_data(context))
    }

    /// Context id of a marked context, 0 otherwise.
    pub fn resolve_context_id(&self, engine: &dyn DiagEngine, context: ContextHandle) -> i32 {
        self.marker(engine, context).map_or(0, |m| m.context_id)
    }

    /// Group id of a marked context, 0 otherwise.
    pub fn resolve_group_id(&self, engine: &dyn DiagEngine, context: ContextHandle) -> i32 {
        self.marker(engine, context).map_or(0, |m| m.group_id)
    }

    pub fn resolve_aux_data(&self, engine: &dyn DiagEngine, context: ContextHandle) -> Option<String> {
        self.marker(engine, context).map(|m| m.aux_data)
    }

    pub fn last_context_id(&self) -> i32 {
        self.last_context_id.get()
    }
}
