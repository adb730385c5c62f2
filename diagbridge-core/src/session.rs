//! Event fan-out for frontends.
//!
//! [`BroadcastListener`] turns listener callbacks into [`InspectorEvent`]s on
//! a tokio broadcast channel, so frontends on other threads (or async tasks)
//! can follow the debuggee without touching the debugger itself.

use crate::listener::{DebuggerListener, PausedContext, SkipDecision, UnattendedBreak};
use crate::native::NativeEvent;
use crate::script::ScriptInfo;
use serde::Serialize;
use serde_json::Value;
use std::cell::Cell;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum InspectorEvent {
    ScriptParsed {
        script: ScriptInfo,
        success: bool,
    },
    #[serde(rename_all = "camelCase")]
    Paused {
        context_id: i32,
        group_id: i32,
        reason: NativeEvent,
        breakpoint_ids: Vec<String>,
        is_uncaught: bool,
        exception: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    Resumed {
        context_id: i32,
    },
    #[serde(rename_all = "camelCase")]
    MissedPause {
        context_id: i32,
        reason: NativeEvent,
        breakpoint_ids: Vec<String>,
    },
}

/// A [`DebuggerListener`] publishing every notification.
///
/// Pauses are answered with a fixed [`SkipDecision`] (default
/// [`SkipDecision::NoSkip`]), which may be changed between pauses.
pub struct BroadcastListener {
    event_tx: broadcast::Sender<InspectorEvent>,
    decision: Cell<SkipDecision>,
    paused_context_id: Cell<i32>,
}

impl BroadcastListener {
    pub fn new() -> Self {
        Self::new_with_decision(SkipDecision::NoSkip)
    }

    pub fn new_with_decision(decision: SkipDecision) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            event_tx,
            decision: Cell::new(decision),
            paused_context_id: Cell::new(0),
        }
    }

    /// Subscribe to inspector events.
    pub fn subscribe(&self) -> broadcast::Receiver<InspectorEvent> {
        self.event_tx.subscribe()
    }

    /// A sender that frontends can clone to subscribe from other threads.
    pub fn sender(&self) -> broadcast::Sender<InspectorEvent> {
        self.event_tx.clone()
    }

    pub fn set_decision(&self, decision: SkipDecision) {
        self.decision.set(decision);
    }

    fn publish(&self, event: InspectorEvent) {
        // No subscribers is not an error.
        if self.event_tx.send(event).is_err() {
            log::trace!("inspector event dropped, no subscribers");
        }
    }
}

impl Default for BroadcastListener {
    fn default() -> Self {
        Self::new()
    }
}

impl DebuggerListener for BroadcastListener {
    fn on_script_parsed(&self, script: &ScriptInfo, success: bool) {
        self.publish(InspectorEvent::ScriptParsed { script: script.clone(), success });
    }

    fn on_pause(
        &self,
        context: &PausedContext,
        exception: Option<&Value>,
        breakpoint_ids: &[String],
        is_uncaught: bool,
    ) -> SkipDecision {
        self.paused_context_id.set(context.context_id);
        self.publish(InspectorEvent::Paused {
            context_id: context.context_id,
            group_id: context.group_id,
            reason: context.reason,
            breakpoint_ids: breakpoint_ids.to_vec(),
            is_uncaught,
            exception: exception.cloned(),
        });
        self.decision.get()
    }

    fn on_resume(&self) {
        self.publish(InspectorEvent::Resumed { context_id: self.paused_context_id.get() });
    }

    fn on_missed_pause(&self, pause: &UnattendedBreak) {
        self.publish(InspectorEvent::MissedPause {
            context_id: pause.context_id,
            reason: pause.reason,
            breakpoint_ids: pause.breakpoint_ids.clone(),
        });
    }
}
