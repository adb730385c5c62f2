//! Listener-facing interface.

use crate::native::{ContextHandle, NativeEvent, StepType};
use crate::script::ScriptInfo;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Identity of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

/// How execution resumes after a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SkipDecision {
    /// Stay paused: enter the nested message loop.
    #[default]
    NoSkip,
    StepInto,
    StepOut,
    StepOverToFrame,
}

impl SkipDecision {
    /// Native step issued when resuming with this decision.
    pub fn step_type(self) -> Option<StepType> {
        match self {
            Self::NoSkip => None,
            Self::StepInto | Self::StepOverToFrame => Some(StepType::StepIn),
            Self::StepOut => Some(StepType::StepOut),
        }
    }
}

/// The context a pause happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PausedContext {
    pub context: ContextHandle,
    pub context_id: i32,
    pub group_id: i32,
    pub reason: NativeEvent,
}

/// A break that arrived while no listener was registered for its group.
#[derive(Debug, Clone, PartialEq)]
pub struct UnattendedBreak {
    pub group_id: i32,
    pub context_id: i32,
    pub reason: NativeEvent,
    pub breakpoint_ids: Vec<String>,
    pub is_uncaught: bool,
}

/// Receives the debugger's notifications for one context group.
pub trait DebuggerListener {
    fn on_script_parsed(&self, script: &ScriptInfo, success: bool);

    fn on_pause(
        &self,
        context: &PausedContext,
        exception: Option<&Value>,
        breakpoint_ids: &[String],
        is_uncaught: bool,
    ) -> SkipDecision;

    fn on_resume(&self);

    /// A break that happened before this listener registered. Only delivered
    /// with [`crate::config::UnattendedBreakPolicy::Queue`].
    fn on_missed_pause(&self, _pause: &UnattendedBreak) {}
}

struct Registration {
    id: ListenerId,
    listener: Rc<dyn DebuggerListener>,
}

/// Enabled listener per context group.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: Cell<u64>,
    by_group: RefCell<HashMap<i32, Registration>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `group_id`. Returns the new id and the id of
    /// the listener it replaced, if any.
    pub fn register(
        &self,
        group_id: i32,
        listener: Rc<dyn DebuggerListener>,
    ) -> (ListenerId, Option<ListenerId>) {
        let id = ListenerId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        let replaced = self
            .by_group
            .borrow_mut()
            .insert(group_id, Registration { id, listener })
            .map(|old| old.id);
        (id, replaced)
    }

    /// Remove a listener; returns the group it was registered for.
    pub fn unregister(&self, id: ListenerId) -> Option<i32> {
        let mut by_group = self.by_group.borrow_mut();
        let group_id = by_group.iter().find(|(_, r)| r.id == id).map(|(g, _)| *g)?;
        by_group.remove(&group_id);
        Some(group_id)
    }

    pub fn for_group(&self, group_id: i32) -> Option<Rc<dyn DebuggerListener>> {
        self.by_group.borrow().get(&group_id).map(|r| Rc::clone(&r.listener))
    }

    pub fn id_for_group(&self, group_id: i32) -> Option<ListenerId> {
        self.by_group.borrow().get(&group_id).map(|r| r.id)
    }

    pub fn len(&self) -> usize {
        self.by_group.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl DebuggerListener for Silent {
        fn on_script_parsed(&self, _script: &ScriptInfo, _success: bool) {}
        fn on_pause(&self, _: &PausedContext, _: Option<&Value>, _: &[String], _: bool) -> SkipDecision {
            SkipDecision::NoSkip
        }
        fn on_resume(&self) {}
    }

    #[test]
    fn test_skip_decision_step_mapping() {
        assert_eq!(SkipDecision::NoSkip.step_type(), None);
        assert_eq!(SkipDecision::StepInto.step_type(), Some(StepType::StepIn));
        assert_eq!(SkipDecision::StepOverToFrame.step_type(), Some(StepType::StepIn));
        assert_eq!(SkipDecision::StepOut.step_type(), Some(StepType::StepOut));
    }

    #[test]
    fn test_one_listener_per_group() {
        let registry = ListenerRegistry::new();
        let (first, replaced) = registry.register(1, Rc::new(Silent));
        assert_eq!(replaced, None);
        let (second, replaced) = registry.register(1, Rc::new(Silent));
        assert_eq!(replaced, Some(first));
        assert_ne!(first, second);
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.unregister(first), None);
        assert_eq!(registry.unregister(second), Some(1));
        assert!(registry.for_group(1).is_none());
        assert!(registry.is_empty());
    }
}
