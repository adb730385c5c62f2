//! Async task tracker.
//!
//! Keeps the per-listener async stack depth requests and, while any listener
//! wants async stacks, the scheduled/started/finished/canceled transitions of
//! async tasks so the current async call chain can be rebuilt.

use crate::listener::ListenerId;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Opaque identity of an async task, owned by the external scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AsyncTaskId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AsyncTaskState {
    Scheduled,
    Started,
    Finished,
    Canceled,
}

/// One link of a reconstructed async call chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsyncChainEntry {
    pub task: AsyncTaskId,
    pub name: String,
}

#[derive(Debug, Clone)]
struct TrackedTask {
    name: String,
    recurring: bool,
    state: AsyncTaskState,
    /// Chain of the task running in the scheduling context, captured at
    /// schedule time. Survives the parents finishing.
    parent_chain: Rc<[AsyncChainEntry]>,
    /// Context whose started stack holds this task while it runs.
    running_in: Option<i32>,
}

#[derive(Debug, Default)]
pub struct AsyncTaskTracker {
    depths: RefCell<HashMap<ListenerId, i32>>,
    max_depth: Cell<i32>,
    tasks: RefCell<HashMap<AsyncTaskId, TrackedTask>>,
    started: RefCell<HashMap<i32, Vec<AsyncTaskId>>>,
}

impl AsyncTaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective depth: the largest request across listeners, 0 if none.
    pub fn max_depth(&self) -> i32 {
        self.max_depth.get()
    }

    /// Record `listener`'s requested depth (`<= 0` withdraws it).
    ///
    /// Returns `true` when the effective depth dropped to zero and all
    /// tracked tasks were discarded.
    pub fn set_async_call_stack_depth(&self, listener: ListenerId, depth: i32) -> bool {
        let max = {
            let mut depths = self.depths.borrow_mut();
            if depth <= 0 {
                depths.remove(&listener);
            } else {
                depths.insert(listener, depth);
            }
            depths.values().copied().max().unwrap_or(0)
        };

        if self.max_depth.get() == max {
            return false;
        }
        log::debug!("async call stack depth {} -> {}", self.max_depth.get(), max);
        self.max_depth.set(max);

        if max == 0 {
            self.all_async_tasks_canceled();
            return true;
        }
        false
    }

    pub fn async_task_scheduled(&self, context_id: i32, name: &str, task: AsyncTaskId, recurring: bool) {
        if self.max_depth.get() == 0 {
            return;
        }
        let parent_chain: Rc<[AsyncChainEntry]> = self.current_async_call_chain(context_id).into();
        log::trace!("async task {task:?} {name:?} scheduled (recurring: {recurring})");
        self.tasks.borrow_mut().insert(
            task,
            TrackedTask {
                name: name.to_string(),
                recurring,
                state: AsyncTaskState::Scheduled,
                parent_chain,
                running_in: None,
            },
        );
    }

    pub fn async_task_started(&self, context_id: i32, task: AsyncTaskId) {
        if self.max_depth.get() == 0 {
            return;
        }
        let mut tasks = self.tasks.borrow_mut();
        let Some(tracked) = tasks.get_mut(&task) else {
            log::trace!("start of untracked async task {task:?}");
            return;
        };
        if tracked.state != AsyncTaskState::Scheduled {
            log::trace!("async task {task:?} started while {:?}", tracked.state);
            return;
        }
        tracked.state = AsyncTaskState::Started;
        tracked.running_in = Some(context_id);
        self.started.borrow_mut().entry(context_id).or_default().push(task);
    }

    pub fn async_task_finished(&self, task: AsyncTaskId) {
        if self.max_depth.get() == 0 {
            return;
        }
        let mut tasks = self.tasks.borrow_mut();
        let Some(tracked) = tasks.get_mut(&task) else {
            log::trace!("finish of untracked async task {task:?}");
            return;
        };
        if tracked.state != AsyncTaskState::Started {
            return;
        }
        if let Some(context_id) = tracked.running_in.take() {
            self.pop_started(context_id, task);
        }
        if tracked.recurring {
            tracked.state = AsyncTaskState::Scheduled;
        } else {
            tracked.state = AsyncTaskState::Finished;
            tasks.remove(&task);
        }
    }

    pub fn async_task_canceled(&self, task: AsyncTaskId) {
        if self.max_depth.get() == 0 {
            return;
        }
        if let Some(mut tracked) = self.tasks.borrow_mut().remove(&task) {
            tracked.state = AsyncTaskState::Canceled;
            if let Some(context_id) = tracked.running_in {
                self.pop_started(context_id, task);
            }
            log::trace!("async task {task:?} {:?} canceled", tracked.name);
        }
    }

    /// Drop every tracked task and started stack.
    pub fn all_async_tasks_canceled(&self) {
        let count = {
            let mut tasks = self.tasks.borrow_mut();
            let count = tasks.len();
            tasks.clear();
            count
        };
        self.started.borrow_mut().clear();
        log::debug!("discarded {count} tracked async tasks");
    }

    pub fn task_state(&self, task: AsyncTaskId) -> Option<AsyncTaskState> {
        self.tasks.borrow().get(&task).map(|t| t.state)
    }

    pub fn tracked_task_count(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// The innermost running task of `context_id` followed by the tasks that
    /// scheduled it, at most `max_depth` entries.
    pub fn current_async_call_chain(&self, context_id: i32) -> Vec<AsyncChainEntry> {
        let depth = usize::try_from(self.max_depth.get()).unwrap_or(0);
        if depth == 0 {
            return Vec::new();
        }
        let Some(task) = self.started.borrow().get(&context_id).and_then(|s| s.last().copied()) else {
            return Vec::new();
        };
        let tasks = self.tasks.borrow();
        let Some(tracked) = tasks.get(&task) else {
            return Vec::new();
        };
        let mut chain = Vec::with_capacity(depth.min(tracked.parent_chain.len() + 1));
        chain.push(AsyncChainEntry { task, name: tracked.name.clone() });
        chain.extend(tracked.parent_chain.iter().take(depth - 1).cloned());
        chain
    }

    fn pop_started(&self, context_id: i32, task: AsyncTaskId) {
        let mut started = self.started.borrow_mut();
        if let Some(stack) = started.get_mut(&context_id) {
            if stack.last() == Some(&task) {
                stack.pop();
            } else {
                log::debug!("async task {task:?} finished out of order");
                stack.retain(|t| *t != task);
            }
            if stack.is_empty() {
                started.remove(&context_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTX: i32 = 1;

    fn tracker_with_depth(depth: i32) -> AsyncTaskTracker {
        let tracker = AsyncTaskTracker::new();
        tracker.set_async_call_stack_depth(ListenerId(1), depth);
        tracker
    }

    #[test]
    fn test_effective_depth_is_maximum() {
        let tracker = AsyncTaskTracker::new();
        assert_eq!(tracker.max_depth(), 0);
        tracker.set_async_call_stack_depth(ListenerId(1), 3);
        tracker.set_async_call_stack_depth(ListenerId(2), 7);
        tracker.set_async_call_stack_depth(ListenerId(3), 2);
        assert_eq!(tracker.max_depth(), 7);

        tracker.async_task_scheduled(CTX, "timer", AsyncTaskId(10), false);
        assert!(!tracker.set_async_call_stack_depth(ListenerId(2), 0));
        assert_eq!(tracker.max_depth(), 3);
        assert_eq!(tracker.tracked_task_count(), 1);

        assert!(!tracker.set_async_call_stack_depth(ListenerId(1), 0));
        assert!(tracker.set_async_call_stack_depth(ListenerId(3), -1));
        assert_eq!(tracker.max_depth(), 0);
        assert_eq!(tracker.tracked_task_count(), 0);
    }

    #[test]
    fn test_transitions_ignored_without_depth() {
        let tracker = AsyncTaskTracker::new();
        tracker.async_task_scheduled(CTX, "timer", AsyncTaskId(1), false);
        tracker.async_task_started(CTX, AsyncTaskId(1));
        assert_eq!(tracker.task_state(AsyncTaskId(1)), None);
        assert!(tracker.current_async_call_chain(CTX).is_empty());
    }

    #[test]
    fn test_chain_follows_scheduling_parents() {
        let tracker = tracker_with_depth(8);
        tracker.async_task_scheduled(CTX, "setTimeout", AsyncTaskId(1), false);
        tracker.async_task_started(CTX, AsyncTaskId(1));
        tracker.async_task_scheduled(CTX, "Promise.then", AsyncTaskId(2), false);
        tracker.async_task_finished(AsyncTaskId(1));
        tracker.async_task_started(CTX, AsyncTaskId(2));

        let names: Vec<_> =
            tracker.current_async_call_chain(CTX).into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Promise.then", "setTimeout"]);
        assert_eq!(tracker.task_state(AsyncTaskId(1)), None);

        // Grandchild scheduled after both ancestors are gone from the map.
        tracker.async_task_scheduled(CTX, "fetch", AsyncTaskId(3), false);
        tracker.async_task_finished(AsyncTaskId(2));
        tracker.async_task_started(CTX, AsyncTaskId(3));
        let chain = tracker.current_async_call_chain(CTX);
        let ids: Vec<_> = chain.iter().map(|e| e.task).collect();
        assert_eq!(ids, vec![AsyncTaskId(3), AsyncTaskId(2), AsyncTaskId(1)]);

        let tracker = tracker_with_depth(8);
        tracker.async_task_scheduled(CTX, "interval", AsyncTaskId(1), true);
        tracker.async_task_started(CTX, AsyncTaskId(1));
        tracker.async_task_scheduled(CTX, "fetch", AsyncTaskId(2), false);
        tracker.async_task_finished(AsyncTaskId(1));
        tracker.async_task_started(CTX, AsyncTaskId(2));
        let names: Vec<_> =
            tracker.current_async_call_chain(CTX).into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["fetch", "interval"]);
    }

    #[test]
    fn test_chain_truncated_to_depth() {
        let tracker = tracker_with_depth(2);
        for id in 1..=4 {
            tracker.async_task_scheduled(CTX, &format!("t{id}"), AsyncTaskId(id), true);
            tracker.async_task_started(CTX, AsyncTaskId(id));
        }
        let chain = tracker.current_async_call_chain(CTX);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].task, AsyncTaskId(4));
        assert_eq!(chain[1].task, AsyncTaskId(3));
    }

    #[test]
    fn test_recurring_task_survives_until_canceled() {
        let tracker = tracker_with_depth(4);
        let task = AsyncTaskId(0xdead);
        tracker.async_task_scheduled(CTX, "setInterval", task, true);
        for _ in 0..3 {
            tracker.async_task_started(CTX, task);
            assert_eq!(tracker.task_state(task), Some(AsyncTaskState::Started));
            tracker.async_task_finished(task);
            assert_eq!(tracker.task_state(task), Some(AsyncTaskState::Scheduled));
        }
        tracker.async_task_canceled(task);
        assert_eq!(tracker.task_state(task), None);
    }

    #[test]
    fn test_one_shot_task_forgotten_after_finish() {
        let tracker = tracker_with_depth(4);
        tracker.async_task_scheduled(CTX, "setTimeout", AsyncTaskId(5), false);
        tracker.async_task_started(CTX, AsyncTaskId(5));
        tracker.async_task_finished(AsyncTaskId(5));
        assert_eq!(tracker.task_state(AsyncTaskId(5)), None);
        tracker.async_task_started(CTX, AsyncTaskId(5));
        assert!(tracker.current_async_call_chain(CTX).is_empty());
    }

    #[test]
    fn test_started_stacks_are_per_context() {
        let tracker = tracker_with_depth(4);
        tracker.async_task_scheduled(1, "a", AsyncTaskId(1), false);
        tracker.async_task_scheduled(2, "b", AsyncTaskId(2), false);
        tracker.async_task_started(1, AsyncTaskId(1));
        tracker.async_task_started(2, AsyncTaskId(2));
        assert_eq!(tracker.current_async_call_chain(1)[0].name, "a");
        assert_eq!(tracker.current_async_call_chain(2)[0].name, "b");
        tracker.async_task_canceled(AsyncTaskId(1));
        assert!(tracker.current_async_call_chain(1).is_empty());
    }
}
