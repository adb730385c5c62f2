//! Native event demultiplexing.
//!
//! Every event the engine delivers lands in
//! [`Debugger::handle_native_event`] and is routed to the script-parse path
//! or the break path.

use super::pause::PauseState;
use super::Debugger;
use crate::config::UnattendedBreakPolicy;
use crate::listener::{PausedContext, SkipDecision, UnattendedBreak};
use crate::native::NativeEvent;
use crate::props::{self, PropertyError};
use crate::script::ScriptInfo;
use serde_json::Value;

/// Break metadata carried in an event payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BreakDetails {
    pub breakpoint_ids: Vec<String>,
    pub is_uncaught: bool,
    pub exception: Option<Value>,
}

impl BreakDetails {
    pub fn from_payload(data: &Value) -> Self {
        let breakpoint_ids = if props::has_property(data, "breakpointId") {
            vec![props::expect_int(data, "breakpointId").to_string()]
        } else {
            Vec::new()
        };
        let is_uncaught = match props::get_bool(data, "uncaught") {
            Ok(uncaught) => uncaught,
            Err(PropertyError::Missing(_)) => false,
            Err(e) => {
                log::warn!("reading break payload: {e}, treating as caught");
                false
            }
        };
        Self {
            breakpoint_ids,
            is_uncaught,
            exception: props::get_property(data, "exception").ok().cloned(),
        }
    }
}

impl Debugger {
    /// Entry point of the native debug callback.
    pub fn handle_native_event(&self, event: NativeEvent, data: &Value) {
        log::trace!("native event {event:?}");
        match event {
            NativeEvent::SourceCompile => self.handle_source_event(data, true),
            NativeEvent::CompileError => self.handle_source_event(data, false),
            NativeEvent::Breakpoint
            | NativeEvent::StepComplete
            | NativeEvent::DebuggerStatement
            | NativeEvent::RuntimeException => self.handle_break(event, data),
            NativeEvent::AsyncBreak => {
                if self.pause.take_pause_on_next_statement() {
                    self.handle_break(event, data);
                } else {
                    log::debug!("async break without a pending pause request");
                }
            }
            NativeEvent::Unknown(code) => log::debug!("ignoring unknown debug event {code}"),
        }
    }

    fn handle_source_event(&self, data: &Value, success: bool) {
        if self.muted_script_events.get() > 0 {
            log::trace!("script parse event muted");
            return;
        }
        let group_id = self
            .engine
            .current_context()
            .map_or(0, |ctx| self.contexts.resolve_group_id(&*self.engine, ctx));
        let Some(listener) = self.listeners.for_group(group_id) else {
            log::trace!("no listener for group {group_id}, dropping script parse event");
            return;
        };
        let script = ScriptInfo::from_engine(data);
        log::debug!(
            "script {} ({}) parsed in group {group_id}, success={success}",
            script.script_id,
            script.url
        );
        listener.on_script_parsed(&script, success);
    }

    fn handle_break(&self, reason: NativeEvent, data: &Value) {
        if self.pause.nested_loop_active() || self.pause.state() != PauseState::Running {
            log::debug!("dropping {reason:?} raised during a pause");
            return;
        }
        if matches!(reason, NativeEvent::Breakpoint | NativeEvent::DebuggerStatement)
            && !self.breakpoints_activated()
        {
            log::debug!("breakpoints deactivated, dropping {reason:?}");
            return;
        }
        let Some(context) = self.engine.current_context() else {
            log::warn!("{reason:?} delivered outside of any context");
            return;
        };

        self.pause.begin(context);
        let (group_id, context_id) = self
            .contexts
            .marker(&*self.engine, context)
            .map_or((0, 0), |m| (m.group_id, m.context_id));

        let Some(listener) = self.listeners.for_group(group_id) else {
            self.pause.finish();
            self.record_unattended(reason, group_id, context_id, data);
            return;
        };

        let details = BreakDetails::from_payload(data);
        let paused = PausedContext { context, context_id, group_id, reason };
        log::info!("paused in context {context_id} (group {group_id}) on {reason:?}");
        let decision = listener.on_pause(
            &paused,
            details.exception.as_ref(),
            &details.breakpoint_ids,
            details.is_uncaught,
        );
        drop(listener);
        self.pause.transition(PauseState::Paused);

        if decision == SkipDecision::NoSkip {
            self.pause.enter_nested_loop();
            self.client.run_message_loop_on_pause(self, group_id);
            self.pause.leave_nested_loop();
        } else {
            log::debug!("listener skipped pause with {decision:?}");
        }

        self.pause.transition(PauseState::Resuming);
        match self.listeners.for_group(group_id) {
            Some(listener) => listener.on_resume(),
            None => log::debug!("listener for group {group_id} left during the pause"),
        }
        self.pause.finish();
        log::info!("resumed context {context_id}");

        if let Some(step) = decision.step_type() {
            self.issue_step(step);
        }
    }

    fn record_unattended(&self, reason: NativeEvent, group_id: i32, context_id: i32, data: &Value) {
        let UnattendedBreakPolicy::Queue { capacity } = self.config.unattended_breaks else {
            log::warn!("no listener for group {group_id}, ignoring {reason:?}");
            return;
        };
        if capacity == 0 {
            return;
        }
        let details = BreakDetails::from_payload(data);
        let mut queue = self.unattended.borrow_mut();
        if queue.len() == capacity {
            queue.pop_front();
        }
        queue.push_back(UnattendedBreak {
            group_id,
            context_id,
            reason,
            breakpoint_ids: details.breakpoint_ids,
            is_uncaught: details.is_uncaught,
        });
        log::debug!("queued unattended {reason:?} for group {group_id}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InspectorClient;
    use crate::config::DebuggerConfig;
    use crate::context::ContextInfo;
    use crate::listener::{DebuggerListener, ListenerId};
    use crate::native::{ContextHandle, StepType};
    use crate::sim::SimulatedEngine;
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    type LoopAction = Box<dyn Fn(&Debugger)>;

    /// Client that runs a scripted action inside the nested loop.
    #[derive(Default)]
    struct ScriptedClient {
        action: RefCell<Option<LoopAction>>,
        loops: Cell<usize>,
        quits: Cell<usize>,
    }

    impl InspectorClient for ScriptedClient {
        fn run_message_loop_on_pause(&self, debugger: &Debugger, _group_id: i32) {
            self.loops.set(self.loops.get() + 1);
            if let Some(action) = self.action.borrow().as_ref() {
                action(debugger);
            }
        }

        fn quit_message_loop_on_pause(&self) {
            self.quits.set(self.quits.get() + 1);
        }
    }

    #[derive(Default)]
    struct Recorder {
        decision: Cell<SkipDecision>,
        pauses: RefCell<Vec<(PausedContext, Vec<String>, bool, Option<Value>)>>,
        resumes: Cell<usize>,
        parsed: RefCell<Vec<(String, bool)>>,
        missed: RefCell<Vec<UnattendedBreak>>,
    }

    impl DebuggerListener for Recorder {
        fn on_script_parsed(&self, script: &ScriptInfo, success: bool) {
            self.parsed.borrow_mut().push((script.script_id.clone(), success));
        }

        fn on_pause(
            &self,
            context: &PausedContext,
            exception: Option<&Value>,
            breakpoint_ids: &[String],
            is_uncaught: bool,
        ) -> SkipDecision {
            self.pauses.borrow_mut().push((
                *context,
                breakpoint_ids.to_vec(),
                is_uncaught,
                exception.cloned(),
            ));
            self.decision.get()
        }

        fn on_resume(&self) {
            self.resumes.set(self.resumes.get() + 1);
        }

        fn on_missed_pause(&self, pause: &UnattendedBreak) {
            self.missed.borrow_mut().push(pause.clone());
        }
    }

    struct Fixture {
        engine: Rc<SimulatedEngine>,
        client: Rc<ScriptedClient>,
        debugger: Rc<Debugger>,
        context: ContextHandle,
    }

    fn fixture_with(config: DebuggerConfig) -> Fixture {
        let engine = Rc::new(SimulatedEngine::new());
        let client = Rc::new(ScriptedClient::default());
        let debugger = Debugger::new(engine.clone(), client.clone(), config);
        debugger.enable().unwrap();
        let context = engine.create_context();
        debugger.mark_context(&ContextInfo::new(context, 1, "")).unwrap();
        engine.enter_context(context);
        engine.add_script(7, "main.js", &[0, 1, 2, 3]);
        Fixture { engine, client, debugger, context }
    }

    fn fixture() -> Fixture {
        fixture_with(DebuggerConfig::default())
    }

    fn listen(fx: &Fixture, group_id: i32) -> (Rc<Recorder>, ListenerId) {
        let recorder = Rc::new(Recorder::default());
        let id = fx.debugger.register_listener(group_id, recorder.clone());
        (recorder, id)
    }

    #[test]
    fn test_breakpoint_pause_reports_ids() {
        let fx = fixture();
        let (recorder, _) = listen(&fx, 1);
        let location = fx.debugger.set_breakpoint("7", 2, 0).unwrap();

        fx.engine.execute_line(7, 2);

        let pauses = recorder.pauses.borrow();
        assert_eq!(pauses.len(), 1);
        let (ctx, ids, uncaught, exception) = &pauses[0];
        assert_eq!(ctx.context, fx.context);
        assert_eq!(ctx.group_id, 1);
        assert_eq!(ctx.reason, NativeEvent::Breakpoint);
        assert_eq!(ids, &vec![location.breakpoint_id]);
        assert!(!uncaught);
        assert!(exception.is_none());
        assert_eq!(recorder.resumes.get(), 1);
        assert_eq!(fx.client.loops.get(), 1);
        assert_eq!(fx.debugger.pause_state(), PauseState::Running);
        assert_eq!(fx.debugger.paused_context(), None);
    }

    #[test]
    fn test_no_reentrant_pause() {
        let fx = fixture();
        let (recorder, _) = listen(&fx, 1);
        let sibling = fx.engine.create_context();
        fx.debugger.mark_context(&ContextInfo::new(sibling, 1, "")).unwrap();
        fx.debugger.set_breakpoint("7", 1, 0).unwrap();

        let engine = fx.engine.clone();
        let original = fx.context;
        *fx.client.action.borrow_mut() = Some(Box::new(move |debugger: &Debugger| {
            assert_eq!(debugger.paused_context(), Some(original));

            engine.hit_debugger_statement();
            engine.enter_context(sibling);
            engine.hit_debugger_statement();
            engine.execute_line(7, 1);
            engine.enter_context(original);

            assert!(debugger.is_paused());
            assert_eq!(debugger.paused_context(), Some(original));
        }));

        fx.engine.hit_debugger_statement();

        let pauses = recorder.pauses.borrow();
        assert_eq!(pauses.len(), 1);
        assert_eq!(pauses[0].0.context, original);
        assert!(pauses[0].1.is_empty());
        assert_eq!(recorder.resumes.get(), 1);
        assert_eq!(fx.client.loops.get(), 1);
        assert_eq!(fx.debugger.paused_context(), None);
    }

    #[test]
    fn test_skip_decisions_issue_steps_without_loop() {
        let fx = fixture();
        let (recorder, _) = listen(&fx, 1);

        recorder.decision.set(SkipDecision::StepOut);
        fx.engine.hit_debugger_statement();
        assert_eq!(fx.engine.last_step_type(), Some(StepType::StepOut));

        recorder.decision.set(SkipDecision::StepOverToFrame);
        fx.engine.hit_debugger_statement();
        assert_eq!(fx.engine.last_step_type(), Some(StepType::StepIn));

        assert_eq!(fx.client.loops.get(), 0);
        assert_eq!(recorder.resumes.get(), 2);
    }

    #[test]
    fn test_async_break_only_when_armed() {
        let fx = fixture();
        let (recorder, _) = listen(&fx, 1);

        fx.engine.fire(NativeEvent::AsyncBreak.raw(), json!({}));
        assert!(recorder.pauses.borrow().is_empty());

        fx.debugger.set_pause_on_next_statement(true);
        fx.engine.safe_point();
        assert_eq!(recorder.pauses.borrow().len(), 1);
        assert_eq!(recorder.pauses.borrow()[0].0.reason, NativeEvent::AsyncBreak);

        fx.engine.fire(NativeEvent::AsyncBreak.raw(), json!({}));
        assert_eq!(recorder.pauses.borrow().len(), 1);
    }

    #[test]
    fn test_cancelled_pause_request_does_not_pause() {
        let fx = fixture();
        let (recorder, _) = listen(&fx, 1);
        fx.debugger.set_pause_on_next_statement(true);
        fx.debugger.set_pause_on_next_statement(false);
        fx.engine.safe_point();
        assert!(recorder.pauses.borrow().is_empty());
    }

    #[test]
    fn test_deactivated_breakpoints_still_pause_on_steps_and_exceptions() {
        let fx = fixture();
        let (recorder, _) = listen(&fx, 1);
        fx.debugger.set_breakpoint("7", 1, 0).unwrap();
        fx.debugger.set_breakpoints_activated(false);

        fx.engine.execute_line(7, 1);
        fx.engine.hit_debugger_statement();
        assert!(recorder.pauses.borrow().is_empty());

        fx.engine.fire(NativeEvent::StepComplete.raw(), json!({}));
        fx.engine.fire(
            NativeEvent::RuntimeException.raw(),
            json!({"exception": {"message": "boom"}, "uncaught": true}),
        );
        let pauses = recorder.pauses.borrow();
        assert_eq!(pauses.len(), 2);
        assert!(pauses[1].2);
        assert_eq!(pauses[1].3, Some(json!({"message": "boom"})));
    }

    #[test]
    fn test_step_commands_inside_loop() {
        let fx = fixture();
        let (recorder, _) = listen(&fx, 1);
        *fx.client.action.borrow_mut() = Some(Box::new(|debugger: &Debugger| {
            debugger.step_over().unwrap();
            assert_eq!(debugger.pause_state(), PauseState::Resuming);
            assert!(debugger.step_into().is_err());
        }));

        fx.engine.hit_debugger_statement();
        assert_eq!(fx.engine.last_step_type(), Some(StepType::StepOver));
        assert_eq!(fx.client.quits.get(), 1);
        assert_eq!(recorder.resumes.get(), 1);
    }

    #[test]
    fn test_listener_unregistered_during_pause_gets_no_resume() {
        let fx = fixture();
        let (recorder, id) = listen(&fx, 1);
        *fx.client.action.borrow_mut() = Some(Box::new(move |debugger: &Debugger| {
            debugger.unregister_listener(id);
            debugger.continue_program();
        }));

        fx.engine.hit_debugger_statement();
        assert_eq!(recorder.pauses.borrow().len(), 1);
        assert_eq!(recorder.resumes.get(), 0);
        assert_eq!(fx.debugger.pause_state(), PauseState::Running);
    }

    #[test]
    fn test_break_without_listener_resumes() {
        let fx = fixture();
        let (other, _) = listen(&fx, 2);
        fx.engine.hit_debugger_statement();
        assert!(other.pauses.borrow().is_empty());
        assert_eq!(fx.client.loops.get(), 0);
        assert_eq!(fx.debugger.pause_state(), PauseState::Running);
        assert!(fx.debugger.unattended_breaks().is_empty());
    }

    #[test]
    fn test_unattended_breaks_are_replayed() {
        let fx = fixture_with(DebuggerConfig {
            unattended_breaks: UnattendedBreakPolicy::Queue { capacity: 2 },
            ..DebuggerConfig::default()
        });
        let location = fx.debugger.set_breakpoint("7", 3, 0).unwrap();
        fx.engine.hit_debugger_statement();
        fx.engine.execute_line(7, 3);
        fx.engine.fire(NativeEvent::StepComplete.raw(), json!({}));
        assert_eq!(fx.debugger.unattended_breaks().len(), 2);

        let (recorder, _) = listen(&fx, 1);
        let missed = recorder.missed.borrow();
        assert_eq!(missed.len(), 2);
        assert_eq!(missed[0].breakpoint_ids, vec![location.breakpoint_id.clone()]);
        assert_eq!(missed[1].reason, NativeEvent::StepComplete);
        assert!(fx.debugger.unattended_breaks().is_empty());
        assert!(recorder.pauses.borrow().is_empty());
    }

    #[test]
    fn test_script_parse_events_and_muting() {
        let fx = fixture();
        let (recorder, _) = listen(&fx, 1);

        fx.engine.compile_script(20, "a.js", "x = 1\ny = 2");
        fx.engine.fail_compile(21, "b.js", "syntax error");
        fx.debugger.mute_script_parsed_events();
        fx.engine.compile_script(22, "c.js", "z");
        fx.debugger.unmute_script_parsed_events();
        fx.engine.compile_script(23, "d.js", "w");

        assert_eq!(
            *recorder.parsed.borrow(),
            vec![
                ("20".to_string(), true),
                ("21".to_string(), false),
                ("23".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let fx = fixture();
        let (recorder, _) = listen(&fx, 1);
        fx.engine.fire(42, json!({}));
        assert!(recorder.pauses.borrow().is_empty());
        assert!(recorder.parsed.borrow().is_empty());
    }

    #[test]
    fn test_break_details_defaults() {
        let details = BreakDetails::from_payload(&json!({"uncaught": "yes"}));
        assert_eq!(details, BreakDetails::default());

        let details = BreakDetails::from_payload(&json!({"breakpointId": 9.0, "uncaught": true}));
        assert_eq!(details.breakpoint_ids, vec!["9".to_string()]);
        assert!(details.is_uncaught);
    }

    #[test]
    #[should_panic(expected = "engine contract violation")]
    fn test_non_integer_breakpoint_id_is_fatal() {
        BreakDetails::from_payload(&json!({"breakpointId": "seven"}));
    }
}
