//! Scripted debuggee activity for the simulated engine.

use anyhow::{Context as _, Result};
use diagbridge_core::{Debugger, PauseOnExceptionsState, SimulatedEngine};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// One thing the simulated debuggee does.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Compile { script_id: i64, url: String, source: String },
    FailCompile { script_id: i64, url: String, message: String },
    Breakpoint {
        script_id: i64,
        line: i64,
        #[serde(default)]
        column: i64,
    },
    Run { script_id: i64, lines: Vec<i64> },
    DebuggerStatement,
    Throw {
        exception: Value,
        #[serde(default)]
        uncaught: bool,
    },
    PauseOnExceptions { state: PauseOnExceptionsState },
    PauseNextStatement,
    SafePoint,
    PushFrame { script_id: i64, function: String, line: i64 },
    PopFrame,
}

pub fn load(path: &Path) -> Result<Vec<Step>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing scenario {}", path.display()))
}

/// Used when no scenario file is given.
pub fn default_steps() -> Vec<Step> {
    vec![
        Step::Compile {
            script_id: 1,
            url: "main.js".to_string(),
            source: "let total = 0;\nfor (const n of [1, 2, 3]) {\n  total += n;\n}\ndebugger;\n"
                .to_string(),
        },
        Step::PushFrame { script_id: 1, function: "main".to_string(), line: 0 },
        Step::Breakpoint { script_id: 1, line: 2, column: 0 },
        Step::Run { script_id: 1, lines: vec![0, 1, 2, 1, 2, 3] },
        Step::DebuggerStatement,
    ]
}

pub fn run(engine: &SimulatedEngine, debugger: &Debugger, steps: &[Step]) -> Result<()> {
    for step in steps {
        log::debug!("scenario step {step:?}");
        match step {
            Step::Compile { script_id, url, source } => engine.compile_script(*script_id, url, source),
            Step::FailCompile { script_id, url, message } => {
                engine.fail_compile(*script_id, url, message);
            }
            Step::Breakpoint { script_id, line, column } => {
                let location = debugger.set_breakpoint(&script_id.to_string(), *line, *column)?;
                println!(
                    "breakpoint {} set at {}:{}:{}",
                    location.breakpoint_id, script_id, location.line, location.column
                );
            }
            Step::Run { script_id, lines } => {
                for line in lines {
                    engine.execute_line(*script_id, *line);
                }
            }
            Step::DebuggerStatement => engine.hit_debugger_statement(),
            Step::Throw { exception, uncaught } => engine.throw_exception(exception.clone(), *uncaught),
            Step::PauseOnExceptions { state } => debugger.set_pause_on_exceptions_state(*state)?,
            Step::PauseNextStatement => debugger.set_pause_on_next_statement(true),
            Step::SafePoint => engine.safe_point(),
            Step::PushFrame { script_id, function, line } => engine.push_frame(*script_id, function, *line),
            Step::PopFrame => engine.pop_frame(),
        }
    }
    Ok(())
}
