//! Debugger configuration.

use serde::{Deserialize, Serialize};

/// What happens to a break event whose context group has no listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnattendedBreakPolicy {
    /// Resume immediately and forget the break.
    #[default]
    Ignore,
    /// Resume immediately, but keep up to `capacity` breaks and hand them to
    /// the next listener registering for the group.
    Queue { capacity: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    pub breakpoints_activated: bool,
    pub unattended_breaks: UnattendedBreakPolicy,
    /// Frames returned for an unbounded call-frame request; 0 means all.
    pub call_frame_limit: usize,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            breakpoints_activated: true,
            unattended_breaks: UnattendedBreakPolicy::Ignore,
            call_frame_limit: 0,
        }
    }
}
