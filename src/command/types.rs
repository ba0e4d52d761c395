//! Resolved command values

use crate::core::types::JogVector;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confidence attached to commands built by the fallback grammar
pub const GRAMMAR_CONFIDENCE: f32 = 0.8;

/// Closed set of command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    Stop,
    Resume,
    Reset,
    Home,
    Unlock,
    Jog,
    Move,
    Probe,
    Workspace,
    Setting,
    Zero,
    Blocked,
    Query,
    Spindle,
    Coolant,
    ToolChange,
    Repeat,
    Undo,
}

impl CommandType {
    /// Commands that are never stored as "last executed"
    pub fn is_meta(&self) -> bool {
        matches!(
            self,
            CommandType::Repeat | CommandType::Undo | CommandType::Blocked | CommandType::Query
        )
    }

    /// Commands accepted while the machine is in alarm
    pub fn clears_alarm(&self) -> bool {
        matches!(
            self,
            CommandType::Unlock | CommandType::Home | CommandType::Reset | CommandType::Stop
        )
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandType::Stop => "STOP",
            CommandType::Resume => "RESUME",
            CommandType::Reset => "RESET",
            CommandType::Home => "HOME",
            CommandType::Unlock => "UNLOCK",
            CommandType::Jog => "JOG",
            CommandType::Move => "MOVE",
            CommandType::Probe => "PROBE",
            CommandType::Workspace => "WORKSPACE",
            CommandType::Setting => "SETTING",
            CommandType::Zero => "ZERO",
            CommandType::Blocked => "BLOCKED",
            CommandType::Query => "QUERY",
            CommandType::Spindle => "SPINDLE",
            CommandType::Coolant => "COOLANT",
            CommandType::ToolChange => "TOOL_CHANGE",
            CommandType::Repeat => "REPEAT",
            CommandType::Undo => "UNDO",
        };
        f.write_str(name)
    }
}

/// One resolved command. Built by the resolver, never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub command_type: CommandType,
    /// Human-readable description, also used for spoken confirmation
    pub description: String,
    /// Machine instruction or synthetic `KIND:ARG` payload
    pub payload: String,
    /// Per-axis relative motion for jogs
    pub jog_vector: Option<JogVector>,
    pub confidence: f32,
}

impl Command {
    pub fn new(
        command_type: CommandType,
        description: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            command_type,
            description: description.into(),
            payload: payload.into(),
            jog_vector: None,
            confidence: 1.0,
        }
    }

    /// A recognized but forbidden request. Carries no payload.
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self::new(CommandType::Blocked, reason, "")
    }

    pub fn with_jog_vector(mut self, vector: JogVector) -> Self {
        self.jog_vector = Some(vector);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn is_blocked(&self) -> bool {
        self.command_type == CommandType::Blocked
    }
}

/// Outcome of one resolution step (a grammar rule or an intent mapping)
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A command was built; stop looking
    Matched(Command),
    /// Recognized but yields no command (out-of-range value, meta reply); stop looking
    Rejected,
    /// Not this rule; keep looking
    NoMatch,
}

impl Resolution {
    pub fn into_command(self) -> Option<Command> {
        match self {
            Resolution::Matched(cmd) => Some(cmd),
            Resolution::Rejected | Resolution::NoMatch => None,
        }
    }
}

impl From<Option<Command>> for Resolution {
    fn from(cmd: Option<Command>) -> Self {
        match cmd {
            Some(cmd) => Resolution::Matched(cmd),
            None => Resolution::NoMatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_has_no_payload() {
        let cmd = Command::blocked("Starting a job by voice is disabled");
        assert!(cmd.is_blocked());
        assert!(cmd.payload.is_empty());
        assert!(!cmd.description.is_empty());
    }

    #[test]
    fn test_meta_types() {
        assert!(CommandType::Repeat.is_meta());
        assert!(CommandType::Query.is_meta());
        assert!(!CommandType::Jog.is_meta());
        assert!(!CommandType::Setting.is_meta());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let cmd = Command::new(CommandType::Stop, "Stop", "!").with_confidence(1.5);
        assert_eq!(cmd.confidence, 1.0);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(CommandType::ToolChange.to_string(), "TOOL_CHANGE");
        assert_eq!(CommandType::Jog.to_string(), "JOG");
    }
}
