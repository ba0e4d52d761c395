//! Session context threaded through resolution and execution
//!
//! `PendantContext` owns the mutable session state: parser settings and the
//! repeat/undo history. The resolver mutates settings and consumes undo
//! history; the executor records what actually ran.

use crate::command::instructions;
use crate::command::types::{Command, CommandType, Resolution};
use crate::core::config::{
    ParserConfig, MAX_FEED_SETTING, MAX_STEP_SETTING, MIN_FEED_SETTING, MIN_STEP_SETTING,
};
use crate::core::types::{JogVector, ProbeType};
use tracing::{debug, warn};

/// What REPEAT and UNDO act on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionHistory {
    last_executed_command: Option<Command>,
    last_jog_moves: Option<JogVector>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an executed command; meta commands are ignored
    pub fn record(&mut self, cmd: &Command) {
        if cmd.command_type.is_meta() {
            return;
        }
        self.last_executed_command = Some(cmd.clone());
        if cmd.command_type == CommandType::Jog {
            self.last_jog_moves = cmd.jog_vector.clone();
        }
    }

    pub fn last_command(&self) -> Option<&Command> {
        self.last_executed_command.as_ref()
    }

    pub fn last_jog(&self) -> Option<&JogVector> {
        self.last_jog_moves.as_ref()
    }

    /// Take the last jog, leaving the slot empty so an undo cannot be undone
    pub fn take_last_jog(&mut self) -> Option<JogVector> {
        self.last_jog_moves.take()
    }

    pub fn set_last_jog(&mut self, vector: JogVector) {
        self.last_jog_moves = Some(vector);
    }

    pub fn clear(&mut self) {
        self.last_executed_command = None;
        self.last_jog_moves = None;
    }
}

/// Mutable session state owned by the session loop
#[derive(Debug, Clone, Default)]
pub struct PendantContext {
    pub config: ParserConfig,
    pub history: ExecutionHistory,
}

impl PendantContext {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            history: ExecutionHistory::new(),
        }
    }

    /// REPEAT: wrap the last executed command, or explain why not
    pub fn repeat_last(&self) -> Command {
        match self.history.last_command() {
            Some(last) => instructions::repeat(last),
            None => Command::blocked("Nothing to repeat yet"),
        }
    }

    /// UNDO: reverse the last jog and clear it
    pub fn undo_last_jog(&mut self) -> Command {
        match self.history.take_last_jog() {
            Some(vector) => {
                instructions::undo_jog(&vector, self.config.feed_rate, self.config.units)
            }
            None => Command::blocked("Nothing to undo; only the last jog can be reversed"),
        }
    }

    /// START_JOB: blocked unless job start is permitted, then an alias for RESUME
    pub fn start_job(&self) -> Command {
        if self.config.allow_job_start {
            let mut cmd = instructions::resume();
            cmd.description = "Start job".into();
            cmd
        } else {
            Command::blocked("Starting a job by voice is disabled")
        }
    }

    /// SET_FEED with a value in display units per minute
    pub fn set_feed(&mut self, value: f64) -> Resolution {
        if !(MIN_FEED_SETTING..=MAX_FEED_SETTING).contains(&value) {
            warn!(value, "feed rate out of range, ignoring");
            return Resolution::Rejected;
        }
        let feed_mm = self.config.units.to_mm(value);
        self.config.feed_rate = feed_mm;
        debug!(feed_mm, "feed rate set");
        Resolution::Matched(instructions::feed_setting(feed_mm, self.config.units))
    }

    /// SET_STEP with a value in display units
    pub fn set_step(&mut self, value: f64) -> Resolution {
        if !(MIN_STEP_SETTING..=MAX_STEP_SETTING).contains(&value) {
            warn!(value, "step size out of range, ignoring");
            return Resolution::Rejected;
        }
        let step_mm = self.config.units.to_mm(value);
        self.config.step_size = step_mm;
        debug!(step_mm, "step size set");
        Resolution::Matched(instructions::step_setting(step_mm, self.config.units))
    }

    pub fn set_probe_type(&mut self, probe_type: ProbeType) -> Command {
        self.config.probe_type = probe_type;
        instructions::probe_type_setting(probe_type)
    }

    /// SET_WORKSPACE: switch the active work coordinate system
    pub fn set_workspace(&mut self, code: u8) -> Command {
        self.config.workspace = format!("G{}", code);
        instructions::workspace(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Axis, UnitsPreference};

    fn jog_xy(x: f64, y: f64) -> JogVector {
        [(Axis::X, x), (Axis::Y, y)].into_iter().collect()
    }

    #[test]
    fn test_record_skips_meta_commands() {
        let mut history = ExecutionHistory::new();
        history.record(&instructions::home(&[]));
        history.record(&instructions::query(instructions::QueryKind::Feed));
        history.record(&Command::blocked("no"));
        assert_eq!(history.last_command().unwrap().payload, "$H");
    }

    #[test]
    fn test_record_jog_stores_vector() {
        let mut history = ExecutionHistory::new();
        let cmd = instructions::jog(jog_xy(-10.0, 5.0), 1000.0, UnitsPreference::Metric);
        history.record(&cmd);
        assert_eq!(history.last_jog(), Some(&jog_xy(-10.0, 5.0)));
    }

    #[test]
    fn test_undo_then_undo_again_is_blocked() {
        let mut ctx = PendantContext::default();
        ctx.history.set_last_jog(jog_xy(-10.0, 5.0));

        let first = ctx.undo_last_jog();
        assert_eq!(first.command_type, CommandType::Undo);
        assert_eq!(first.jog_vector, Some(jog_xy(10.0, -5.0)));

        let second = ctx.undo_last_jog();
        assert!(second.is_blocked());
    }

    #[test]
    fn test_repeat_without_history_is_blocked() {
        let ctx = PendantContext::default();
        let cmd = ctx.repeat_last();
        assert!(cmd.is_blocked());
        assert!(!cmd.description.is_empty());
    }

    #[test]
    fn test_start_job_respects_permission() {
        let mut ctx = PendantContext::default();
        assert!(ctx.start_job().is_blocked());
        ctx.config.allow_job_start = true;
        let cmd = ctx.start_job();
        assert_eq!(cmd.command_type, CommandType::Resume);
        assert_eq!(cmd.payload, "~");
    }

    #[test]
    fn test_set_feed_imperial_converts() {
        let mut ctx = PendantContext::default();
        ctx.config.units = UnitsPreference::Imperial;
        let cmd = ctx.set_feed(40.0).into_command().unwrap();
        assert!((ctx.config.feed_rate - 1016.0).abs() < 1e-9);
        assert_eq!(cmd.payload, "FEED:1016");
    }

    #[test]
    fn test_set_feed_out_of_range_is_rejected() {
        let mut ctx = PendantContext::default();
        assert_eq!(ctx.set_feed(60_000.0), Resolution::Rejected);
        assert_eq!(ctx.set_feed(0.5), Resolution::Rejected);
        assert_eq!(ctx.config.feed_rate, 1000.0);
    }

    #[test]
    fn test_set_step_bounds() {
        let mut ctx = PendantContext::default();
        assert!(matches!(ctx.set_step(0.001), Resolution::Matched(_)));
        assert_eq!(ctx.set_step(101.0), Resolution::Rejected);
        assert_eq!(ctx.config.step_size, 0.001);
    }

    #[test]
    fn test_set_workspace_updates_config() {
        let mut ctx = PendantContext::default();
        let cmd = ctx.set_workspace(56);
        assert_eq!(cmd.payload, "G56");
        assert_eq!(ctx.config.workspace, "G56");
    }
}
