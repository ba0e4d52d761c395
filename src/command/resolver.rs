//! Command resolution - turns transcripts into commands
//!
//! transcript -> TextNormalizer -> IntentResolver (if enabled and confident)
//! -> intent mapping, else the fallback grammar.

use crate::command::grammar::{self, infer_probe_axis};
use crate::command::history::PendantContext;
use crate::command::instructions::{self, QueryKind, DEFAULT_SPINDLE_RPM, DEFAULT_TOOL};
use crate::command::jog::{
    apply_step_override, jog_segments, parse_absolute_move, scaled_feed, segment_distance,
};
use crate::command::types::{Command, CommandType, Resolution};
use crate::core::config::{parse_workspace_code, ParserConfig};
use crate::core::types::{Axis, JogVector, ProbeAxis, ProbeType};
use crate::machine::SettingsListener;
use crate::nlu::entities::direction_values;
use crate::nlu::{EntityType, Intent, IntentResolver, IntentResult, KeywordIntentResolver};
use crate::text::vocab::{
    contains_any, extract_inline_params, has_stop_word, speed_factor_for, Direction,
};
use crate::text::TextNormalizer;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

static CHAIN_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*,\s*then\s+|\s+and\s+then\s+|\s+then\s+").unwrap());

const CONFIRM_PHRASES: &[&str] = &[
    "yes", "yeah", "yep", "yup", "confirm", "confirmed", "affirmative", "go ahead", "do it",
    "correct", "ok", "okay", "sure",
];
const CANCEL_PHRASES: &[&str] = &[
    "no", "nope", "cancel", "never mind", "nevermind", "negative", "dont", "abort",
];

/// Answer to a confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Confirm,
    Cancel,
}

/// Hybrid parser: intent classification first, ordered grammar as fallback
pub struct CommandResolver {
    normalizer: TextNormalizer,
    intents: Box<dyn IntentResolver>,
    settings_listener: Option<Arc<dyn SettingsListener>>,
}

impl Default for CommandResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandResolver {
    pub fn new() -> Self {
        Self {
            normalizer: TextNormalizer::new(),
            intents: Box::new(KeywordIntentResolver::new()),
            settings_listener: None,
        }
    }

    pub fn with_intent_resolver(mut self, intents: Box<dyn IntentResolver>) -> Self {
        self.intents = intents;
        self
    }

    pub fn with_settings_listener(mut self, listener: Arc<dyn SettingsListener>) -> Self {
        self.settings_listener = Some(listener);
        self
    }

    pub fn normalize(&self, text: &str) -> String {
        self.normalizer.normalize(text)
    }

    /// Whether the utterance contains a STOP-class word
    pub fn is_stop(&self, text: &str) -> bool {
        has_stop_word(&self.normalize(text))
    }

    /// Resolve one utterance to at most one command
    pub fn parse_command(&self, text: &str, ctx: &mut PendantContext) -> Option<Command> {
        let normalized = self.normalize(text);
        self.parse_normalized(&normalized, ctx)
    }

    /// Resolve already-normalized text
    pub fn parse_normalized(&self, text: &str, ctx: &mut PendantContext) -> Option<Command> {
        let classified = ctx.config.nlu_enabled.then(|| self.intents.resolve(text));
        self.resolve(text, classified.as_ref(), ctx)
    }

    /// Resolve with an intent classified elsewhere (the remote classifier)
    pub fn resolve_with_intent(
        &self,
        text: &str,
        result: &IntentResult,
        ctx: &mut PendantContext,
    ) -> Option<Command> {
        let normalized = self.normalize(text);
        self.resolve(&normalized, Some(result), ctx)
    }

    fn resolve(
        &self,
        text: &str,
        classified: Option<&IntentResult>,
        ctx: &mut PendantContext,
    ) -> Option<Command> {
        if let Some(result) = classified {
            let trusted = result.intent != Intent::Unknown
                && result.confidence >= ctx.config.nlu_threshold;
            if trusted {
                match map_intent(text, result, ctx) {
                    Resolution::Matched(cmd) => {
                        debug!(intent = ?result.intent, confidence = result.confidence, "resolved by intent");
                        self.notify_settings(&cmd, ctx);
                        return Some(cmd.with_confidence(result.confidence));
                    }
                    Resolution::Rejected => {
                        debug!(intent = ?result.intent, "intent recognized without a command");
                        return None;
                    }
                    Resolution::NoMatch => {
                        debug!(intent = ?result.intent, "intent mapping incomplete, trying grammar");
                    }
                }
            } else {
                debug!(
                    intent = ?result.intent,
                    confidence = result.confidence,
                    "intent below threshold, trying grammar"
                );
            }
        }

        let cmd = grammar::evaluate(text, ctx).into_command();
        match &cmd {
            Some(cmd) => self.notify_settings(cmd, ctx),
            None => debug!(text, "no command"),
        }
        cmd
    }

    /// Split on "then" conjunctions and resolve each part; failures and
    /// blocked parts are dropped
    pub fn parse_chained_commands(&self, text: &str, ctx: &mut PendantContext) -> Vec<Command> {
        let normalized = self.normalize(text);
        split_chain(&normalized)
            .into_iter()
            .filter_map(|segment| self.parse_normalized(segment, ctx))
            .filter(|cmd| {
                if cmd.is_blocked() {
                    warn!(reason = %cmd.description, "blocked step dropped from chain");
                }
                !cmd.is_blocked()
            })
            .collect()
    }

    /// One utterance as the session sees it: a single command keeps its
    /// BLOCKED reason so it can be spoken; a chain is filtered
    pub fn parse_utterance(&self, text: &str, ctx: &mut PendantContext) -> Vec<Command> {
        let normalized = self.normalize(text);
        if split_chain(&normalized).len() > 1 {
            self.parse_chained_commands(&normalized, ctx)
        } else {
            self.parse_normalized(&normalized, ctx).into_iter().collect()
        }
    }

    /// Whether the utterance splits into more than one command
    pub fn is_chain(&self, text: &str) -> bool {
        split_chain(&self.normalize(text)).len() > 1
    }

    /// Yes/no reply to a confirmation prompt
    pub fn parse_reply(&self, text: &str) -> Option<Reply> {
        let normalized = self.normalize(text);
        if contains_any(&normalized, CANCEL_PHRASES) {
            Some(Reply::Cancel)
        } else if contains_any(&normalized, CONFIRM_PHRASES) {
            Some(Reply::Confirm)
        } else {
            None
        }
    }

    fn notify_settings(&self, cmd: &Command, ctx: &PendantContext) {
        if cmd.command_type != CommandType::Setting {
            return;
        }
        let Some(listener) = &self.settings_listener else {
            return;
        };
        let kind = cmd.payload.split(':').next().unwrap_or_default();
        match kind {
            "FEED" => listener.on_feed_changed(ctx.config.feed_rate),
            "STEP" => listener.on_step_changed(ctx.config.step_size),
            "PROBE_TYPE" => listener.on_probe_type_changed(ctx.config.probe_type),
            _ => {}
        }
    }
}

fn split_chain(text: &str) -> Vec<&str> {
    CHAIN_SPLIT_RE
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Axis letters named by AXIS entities, deduplicated in X/Y/Z order
fn entity_axes(result: &IntentResult) -> Vec<Axis> {
    let mut axes: Vec<Axis> = result
        .values(EntityType::Axis)
        .flat_map(|v| v.chars().filter_map(Axis::from_letter).collect::<Vec<_>>())
        .collect();
    axes.sort();
    axes.dedup();
    axes
}

fn entity_probe_axis(text: &str, result: &IntentResult) -> ProbeAxis {
    if result.values(EntityType::Axis).any(|v| v == "CENTER") {
        return ProbeAxis::Center;
    }
    match entity_axes(result).as_slice() {
        [] => infer_probe_axis(text),
        [Axis::X] => ProbeAxis::X,
        [Axis::Y] => ProbeAxis::Y,
        [Axis::Z] => ProbeAxis::Z,
        [Axis::X, Axis::Y] => ProbeAxis::XY,
        _ => ProbeAxis::XYZ,
    }
}

fn spindle_rpm(value: Option<f64>) -> Option<u32> {
    value.filter(|v| *v > 0.0).map(|v| v.round() as u32)
}

/// One magnitude per direction, read segment by segment the way the grammar
/// reads it. `None` when the utterance names a different number of directions
/// than the entities carry.
fn segment_magnitudes(text: &str, expected: usize, config: &ParserConfig) -> Option<Vec<f64>> {
    let params = extract_inline_params(text);
    let mut magnitudes = Vec::with_capacity(expected);
    for segment in jog_segments(&params.remainder) {
        let distance = segment_distance(segment, config);
        magnitudes.extend(direction_values(segment).iter().map(|_| distance));
    }
    (magnitudes.len() == expected).then_some(magnitudes)
}

/// Relative jog from DIRECTION/DISTANCE/AXIS entities
fn map_jog(text: &str, result: &IntentResult, ctx: &PendantContext) -> Resolution {
    let config = &ctx.config;
    let directions: Vec<Direction> = result
        .values(EntityType::Direction)
        .filter_map(Direction::from_entity)
        .collect();

    if directions.is_empty() {
        // "jog x 10": a coordinate, not a direction
        return parse_absolute_move(text, config).into();
    }

    let distances = result.numbers(EntityType::Distance);
    let signed_axes: Vec<Axis> = result
        .values(EntityType::Axis)
        .filter(|v| v.len() == 1)
        .filter_map(|v| v.chars().next().and_then(Axis::from_letter))
        .collect();

    let from_segments = segment_magnitudes(text, directions.len(), config);

    let mut vector = JogVector::new();
    let mut signed_index = 0;
    for (i, direction) in directions.iter().enumerate() {
        let magnitude = match &from_segments {
            Some(magnitudes) => magnitudes[i],
            None => distances
                .get(i)
                .map(|d| config.units.to_mm(d.abs()))
                .unwrap_or(config.step_size),
        };

        let target = match direction.axis_sign(config.home_location) {
            Some(target) => Some(target),
            None => {
                let axis = signed_axes.get(signed_index).copied();
                signed_index += 1;
                axis.map(|a| (a, direction.sign()))
            }
        };
        let Some((axis, sign)) = target else {
            debug!(direction = direction.as_str(), "signed direction without an axis");
            continue;
        };
        *vector.entry(axis).or_insert(0.0) += sign * magnitude;
    }

    vector.retain(|_, v| v.abs() > f64::EPSILON);
    if vector.is_empty() {
        return Resolution::NoMatch;
    }

    if let Some(step) = result.first_number(EntityType::StepSize) {
        apply_step_override(&mut vector, config.units.to_mm(step));
    }

    let base_feed = result
        .first_number(EntityType::FeedRate)
        .map(|f| config.units.to_mm(f))
        .unwrap_or(config.feed_rate);
    let factor = result
        .first(EntityType::SpeedModifier)
        .and_then(speed_factor_for)
        .unwrap_or(1.0);

    Resolution::Matched(instructions::jog(
        vector,
        scaled_feed(base_feed, factor),
        config.units,
    ))
}

/// Intent -> command. `NoMatch` hands the utterance to the grammar.
pub fn map_intent(text: &str, result: &IntentResult, ctx: &mut PendantContext) -> Resolution {
    use Resolution::Matched;

    match result.intent {
        Intent::Stop => Matched(instructions::stop()),
        Intent::Resume => Matched(instructions::resume()),
        Intent::Reset => Matched(instructions::reset()),
        Intent::Unlock => Matched(instructions::unlock()),
        Intent::Home => Matched(instructions::home(&entity_axes(result))),
        Intent::Jog => map_jog(text, result, ctx),
        Intent::MoveAbsolute => parse_absolute_move(text, &ctx.config).into(),
        Intent::Probe => {
            let probe_type = result
                .first(EntityType::ProbeType)
                .and_then(ProbeType::parse)
                .unwrap_or(ctx.config.probe_type);
            Matched(instructions::probe(entity_probe_axis(text, result), probe_type))
        }
        Intent::SetFeed => match result
            .first_number(EntityType::FeedRate)
            .or_else(|| result.first_number(EntityType::Distance))
        {
            Some(value) => ctx.set_feed(value),
            None => Resolution::NoMatch,
        },
        Intent::SetStep => match result
            .first_number(EntityType::StepSize)
            .or_else(|| result.first_number(EntityType::Distance))
        {
            Some(value) => ctx.set_step(value),
            None => Resolution::NoMatch,
        },
        Intent::SetProbeType => result
            .first(EntityType::ProbeType)
            .and_then(ProbeType::parse)
            .map(|t| ctx.set_probe_type(t))
            .into(),
        Intent::SetWorkspace => result
            .first(EntityType::Workspace)
            .and_then(parse_workspace_code)
            .map(|code| ctx.set_workspace(code))
            .into(),
        Intent::ZeroAxis => Matched(instructions::zero(&entity_axes(result))),
        Intent::SpindleOn => {
            let ccw = result
                .values(EntityType::Direction)
                .any(|d| d == Direction::Negative.as_str());
            let rpm = spindle_rpm(result.first_number(EntityType::SpindleRpm))
                .unwrap_or(DEFAULT_SPINDLE_RPM);
            Matched(instructions::spindle_on(rpm, ccw))
        }
        Intent::SpindleOff => Matched(instructions::spindle_off()),
        Intent::SetSpindleSpeed => spindle_rpm(result.first_number(EntityType::SpindleRpm))
            .map(instructions::spindle_speed)
            .into(),
        Intent::CoolantOn => Matched(instructions::coolant_on()),
        Intent::CoolantOff => Matched(instructions::coolant_off()),
        Intent::MistOn => Matched(instructions::mist_on()),
        Intent::ToolChange => {
            let tool = result
                .first_number(EntityType::ToolNumber)
                .filter(|n| *n >= 0.0)
                .map(|n| n as u32)
                .unwrap_or(DEFAULT_TOOL);
            Matched(instructions::tool_change(tool))
        }
        Intent::QueryPosition => Matched(instructions::query(QueryKind::Position)),
        Intent::QueryStatus => Matched(instructions::query(QueryKind::Status)),
        Intent::QueryFeed => Matched(instructions::query(QueryKind::Feed)),
        Intent::QueryStep => Matched(instructions::query(QueryKind::Step)),
        Intent::QueryDistanceToZero => Matched(instructions::query(QueryKind::DistanceToZero)),
        Intent::QueryDistanceToHome => Matched(instructions::query(QueryKind::DistanceToHome)),
        Intent::QueryTravelRemaining => Matched(instructions::query(QueryKind::Travel)),
        Intent::QueryProbeType => Matched(instructions::query(QueryKind::ProbeType)),
        Intent::Repeat => Matched(ctx.repeat_last()),
        Intent::Undo => Matched(ctx.undo_last_jog()),
        Intent::StartJob => Matched(ctx.start_job()),
        // Replies are consumed by the conversation layer
        Intent::Confirm | Intent::Cancel => Resolution::Rejected,
        Intent::Unknown => Resolution::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{HomeLocation, UnitsPreference};
    use crate::nlu::Entity;
    use std::sync::Mutex;

    struct FixedIntent(IntentResult);

    impl IntentResolver for FixedIntent {
        fn resolve(&self, _: &str) -> IntentResult {
            self.0.clone()
        }
    }

    fn fixed(intent: Intent, confidence: f32, entities: Vec<Entity>) -> CommandResolver {
        CommandResolver::new().with_intent_resolver(Box::new(FixedIntent(IntentResult::new(
            intent, confidence, entities,
        ))))
    }

    fn vector(cmd: &Command) -> Vec<(Axis, f64)> {
        cmd.jog_vector
            .as_ref()
            .map(|v| v.iter().map(|(a, d)| (*a, *d)).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_compound_jog_end_to_end() {
        let resolver = CommandResolver::new();
        let mut ctx = PendantContext::default();
        let cmd = resolver.parse_command("jog left 10 and forward 5", &mut ctx).unwrap();
        assert_eq!(cmd.command_type, CommandType::Jog);
        assert_eq!(vector(&cmd), vec![(Axis::X, -10.0), (Axis::Y, -5.0)]);
        assert!(cmd.payload.contains("X-10"));
        assert!(cmd.payload.contains("Y-5"));
        assert!(cmd.payload.contains("F1000"));
    }

    #[test]
    fn test_same_jog_through_grammar_only() {
        let resolver = CommandResolver::new();
        let mut ctx = PendantContext::default();
        ctx.config.nlu_enabled = false;
        let cmd = resolver.parse_command("jog left 10 and forward 5", &mut ctx).unwrap();
        assert_eq!(vector(&cmd), vec![(Axis::X, -10.0), (Axis::Y, -5.0)]);
    }

    #[test]
    fn test_stop_always_wins() {
        let resolver = CommandResolver::new();
        for nlu in [true, false] {
            let mut ctx = PendantContext::default();
            ctx.config.nlu_enabled = nlu;
            ctx.config.allow_job_start = true;
            let cmd = resolver.parse_command("stop and run the job", &mut ctx).unwrap();
            assert_eq!(cmd.command_type, CommandType::Stop);
        }
    }

    #[test]
    fn test_low_confidence_falls_back_to_grammar() {
        let resolver = fixed(Intent::SpindleOn, 0.3, vec![]);
        let mut ctx = PendantContext::default();
        let cmd = resolver.parse_command("home", &mut ctx).unwrap();
        assert_eq!(cmd.command_type, CommandType::Home);
        assert_eq!(cmd.confidence, crate::command::types::GRAMMAR_CONFIDENCE);
    }

    #[test]
    fn test_confident_intent_is_mapped() {
        let resolver = fixed(Intent::SpindleOn, 0.9, vec![
            Entity::new(EntityType::SpindleRpm, "12000"),
            Entity::new(EntityType::Direction, "NEGATIVE"),
        ]);
        let cmd = resolver.parse_command("whatever", &mut PendantContext::default()).unwrap();
        assert_eq!(cmd.payload, "M4 S12000");
        assert_eq!(cmd.confidence, 0.9);
    }

    #[test]
    fn test_incomplete_mapping_falls_through() {
        // SET_FEED without a number: the grammar gets a go
        let resolver = fixed(Intent::SetFeed, 0.9, vec![]);
        let cmd = resolver.parse_command("spindle off", &mut PendantContext::default()).unwrap();
        assert_eq!(cmd.payload, "M5");
    }

    #[test]
    fn test_reply_intents_yield_nothing() {
        let resolver = fixed(Intent::Confirm, 0.9, vec![]);
        assert!(resolver.parse_command("home", &mut PendantContext::default()).is_none());
    }

    #[test]
    fn test_signed_direction_needs_axis() {
        let resolver = fixed(Intent::Jog, 0.9, vec![
            Entity::new(EntityType::Axis, "Z"),
            Entity::new(EntityType::Direction, "NEGATIVE"),
            Entity::new(EntityType::Distance, "2"),
        ]);
        let cmd = resolver.parse_command("z minus 2", &mut PendantContext::default()).unwrap();
        assert_eq!(vector(&cmd), vec![(Axis::Z, -2.0)]);

        let resolver = fixed(Intent::Jog, 0.9, vec![Entity::new(EntityType::Direction, "POSITIVE")]);
        assert!(resolver.parse_command("plus", &mut PendantContext::default()).is_none());
    }

    #[test]
    fn test_jog_entities_respect_home_and_units() {
        let resolver = fixed(Intent::Jog, 0.9, vec![
            Entity::new(EntityType::Direction, "FORWARD"),
            Entity::new(EntityType::Distance, "1"),
            Entity::new(EntityType::SpeedModifier, "slowly"),
        ]);
        let mut ctx = PendantContext::default();
        ctx.config.home_location = HomeLocation::Front;
        ctx.config.units = UnitsPreference::Imperial;
        let cmd = resolver.parse_command("forward 1 slowly", &mut ctx).unwrap();
        assert_eq!(vector(&cmd), vec![(Axis::Y, 25.4)]);
        assert!(cmd.payload.ends_with("F100"));
    }

    #[test]
    fn test_jog_step_override_and_feed() {
        let resolver = fixed(Intent::Jog, 0.9, vec![
            Entity::new(EntityType::Direction, "LEFT"),
            Entity::new(EntityType::Direction, "UP"),
            Entity::new(EntityType::Distance, "10"),
            Entity::new(EntityType::StepSize, "0.5"),
            Entity::new(EntityType::FeedRate, "300"),
        ]);
        let cmd = resolver.parse_command("x", &mut PendantContext::default()).unwrap();
        assert_eq!(vector(&cmd), vec![(Axis::X, -0.5), (Axis::Z, 0.5)]);
        assert!(cmd.payload.ends_with("F300"));
    }

    #[test]
    fn test_jog_without_direction_is_absolute_move() {
        let resolver = CommandResolver::new();
        let cmd = resolver
            .parse_command("move to machine x 10", &mut PendantContext::default())
            .unwrap();
        assert_eq!(cmd.command_type, CommandType::Move);
        assert_eq!(cmd.payload, "G21 G53 G0 X10");
    }

    #[test]
    fn test_negative_coordinate_moves_on_both_paths() {
        let resolver = CommandResolver::new();
        for nlu in [true, false] {
            let mut ctx = PendantContext::default();
            ctx.config.nlu_enabled = nlu;
            let cmd = resolver.parse_command("move to x -5 y 10", &mut ctx).unwrap();
            assert_eq!(cmd.command_type, CommandType::Move, "nlu {}", nlu);
            assert_eq!(cmd.payload, "G21 G90 G0 X-5 Y10");

            let cmd = resolver.parse_command("go to x -5", &mut ctx).unwrap();
            assert_eq!(cmd.payload, "G21 G90 G0 X-5", "nlu {}", nlu);
        }
    }

    #[test]
    fn test_missing_distance_uses_step_on_both_paths() {
        let resolver = CommandResolver::new();
        for nlu in [true, false] {
            let mut ctx = PendantContext::default();
            ctx.config.nlu_enabled = nlu;
            let cmd = resolver.parse_command("jog left and forward 5", &mut ctx).unwrap();
            assert_eq!(vector(&cmd), vec![(Axis::X, -1.0), (Axis::Y, -5.0)], "nlu {}", nlu);
        }

        let resolver = fixed(Intent::Jog, 0.9, vec![
            Entity::new(EntityType::Direction, "LEFT"),
            Entity::new(EntityType::Direction, "FORWARD"),
            Entity::new(EntityType::Distance, "5"),
        ]);
        let cmd = resolver
            .parse_command("jog left and forward 5", &mut PendantContext::default())
            .unwrap();
        assert_eq!(vector(&cmd), vec![(Axis::X, -1.0), (Axis::Y, -5.0)]);
    }

    #[test]
    fn test_unpaired_direction_entity_gets_step() {
        // Entities that do not line up with the words: pair by position only
        let resolver = fixed(Intent::Jog, 0.9, vec![
            Entity::new(EntityType::Direction, "LEFT"),
            Entity::new(EntityType::Direction, "UP"),
            Entity::new(EntityType::Distance, "10"),
        ]);
        let mut ctx = PendantContext::default();
        ctx.config.step_size = 2.0;
        let cmd = resolver.parse_command("x", &mut ctx).unwrap();
        assert_eq!(vector(&cmd), vec![(Axis::X, -10.0), (Axis::Z, 2.0)]);
    }

    #[test]
    fn test_zero_pairs_outside_the_five_forms_are_blocked() {
        let resolver = CommandResolver::new();
        for nlu in [true, false] {
            let mut ctx = PendantContext::default();
            ctx.config.nlu_enabled = nlu;
            for text in ["zero x and z", "zero y and z"] {
                let cmd = resolver.parse_command(text, &mut ctx).unwrap();
                assert!(cmd.is_blocked(), "{} (nlu {})", text, nlu);
                assert!(cmd.payload.is_empty());
            }
            let cmd = resolver.parse_command("zero x and y", &mut ctx).unwrap();
            assert_eq!(cmd.payload, "G10 L20 P0 X0 Y0");
        }
    }

    #[test]
    fn test_chain_split_and_blocked_dropped() {
        let resolver = CommandResolver::new();
        let mut ctx = PendantContext::default();
        let cmds = resolver.parse_chained_commands(
            "home then run the job, then probe z and then spindle off",
            &mut ctx,
        );
        let types: Vec<_> = cmds.iter().map(|c| c.command_type).collect();
        assert_eq!(types, vec![CommandType::Home, CommandType::Probe, CommandType::Spindle]);
    }

    #[test]
    fn test_single_utterance_keeps_blocked_reason() {
        let resolver = CommandResolver::new();
        let cmds = resolver.parse_utterance("run the job", &mut PendantContext::default());
        assert_eq!(cmds.len(), 1);
        assert!(cmds[0].is_blocked());
    }

    #[test]
    fn test_undo_and_repeat_through_resolver() {
        let resolver = CommandResolver::new();
        let mut ctx = PendantContext::default();
        assert!(resolver.parse_command("repeat", &mut ctx).unwrap().is_blocked());

        ctx.history
            .set_last_jog([(Axis::X, -10.0), (Axis::Y, 5.0)].into_iter().collect());
        let undo = resolver.parse_command("undo", &mut ctx).unwrap();
        assert_eq!(undo.command_type, CommandType::Undo);
        assert_eq!(vector(&undo), vec![(Axis::X, 10.0), (Axis::Y, -5.0)]);
        assert!(resolver.parse_command("undo", &mut ctx).unwrap().is_blocked());
    }

    #[test]
    fn test_parse_reply() {
        let resolver = CommandResolver::new();
        assert_eq!(resolver.parse_reply("Yes."), Some(Reply::Confirm));
        assert_eq!(resolver.parse_reply("go ahead"), Some(Reply::Confirm));
        assert_eq!(resolver.parse_reply("no, never mind"), Some(Reply::Cancel));
        assert_eq!(resolver.parse_reply("jog left"), None);
    }

    #[derive(Default)]
    struct RecordingListener {
        feeds: Mutex<Vec<f64>>,
        probe_types: Mutex<Vec<ProbeType>>,
    }

    impl SettingsListener for RecordingListener {
        fn on_feed_changed(&self, feed_mm: f64) {
            self.feeds.lock().unwrap().push(feed_mm);
        }
        fn on_step_changed(&self, _: f64) {}
        fn on_probe_type_changed(&self, probe_type: ProbeType) {
            self.probe_types.lock().unwrap().push(probe_type);
        }
    }

    #[test]
    fn test_settings_listener_notified_after_mutation() {
        let listener = Arc::new(RecordingListener::default());
        let resolver = CommandResolver::new().with_settings_listener(listener.clone());
        let mut ctx = PendantContext::default();
        ctx.config.units = UnitsPreference::Imperial;

        resolver.parse_command("set feed rate to 40", &mut ctx).unwrap();
        resolver.parse_command("use the 3d probe", &mut ctx).unwrap();
        assert!(resolver.parse_command("set feed rate to 90000", &mut ctx).is_none());

        let feeds = listener.feeds.lock().unwrap().clone();
        assert_eq!(feeds.len(), 1);
        assert!((feeds[0] - 1016.0).abs() < 1e-9);
        assert_eq!(listener.probe_types.lock().unwrap().clone(), vec![ProbeType::ThreeD]);
    }
}
