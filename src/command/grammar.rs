//! Ordered keyword/regex fallback grammar
//!
//! Rules are evaluated top to bottom and the first rule that produces a
//! result wins. The order is a safety ordering: job start is checked before
//! anything can alias it, STOP beats every motion rule, and the question
//! forms are gated out of the rules that would otherwise move the machine.
//!
//! Each rule pairs a cheap trigger with a builder. A builder may still
//! decline (`NoMatch`) and let the cascade continue, or reject the utterance
//! outright (`Rejected`), which ends the cascade without a command.

use crate::command::history::PendantContext;
use crate::command::instructions::{self, QueryKind, DEFAULT_SPINDLE_RPM, DEFAULT_TOOL};
use crate::command::jog;
use crate::command::types::{Resolution, GRAMMAR_CONFIDENCE};
use crate::core::types::{Axis, ProbeAxis};
use crate::nlu::entities::{find_probe_type, find_spindle_rpm, find_tool_number, find_workspace};
use crate::text::vocab::{
    contains_any, contains_phrase, first_number, has_direction_word, has_jog_verb, has_stop_word,
    is_question, mentioned_axes, parse_number, tokens, FEED_PHRASE_RE, STEP_PHRASE_RE,
};
use tracing::debug;

/// Identifies a grammar rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Job,
    Stop,
    Resume,
    Reset,
    Repeat,
    Undo,
    ToolChange,
    Home,
    Unlock,
    Probe,
    Workspace,
    FeedSet,
    StepSet,
    ProbeTypeSetting,
    Jog,
    Zero,
    DistanceQuery,
    StateQuery,
    Spindle,
    Coolant,
}

type Trigger = fn(&str) -> bool;
type Builder = fn(&str, &mut PendantContext) -> Resolution;

pub struct GrammarRule {
    pub kind: RuleKind,
    trigger: Trigger,
    build: Builder,
}

impl GrammarRule {
    pub fn triggers(&self, text: &str) -> bool {
        (self.trigger)(text)
    }
}

const JOB_VERBS: &[&str] = &["run", "start", "begin", "execute"];
const JOB_NOUNS: &[&str] = &["job", "program", "file", "gcode", "g-code"];
const DISTANCE_PHRASES: &[&str] = &["how far", "distance", "far"];
const PROBE_TYPE_PHRASES: &[&str] = &[
    "probe type", "type", "use", "set", "switch", "change", "select", "what", "which",
];

// Triggers

fn job_trigger(text: &str) -> bool {
    !has_stop_word(text) && contains_any(text, JOB_VERBS) && contains_any(text, JOB_NOUNS)
}

fn resume_trigger(text: &str) -> bool {
    contains_any(text, &["resume", "continue", "unpause", "proceed", "cycle start"])
}

fn reset_trigger(text: &str) -> bool {
    contains_any(text, &["reset", "soft reset"])
}

fn repeat_trigger(text: &str) -> bool {
    contains_any(text, &["repeat", "again", "same again"]) && !contains_phrase(text, "undo")
}

/// "undo", "undo that", "reverse that"; not "undo the last three moves"
fn undo_trigger(text: &str) -> bool {
    if contains_any(text, &["reverse that", "take that back"]) {
        return true;
    }
    let toks = tokens(text);
    match toks.iter().position(|t| *t == "undo") {
        Some(i) => toks[i + 1..].iter().all(|t| *t == "that" || *t == "it"),
        None => false,
    }
}

fn tool_trigger(text: &str) -> bool {
    contains_phrase(text, "tool") && !is_question(text)
}

fn home_trigger(text: &str) -> bool {
    contains_any(text, &["home", "homing"]) && !contains_any(text, DISTANCE_PHRASES)
}

fn unlock_trigger(text: &str) -> bool {
    contains_any(text, &["unlock", "clear alarm", "kill alarm"])
}

fn probe_trigger(text: &str) -> bool {
    contains_any(text, &["probe", "probing", "touch off"])
        && !contains_any(text, PROBE_TYPE_PHRASES)
}

fn workspace_trigger(text: &str) -> bool {
    find_workspace(text).is_some()
        || contains_any(text, &["workspace", "work space", "work offset", "coordinate system"])
}

/// Settings phrasing only; "jog left 10 feed 500" is a jog with an inline feed
fn setting_gate(text: &str) -> bool {
    !has_jog_verb(text) && !has_direction_word(text) && !is_question(text)
}

fn feed_set_trigger(text: &str) -> bool {
    contains_phrase(text, "feed") && setting_gate(text)
}

fn step_set_trigger(text: &str) -> bool {
    contains_phrase(text, "step") && setting_gate(text)
}

fn probe_type_trigger(text: &str) -> bool {
    let about_probe = contains_any(text, &["probe", "plate"]);
    let asked = contains_any(text, &["what", "which"]) && about_probe;
    let chosen = find_probe_type(text).is_some()
        && contains_any(text, &["use", "switch", "set", "change", "select", "probe type"]);
    asked || chosen
}

fn jog_trigger(text: &str) -> bool {
    has_jog_verb(text) && !is_question(text)
}

/// "go to zero" is motion, never a zero-offset command
fn zero_trigger(text: &str) -> bool {
    contains_any(text, &["zero", "origin"])
        && !has_jog_verb(text)
        && !contains_any(text, DISTANCE_PHRASES)
        && !contains_any(text, &["what", "where"])
}

fn distance_query_trigger(text: &str) -> bool {
    distance_query_kind(text).is_some()
}

fn state_query_trigger(text: &str) -> bool {
    state_query_kind(text).is_some()
}

fn spindle_trigger(text: &str) -> bool {
    contains_any(text, &["spindle", "router", "rpm"])
}

fn coolant_trigger(text: &str) -> bool {
    contains_any(text, &["coolant", "flood", "mist"])
}

// Builders

fn build_job(_: &str, ctx: &mut PendantContext) -> Resolution {
    Resolution::Matched(ctx.start_job())
}

fn build_stop(_: &str, _: &mut PendantContext) -> Resolution {
    Resolution::Matched(instructions::stop())
}

fn build_resume(_: &str, _: &mut PendantContext) -> Resolution {
    Resolution::Matched(instructions::resume())
}

fn build_reset(_: &str, _: &mut PendantContext) -> Resolution {
    Resolution::Matched(instructions::reset())
}

fn build_repeat(_: &str, ctx: &mut PendantContext) -> Resolution {
    Resolution::Matched(ctx.repeat_last())
}

fn build_undo(_: &str, ctx: &mut PendantContext) -> Resolution {
    Resolution::Matched(ctx.undo_last_jog())
}

fn build_tool(text: &str, _: &mut PendantContext) -> Resolution {
    let tool = find_tool_number(text).unwrap_or(DEFAULT_TOOL);
    Resolution::Matched(instructions::tool_change(tool))
}

fn build_home(text: &str, _: &mut PendantContext) -> Resolution {
    Resolution::Matched(instructions::home(&mentioned_axes(text)))
}

fn build_unlock(_: &str, _: &mut PendantContext) -> Resolution {
    Resolution::Matched(instructions::unlock())
}

/// Probe axis from the axes mentioned; Z when none
pub fn infer_probe_axis(text: &str) -> ProbeAxis {
    if contains_any(text, &["center", "middle"]) {
        return ProbeAxis::Center;
    }
    match mentioned_axes(text).as_slice() {
        [] | [Axis::Z] => ProbeAxis::Z,
        [Axis::X] => ProbeAxis::X,
        [Axis::Y] => ProbeAxis::Y,
        [Axis::X, Axis::Y] => ProbeAxis::XY,
        _ => ProbeAxis::XYZ,
    }
}

fn build_probe(text: &str, ctx: &mut PendantContext) -> Resolution {
    let probe_type = find_probe_type(text).unwrap_or(ctx.config.probe_type);
    Resolution::Matched(instructions::probe(infer_probe_axis(text), probe_type))
}

fn build_workspace(text: &str, ctx: &mut PendantContext) -> Resolution {
    find_workspace(text)
        .map(|code| ctx.set_workspace(code))
        .into()
}

fn setting_value(text: &str, phrase: &regex::Regex) -> Option<f64> {
    phrase
        .captures(text)
        .and_then(|c| parse_number(&c[1]))
        .or_else(|| first_number(text))
}

fn build_feed_set(text: &str, ctx: &mut PendantContext) -> Resolution {
    match setting_value(text, &FEED_PHRASE_RE) {
        Some(value) => ctx.set_feed(value),
        None => Resolution::NoMatch,
    }
}

fn build_step_set(text: &str, ctx: &mut PendantContext) -> Resolution {
    match setting_value(text, &STEP_PHRASE_RE) {
        Some(value) => ctx.set_step(value),
        None => Resolution::NoMatch,
    }
}

fn build_probe_type(text: &str, ctx: &mut PendantContext) -> Resolution {
    if contains_any(text, &["what", "which"]) {
        return Resolution::Matched(instructions::query(QueryKind::ProbeType));
    }
    find_probe_type(text)
        .map(|t| ctx.set_probe_type(t))
        .into()
}

fn build_jog(text: &str, ctx: &mut PendantContext) -> Resolution {
    jog::parse_compound_jog(text, &ctx.config).into()
}

fn build_zero(text: &str, _: &mut PendantContext) -> Resolution {
    Resolution::Matched(instructions::zero(&mentioned_axes(text)))
}

fn distance_query_kind(text: &str) -> Option<QueryKind> {
    if contains_any(text, &["how far", "distance"]) {
        if contains_any(text, &["zero", "origin"]) {
            return Some(QueryKind::DistanceToZero);
        }
        if contains_phrase(text, "home") {
            return Some(QueryKind::DistanceToHome);
        }
    }
    if contains_any(text, &["travel", "room"])
        && contains_any(text, &["remaining", "left", "have", "how much"])
    {
        return Some(QueryKind::Travel);
    }
    None
}

fn state_query_kind(text: &str) -> Option<QueryKind> {
    if contains_phrase(text, "where am i")
        || (contains_any(text, &["what", "where", "tell", "read"])
            && contains_any(text, &["position", "location", "coordinates"]))
    {
        return Some(QueryKind::Position);
    }
    if contains_any(text, &["what", "machine", "tell"])
        && contains_any(text, &["status", "state", "doing"])
    {
        return Some(QueryKind::Status);
    }
    let asking = contains_any(text, &["what", "tell"]) && !contains_phrase(text, "set");
    if asking && contains_phrase(text, "feed") {
        return Some(QueryKind::Feed);
    }
    if asking && contains_phrase(text, "step") {
        return Some(QueryKind::Step);
    }
    None
}

fn build_distance_query(text: &str, _: &mut PendantContext) -> Resolution {
    distance_query_kind(text).map(instructions::query).into()
}

fn build_state_query(text: &str, _: &mut PendantContext) -> Resolution {
    state_query_kind(text).map(instructions::query).into()
}

fn build_spindle(text: &str, _: &mut PendantContext) -> Resolution {
    let rpm = find_spindle_rpm(text);
    if contains_phrase(text, "off") {
        return Resolution::Matched(instructions::spindle_off());
    }
    let ccw = contains_any(text, &["counterclockwise", "reverse"]);
    if ccw || contains_any(text, &["on", "start", "run", "clockwise"]) {
        let rpm = rpm.unwrap_or(DEFAULT_SPINDLE_RPM);
        return Resolution::Matched(instructions::spindle_on(rpm, ccw));
    }
    rpm.map(instructions::spindle_speed).into()
}

fn build_coolant(text: &str, _: &mut PendantContext) -> Resolution {
    if contains_phrase(text, "off") {
        Resolution::Matched(instructions::coolant_off())
    } else if contains_phrase(text, "mist") {
        Resolution::Matched(instructions::mist_on())
    } else if contains_any(text, &["on", "start", "flood"]) {
        Resolution::Matched(instructions::coolant_on())
    } else {
        Resolution::NoMatch
    }
}

static RULES: &[GrammarRule] = &[
    GrammarRule { kind: RuleKind::Job, trigger: job_trigger, build: build_job },
    GrammarRule { kind: RuleKind::Stop, trigger: has_stop_word, build: build_stop },
    GrammarRule { kind: RuleKind::Resume, trigger: resume_trigger, build: build_resume },
    GrammarRule { kind: RuleKind::Reset, trigger: reset_trigger, build: build_reset },
    GrammarRule { kind: RuleKind::Repeat, trigger: repeat_trigger, build: build_repeat },
    GrammarRule { kind: RuleKind::Undo, trigger: undo_trigger, build: build_undo },
    GrammarRule { kind: RuleKind::ToolChange, trigger: tool_trigger, build: build_tool },
    GrammarRule { kind: RuleKind::Home, trigger: home_trigger, build: build_home },
    GrammarRule { kind: RuleKind::Unlock, trigger: unlock_trigger, build: build_unlock },
    GrammarRule { kind: RuleKind::Probe, trigger: probe_trigger, build: build_probe },
    GrammarRule { kind: RuleKind::Workspace, trigger: workspace_trigger, build: build_workspace },
    GrammarRule { kind: RuleKind::FeedSet, trigger: feed_set_trigger, build: build_feed_set },
    GrammarRule { kind: RuleKind::StepSet, trigger: step_set_trigger, build: build_step_set },
    GrammarRule {
        kind: RuleKind::ProbeTypeSetting,
        trigger: probe_type_trigger,
        build: build_probe_type,
    },
    GrammarRule { kind: RuleKind::Jog, trigger: jog_trigger, build: build_jog },
    GrammarRule { kind: RuleKind::Zero, trigger: zero_trigger, build: build_zero },
    GrammarRule {
        kind: RuleKind::DistanceQuery,
        trigger: distance_query_trigger,
        build: build_distance_query,
    },
    GrammarRule {
        kind: RuleKind::StateQuery,
        trigger: state_query_trigger,
        build: build_state_query,
    },
    GrammarRule { kind: RuleKind::Spindle, trigger: spindle_trigger, build: build_spindle },
    GrammarRule { kind: RuleKind::Coolant, trigger: coolant_trigger, build: build_coolant },
];

/// The rule table, in evaluation order
pub fn rules() -> &'static [GrammarRule] {
    RULES
}

/// First rule whose trigger fires, without building anything
pub fn first_triggered(text: &str) -> Option<RuleKind> {
    RULES.iter().find(|r| r.triggers(text)).map(|r| r.kind)
}

/// Run the cascade over normalized text
pub fn evaluate(text: &str, ctx: &mut PendantContext) -> Resolution {
    for rule in RULES {
        if !rule.triggers(text) {
            continue;
        }
        match (rule.build)(text, ctx) {
            Resolution::Matched(cmd) => {
                debug!(rule = ?rule.kind, command = %cmd.command_type, "grammar matched");
                return Resolution::Matched(cmd.with_confidence(GRAMMAR_CONFIDENCE));
            }
            Resolution::Rejected => {
                debug!(rule = ?rule.kind, "grammar rejected utterance");
                return Resolution::Rejected;
            }
            Resolution::NoMatch => {}
        }
    }
    Resolution::NoMatch
}
