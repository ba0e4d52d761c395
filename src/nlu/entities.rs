//! Entity extraction from normalized text
//!
//! The finders here are shared with the fallback grammar so both resolution
//! paths read tool numbers, spindle speeds and workspaces the same way.

use crate::core::types::ProbeType;
use crate::nlu::intent::{Entity, EntityType};
use crate::text::vocab::{
    contains_any, speed_modifier_word, tokens, Direction, FEED_PHRASE_RE, NUMBER_RE,
    STEP_PHRASE_RE,
};
use once_cell::sync::Lazy;
use regex::Regex;

static TOOL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:tool\s*(?:number\s*|no\s*|#\s*)?(\d+)|t(\d+))\b").unwrap()
});

static RPM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+)\s*rpm\b").unwrap());

static SPINDLE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:spindle|router)\b\D*?(\d+)\b").unwrap());

static PROBE_3D_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b3\s?d\b").unwrap());

static GCODE_WORKSPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bg\s*(5[4-9])\b").unwrap());

static NUMBERED_WORKSPACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:workspace|work space|work offset|coordinate system|offset)\s*(?:number\s*)?([1-6])\b",
    )
    .unwrap()
});

static ORDINAL_WORKSPACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(first|second|third|fourth|fifth|sixth)\s+(?:workspace|work space|work offset|coordinate system)\b",
    )
    .unwrap()
});

/// Tool number named in the utterance
pub fn find_tool_number(text: &str) -> Option<u32> {
    let caps = TOOL_RE.captures(text)?;
    caps.get(1).or_else(|| caps.get(2))?.as_str().parse().ok()
}

/// Spindle speed: a number followed by "rpm", else the first number after "spindle"
pub fn find_spindle_rpm(text: &str) -> Option<u32> {
    RPM_RE
        .captures(text)
        .or_else(|| SPINDLE_NUMBER_RE.captures(text))
        .and_then(|c| c[1].parse().ok())
}

/// Work coordinate system number (54..=59)
pub fn find_workspace(text: &str) -> Option<u8> {
    if let Some(caps) = GCODE_WORKSPACE_RE.captures(text) {
        return caps[1].parse().ok();
    }
    if let Some(caps) = NUMBERED_WORKSPACE_RE.captures(text) {
        let n: u8 = caps[1].parse().ok()?;
        return Some(53 + n);
    }
    let caps = ORDINAL_WORKSPACE_RE.captures(text)?;
    let n = match &caps[1] {
        "first" => 1,
        "second" => 2,
        "third" => 3,
        "fourth" => 4,
        "fifth" => 5,
        _ => 6,
    };
    Some(53 + n)
}

/// Probe type named in the utterance
pub fn find_probe_type(text: &str) -> Option<ProbeType> {
    if contains_any(text, &["3d", "3 d", "three d", "touch probe"]) {
        Some(ProbeType::ThreeD)
    } else if contains_any(text, &["basic", "standard", "touch plate", "plate"]) {
        Some(ProbeType::Basic)
    } else {
        None
    }
}

/// Axis tokens ("x", "xy", "x10", "center"), uppercased, in utterance order
fn axis_values(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for token in tokens(text) {
        if token == "center" || token == "middle" {
            out.push("CENTER".to_string());
            continue;
        }
        let stem = token.trim_end_matches(|c: char| {
            c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | '=')
        });
        if !stem.is_empty() && stem.len() <= 3 && stem.chars().all(|c| "xyz".contains(c)) {
            out.push(stem.to_uppercase());
        }
    }
    out
}

/// DIRECTION entity values in utterance order
pub fn direction_values(text: &str) -> Vec<&'static str> {
    let mut out = Vec::new();
    let tokens = tokens(text);
    for (i, &token) in tokens.iter().enumerate() {
        // "x - 5" is a coordinate
        let before_number = tokens
            .get(i + 1)
            .is_some_and(|next| next.starts_with(|c: char| c.is_ascii_digit() || c == '.'));
        if matches!(token, "-" | "+") && before_number {
            continue;
        }
        let direction = match token {
            "clockwise" => Some(Direction::Positive),
            "counterclockwise" => Some(Direction::Negative),
            _ => Direction::parse(token).or_else(|| {
                // "x+" / "z-"
                let mut chars = token.chars();
                match (chars.next(), chars.next(), chars.next()) {
                    (Some(a), Some(sign), None) if "xyz".contains(a) => Direction::parse(&sign.to_string()),
                    _ => None,
                }
            }),
        };
        if let Some(d) = direction {
            out.push(d.as_str());
        }
    }
    out
}

/// Text with every number that belongs to a parameter phrase blanked out
fn distance_text(text: &str) -> String {
    let mut rest = FEED_PHRASE_RE.replace_all(text, " ").into_owned();
    rest = STEP_PHRASE_RE.replace_all(&rest, " ").into_owned();
    rest = RPM_RE.replace_all(&rest, " ").into_owned();
    rest = SPINDLE_NUMBER_RE.replace_all(&rest, " ").into_owned();
    rest = TOOL_RE.replace_all(&rest, " ").into_owned();
    rest = GCODE_WORKSPACE_RE.replace_all(&rest, " ").into_owned();
    rest = PROBE_3D_RE.replace_all(&rest, " ").into_owned();
    NUMBERED_WORKSPACE_RE.replace_all(&rest, " ").into_owned()
}

/// Extract every entity from normalized text
pub fn extract_entities(text: &str) -> Vec<Entity> {
    let mut entities = Vec::new();

    for axis in axis_values(text) {
        entities.push(Entity::new(EntityType::Axis, axis));
    }
    for direction in direction_values(text) {
        entities.push(Entity::new(EntityType::Direction, direction));
    }
    for m in NUMBER_RE.find_iter(&distance_text(text)) {
        entities.push(Entity::new(EntityType::Distance, m.as_str()));
    }
    if let Some(caps) = FEED_PHRASE_RE.captures(text) {
        entities.push(Entity::new(EntityType::FeedRate, &caps[1]));
    }
    if let Some(caps) = STEP_PHRASE_RE.captures(text) {
        entities.push(Entity::new(EntityType::StepSize, &caps[1]));
    }
    if let Some(rpm) = find_spindle_rpm(text) {
        entities.push(Entity::new(EntityType::SpindleRpm, rpm.to_string()));
    }
    if let Some(tool) = find_tool_number(text) {
        entities.push(Entity::new(EntityType::ToolNumber, tool.to_string()));
    }
    if let Some(probe_type) = find_probe_type(text) {
        entities.push(Entity::new(EntityType::ProbeType, probe_type.as_str()));
    }
    if let Some(n) = find_workspace(text) {
        entities.push(Entity::new(EntityType::Workspace, format!("G{}", n)));
    }
    if let Some((word, _)) = speed_modifier_word(text) {
        entities.push(Entity::new(EntityType::SpeedModifier, word));
    }

    entities
}
