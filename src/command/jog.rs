//! Compound jog parsing
//!
//! "jog left 10 and forward 5 slowly" becomes one relative move with a
//! per-axis vector. Directions accumulate across segments; speed words scale
//! the feed; an inline "step N" replaces every magnitude.

use crate::command::instructions;
use crate::command::types::Command;
use crate::core::config::ParserConfig;
use crate::core::types::{Axis, JogVector};
use crate::text::vocab::{
    axis_signs, contains_phrase, extract_inline_params, first_number, parse_number,
    speed_modifier, tokens, Direction, AXIS_COORD_RE,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// Slowest jog feed in mm/min
pub const MIN_JOG_FEED: f64 = 10.0;
/// Fastest jog feed in mm/min
pub const MAX_JOG_FEED: f64 = 50_000.0;

static SEGMENT_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+and\s+|,").unwrap());

/// Feed after applying a multiplier, clamped to the jog range
pub fn scaled_feed(base_mm: f64, factor: f64) -> f64 {
    (base_mm * factor).clamp(MIN_JOG_FEED, MAX_JOG_FEED)
}

/// Replace every axis magnitude with `step_mm`, keeping signs
pub fn apply_step_override(vector: &mut JogVector, step_mm: f64) {
    for value in vector.values_mut() {
        *value = step_mm.abs().copysign(*value);
    }
}

fn accumulate(vector: &mut JogVector, axis: Axis, delta: f64) {
    *vector.entry(axis).or_insert(0.0) += delta;
}

/// "left 10 and forward 5" -> ["left 10", "forward 5"]
pub fn jog_segments(text: &str) -> impl Iterator<Item = &str> {
    SEGMENT_SPLIT_RE.split(text)
}

/// Magnitude in mm for every direction in one segment: its own number, else the step
pub fn segment_distance(segment: &str, config: &ParserConfig) -> f64 {
    match first_number(segment) {
        Some(n) => config.units.to_mm(n.abs()),
        None => config.step_size,
    }
}

/// Parse a relative jog; falls back to an absolute move when no direction was given
pub fn parse_compound_jog(text: &str, config: &ParserConfig) -> Option<Command> {
    let params = extract_inline_params(text);
    let mut vector = JogVector::new();
    let mut moved = false;

    for segment in jog_segments(&params.remainder) {
        let distance = segment_distance(segment, config);

        for (axis, sign) in axis_signs(segment) {
            accumulate(&mut vector, axis, sign * distance);
            moved = true;
        }

        for token in tokens(segment) {
            let Some((axis, sign)) =
                Direction::parse(token).and_then(|d| d.axis_sign(config.home_location))
            else {
                continue;
            };
            accumulate(&mut vector, axis, sign * distance);
            moved = true;
        }
    }

    if !moved {
        return parse_absolute_move(text, config);
    }

    vector.retain(|_, v| v.abs() > f64::EPSILON);
    if vector.is_empty() {
        tracing::debug!(text, "jog directions cancel out");
        return None;
    }

    if let Some(step) = params.step {
        apply_step_override(&mut vector, config.units.to_mm(step));
    }

    let base_feed = params
        .feed
        .map(|f| config.units.to_mm(f))
        .unwrap_or(config.feed_rate);
    let feed = scaled_feed(base_feed, speed_modifier(text));

    Some(instructions::jog(vector, feed, config.units))
}

/// "move x 10 y -5", "go to machine x 0": absolute coordinates in display units
pub fn parse_absolute_move(text: &str, config: &ParserConfig) -> Option<Command> {
    let mut coords = JogVector::new();

    for caps in AXIS_COORD_RE.captures_iter(text) {
        let Some(axis) = caps[1].chars().next().and_then(Axis::from_letter) else {
            continue;
        };
        let Some(mut value) = parse_number(&caps[3]) else {
            continue;
        };
        if caps.get(2).is_some() {
            value = -value.abs();
        }
        coords.insert(axis, config.units.to_mm(value));
    }

    if coords.is_empty() {
        return None;
    }

    let machine_frame = contains_phrase(text, "machine");
    Some(instructions::move_to(&coords, machine_frame, config.units))
}
