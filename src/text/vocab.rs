//! Lexical tables shared by the intent classifier and the fallback grammar
//!
//! Everything here works on normalized text (lowercase, digits for numbers).

use crate::core::types::{Axis, HomeLocation};
use once_cell::sync::Lazy;
use regex::Regex;

/// Words that halt the machine, whatever else was said
pub const STOP_WORDS: &[&str] = &[
    "stop", "halt", "hold", "pause", "cancel", "abort", "emergency", "e-stop", "e stop",
    "estop", "freeze", "wait",
];

/// Verbs that introduce relative or absolute motion
pub const JOG_VERBS: &[&str] = &["jog", "move", "go", "nudge", "shift", "travel"];

/// Words that turn an utterance into a question
pub const QUESTION_WORDS: &[&str] = &["what", "where", "which", "how", "tell", "read"];

/// Words that name a jog direction
pub const DIRECTION_WORDS: &[&str] = &[
    "left", "right", "forward", "forwards", "front", "back", "backward", "backwards", "rear", "up",
    "down",
];

/// Speed modifiers, most specific first
pub const SPEED_MODIFIERS: &[(&[&str], f64)] = &[
    (&["very slow", "very slowly", "creep", "crawl"], 0.05),
    (&["slow", "slowly", "careful", "carefully", "gently", "gentle"], 0.1),
    (&["fast", "quick", "quickly", "rapid", "rapidly"], 3.0),
    (&["half", "medium"], 0.5),
];

/// A signed number, optionally with a decimal part
pub static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").unwrap());

/// "feed 500", "feed rate of 800", "feed to 1200"
pub static FEED_PHRASE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bfeed(?:\s*rate)?\s*(?:of\s+|to\s+|at\s+|is\s+)?(\d+(?:\.\d+)?)").unwrap()
});

/// "step 0.1", "step size of 5"
pub static STEP_PHRASE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bstep(?:\s*size)?\s*(?:of\s+|to\s+|is\s+)?(\d+(?:\.\d+)?)").unwrap()
});

/// "x plus", "y negative", "z -", "x+"
static AXIS_SIGN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([xyz])\s*(plus|positive|minus|negative|\+|-)").unwrap());

/// "x 10", "y -5.5", "z minus 2"
pub static AXIS_COORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([xyz])\s*(?:=\s*)?(minus\s+|negative\s+)?(-?\d+(?:\.\d+)?)").unwrap());

/// Split text into word tokens, treating commas as separators
pub fn tokens(text: &str) -> Vec<&str> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect()
}

/// Whether `phrase` appears in `text` on word boundaries
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    if words.is_empty() {
        return false;
    }
    let toks = tokens(text);
    toks.windows(words.len()).any(|w| w == words.as_slice())
}

/// Whether any of `phrases` appears in `text` on word boundaries
pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(text, p))
}

/// Whether the utterance contains a STOP-class word
pub fn has_stop_word(text: &str) -> bool {
    contains_any(text, STOP_WORDS)
}

/// Whether the utterance contains a jog verb
pub fn has_jog_verb(text: &str) -> bool {
    contains_any(text, JOG_VERBS)
}

/// Whether the utterance names a jog direction
pub fn has_direction_word(text: &str) -> bool {
    contains_any(text, DIRECTION_WORDS) || !axis_signs(text).is_empty()
}

/// Axes given a direction sign, in utterance order, as (axis, +1 or -1).
///
/// A spoken sign ("x plus 5") is a direction whatever follows. A symbol
/// directly in front of a number ("x -5", "x-5") belongs to a coordinate.
pub fn axis_signs(text: &str) -> Vec<(Axis, f64)> {
    let mut out = Vec::new();
    for caps in AXIS_SIGN_RE.captures_iter(text) {
        let (Some(whole), Some(sign)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let rest = &text[whole.end()..];
        let is_sign = match sign.as_str() {
            "+" | "-" => !rest
                .trim_start()
                .starts_with(|c: char| c.is_ascii_digit() || c == '.'),
            _ => rest
                .chars()
                .next()
                .map_or(true, |c| c.is_whitespace() || c.is_ascii_digit() || c == ','),
        };
        if !is_sign {
            continue;
        }
        let Some(axis) = caps[1].chars().next().and_then(Axis::from_letter) else {
            continue;
        };
        let value = match sign.as_str() {
            "minus" | "negative" | "-" => -1.0,
            _ => 1.0,
        };
        out.push((axis, value));
    }
    out
}

/// Whether the utterance is phrased as a question
pub fn is_question(text: &str) -> bool {
    contains_any(text, QUESTION_WORDS)
}

/// Feed multiplier named in the utterance (1.0 when none)
pub fn speed_modifier(text: &str) -> f64 {
    speed_modifier_word(text).map(|(_, factor)| factor).unwrap_or(1.0)
}

/// First speed-modifier keyword found and its factor
pub fn speed_modifier_word(text: &str) -> Option<(&'static str, f64)> {
    SPEED_MODIFIERS.iter().find_map(|(words, factor)| {
        words
            .iter()
            .find(|w| contains_phrase(text, w))
            .map(|w| (*w, *factor))
    })
}

/// Factor for a speed-modifier keyword
pub fn speed_factor_for(word: &str) -> Option<f64> {
    SPEED_MODIFIERS
        .iter()
        .find(|(words, _)| words.iter().any(|w| *w == word))
        .map(|(_, factor)| *factor)
}

/// Axes mentioned as standalone tokens ("x", "y", "z", "xy", "xyz"), in X/Y/Z order
pub fn mentioned_axes(text: &str) -> Vec<Axis> {
    let toks = tokens(text);
    let mut found = Vec::new();
    for axis in Axis::ALL {
        let letter = axis.letter().to_ascii_lowercase();
        let hit = toks.iter().any(|t| {
            let t = t.trim_end_matches(|c: char| c == '.' || c == '?');
            (t.len() == 1 && t.starts_with(letter))
                || (t.len() > 1
                    && t.len() <= 3
                    && t.chars().all(|c| "xyz".contains(c))
                    && t.contains(letter))
        });
        if hit {
            found.push(axis);
        }
    }
    found
}

/// A spoken jog direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Forward,
    Back,
    Up,
    Down,
    Positive,
    Negative,
}

impl Direction {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            "forward" | "forwards" | "front" => Some(Direction::Forward),
            "back" | "backward" | "backwards" | "rear" => Some(Direction::Back),
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            "plus" | "positive" | "+" => Some(Direction::Positive),
            "minus" | "negative" | "-" => Some(Direction::Negative),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
            Direction::Forward => "FORWARD",
            Direction::Back => "BACK",
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Positive => "POSITIVE",
            Direction::Negative => "NEGATIVE",
        }
    }

    pub fn from_entity(value: &str) -> Option<Self> {
        match value {
            "LEFT" => Some(Direction::Left),
            "RIGHT" => Some(Direction::Right),
            "FORWARD" => Some(Direction::Forward),
            "BACK" => Some(Direction::Back),
            "UP" => Some(Direction::Up),
            "DOWN" => Some(Direction::Down),
            "POSITIVE" => Some(Direction::Positive),
            "NEGATIVE" => Some(Direction::Negative),
            _ => None,
        }
    }

    /// Axis and sign for a spatial direction; `None` for POSITIVE/NEGATIVE,
    /// which need an explicit axis
    pub fn axis_sign(&self, home: HomeLocation) -> Option<(Axis, f64)> {
        match self {
            Direction::Left => Some((Axis::X, -1.0)),
            Direction::Right => Some((Axis::X, 1.0)),
            Direction::Forward => Some((Axis::Y, home.forward_sign())),
            Direction::Back => Some((Axis::Y, -home.forward_sign())),
            Direction::Up => Some((Axis::Z, 1.0)),
            Direction::Down => Some((Axis::Z, -1.0)),
            Direction::Positive | Direction::Negative => None,
        }
    }

    pub fn sign(&self) -> f64 {
        match self {
            Direction::Negative => -1.0,
            _ => 1.0,
        }
    }
}

/// Parse a numeric token
pub fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// First number in the text
pub fn first_number(text: &str) -> Option<f64> {
    NUMBER_RE.find(text).and_then(|m| parse_number(m.as_str()))
}

/// Inline feed and step parameters, plus the text with those sub-phrases blanked out
pub struct InlineParams {
    pub feed: Option<f64>,
    pub step: Option<f64>,
    pub remainder: String,
}

pub fn extract_inline_params(text: &str) -> InlineParams {
    let feed = FEED_PHRASE_RE
        .captures(text)
        .and_then(|c| parse_number(&c[1]));
    let step = STEP_PHRASE_RE
        .captures(text)
        .and_then(|c| parse_number(&c[1]));
    let remainder = FEED_PHRASE_RE.replace_all(text, " ");
    let remainder = STEP_PHRASE_RE.replace_all(&remainder, " ").into_owned();

    InlineParams {
        feed,
        step,
        remainder,
    }
}
