//! Transcript normalization
//!
//! Speech-to-text output is lowercased and cleaned, known misrecognitions of
//! command words are rewritten, near-miss tokens are snapped to the command
//! vocabulary, and spoken numbers become digits. The pipeline is stateless
//! and idempotent: normalizing normalized text changes nothing.

use crate::text::fuzzy::find_best_match;
use ahash::AHashSet;
use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum similarity for snapping a token to the command vocabulary
pub const CORRECTION_THRESHOLD: f64 = 0.85;

/// Tokens shorter than this are never fuzzy-corrected
const MIN_CORRECTION_LEN: usize = 3;

static THOUSANDS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d),(\d{3})\b").unwrap());

/// Known misrecognitions, applied in order on word boundaries.
/// No replacement may itself appear as a source.
const MISRECOGNITIONS: &[(&str, &str)] = &[
    ("whats", "what is"),
    ("wheres", "where is"),
    ("um", ""),
    ("uh", ""),
    ("erm", ""),
    ("please", ""),
    ("one more time", "again"),
    ("write", "right"),
    ("rite", "right"),
    ("wright", "right"),
    ("lift", "left"),
    ("laughed", "left"),
    ("loft", "left"),
    ("ex", "x"),
    ("eggs", "x"),
    ("axe", "x"),
    ("why", "y"),
    ("wye", "y"),
    ("zed", "z"),
    ("zee", "z"),
    ("for word", "forward"),
    ("four word", "forward"),
    ("foreword", "forward"),
    ("jock", "jog"),
    ("jug", "jog"),
    ("jogs", "jog"),
    ("jogged", "jog"),
    ("homes", "home"),
    ("hone", "home"),
    ("robe", "probe"),
    ("probes", "probe"),
    ("spinal", "spindle"),
    ("cool and", "coolant"),
    ("coolants", "coolant"),
    ("hero", "zero"),
    ("xero", "zero"),
    ("zeros", "zero"),
    ("centre", "center"),
    ("on lock", "unlock"),
    ("unlocked", "unlock"),
    ("feed right", "feed rate"),
    ("feet rate", "feed rate"),
    ("speed rate", "feed rate"),
    ("steps", "step"),
    ("step sides", "step size"),
    ("millimetres", "millimeters"),
    ("millimeter", "millimeters"),
    ("mill meters", "millimeters"),
    ("ccw", "counterclockwise"),
    ("cw", "clockwise"),
    ("counter clockwise", "counterclockwise"),
    ("anti clockwise", "counterclockwise"),
    ("anticlockwise", "counterclockwise"),
    ("e stop", "e-stop"),
    ("estop", "e-stop"),
];

/// Command vocabulary that long near-miss tokens snap to
const CANONICAL_WORDS: &[&str] = &[
    "stop", "resume", "reset", "home", "homing", "unlock", "probe", "probing", "zero", "origin",
    "spindle", "coolant", "mist", "flood", "feed", "step", "left", "right", "forward", "backward",
    "position", "location", "coordinates", "status", "workspace", "repeat", "again", "undo",
    "machine", "millimeters", "inches", "distance", "travel", "remaining", "center", "continue",
    "emergency", "cancel", "confirm", "counterclockwise", "change", "minus", "plus", "positive",
    "negative", "rapid", "quickly", "slowly", "carefully", "gently", "speed", "rate", "size",
    "tool", "alarm", "cycle", "start", "execute", "program", "corner", "increment",
];

/// Ordinary words that must never be "corrected"
const COMMON_WORDS: &[&str] = &[
    "the", "and", "then", "what", "where", "set", "to", "is", "my", "of", "current", "how", "far",
    "much", "turn", "off", "on", "with", "at", "by", "run", "job", "go", "move", "jog", "nudge",
    "shift", "up", "down", "front", "rear", "back", "backwards", "forwards", "slow", "fast",
    "quick", "half", "medium", "very", "creep", "crawl", "careful", "gentle", "yes", "yeah", "no",
    "okay", "clockwise", "axis", "axes", "all", "tell", "read", "which", "type", "plate", "touch",
    "basic", "standard", "use", "swap", "load", "switch", "number", "file", "gcode", "begin",
    "proceed", "unpause", "halt", "hold", "pause", "abort", "freeze", "wait", "e-stop", "kill",
    "clear", "router", "work", "space", "offset", "system", "first", "second", "third", "fourth",
    "fifth", "sixth", "room", "left", "inch", "rpm", "mist", "doing", "state", "that", "last",
    "take", "reverse", "same", "there", "here", "this", "want", "need", "can", "you", "now",
    "again", "never", "mind", "nope", "yep", "correct", "affirmative", "negative", "ahead",
];

const NUMBER_WORDS: &[&str] = &[
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
    "hundred", "thousand", "point", "dot",
];

/// Stateless transcript normalizer
pub struct TextNormalizer {
    substitutions: Vec<(Regex, &'static str)>,
    known_words: AHashSet<&'static str>,
}

impl TextNormalizer {
    pub fn new() -> Self {
        let substitutions = MISRECOGNITIONS
            .iter()
            .map(|(from, to)| {
                let words: Vec<String> = from.split_whitespace().map(regex::escape).collect();
                let pattern = format!(r"\b{}\b", words.join(r"\s+"));
                // Patterns are escaped literals, so they always compile
                (Regex::new(&pattern).expect("escaped literal pattern"), *to)
            })
            .collect();

        let known_words = CANONICAL_WORDS
            .iter()
            .chain(COMMON_WORDS)
            .chain(NUMBER_WORDS)
            .chain(MISRECOGNITIONS.iter().map(|(_, to)| to))
            .copied()
            .collect();

        Self {
            substitutions,
            known_words,
        }
    }

    /// Run the full pipeline on one utterance
    pub fn normalize(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let cleaned = strip_punctuation(&lowered);
        let without_commas = tidy_commas(&strip_thousands_separators(&cleaned));
        let substituted = self.apply_substitutions(&without_commas);
        let corrected = self.correct_tokens(&substituted);
        let numbered = convert_spoken_numbers(&corrected);
        let normalized = collapse_whitespace(&numbered);
        tracing::trace!(input = text, output = %normalized, "normalized transcript");
        normalized
    }

    fn apply_substitutions(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (re, replacement) in &self.substitutions {
            if re.is_match(&out) {
                out = re.replace_all(&out, *replacement).into_owned();
            }
        }
        out
    }

    fn correct_tokens(&self, text: &str) -> String {
        text.split_whitespace()
            .map(|token| {
                let (word, comma) = split_trailing_comma(token);
                if word.chars().count() < MIN_CORRECTION_LEN
                    || word.chars().any(|c| c.is_ascii_digit())
                    || self.known_words.contains(word)
                {
                    return token.to_string();
                }
                match find_best_match(word, CANONICAL_WORDS, CORRECTION_THRESHOLD) {
                    Some(canonical) => format!("{}{}", canonical, comma),
                    None => token.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop sentence punctuation; keep commas, hyphens, signs and decimal points
fn strip_punctuation(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());

    for (i, &c) in chars.iter().enumerate() {
        match c {
            '\'' | '\u{2019}' => {}
            '.' => {
                let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
                let next_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
                if prev_digit && next_digit {
                    out.push('.');
                } else {
                    out.push(' ');
                }
            }
            c if c.is_alphanumeric() || c.is_whitespace() => out.push(c),
            ',' | '-' | '+' | '=' => out.push(c),
            _ => out.push(' '),
        }
    }

    out
}

fn strip_thousands_separators(text: &str) -> String {
    let mut out = text.to_string();
    while THOUSANDS_RE.is_match(&out) {
        out = THOUSANDS_RE.replace_all(&out, "$1$2").into_owned();
    }
    out
}

/// Attach every comma to the word before it ("left ,right" -> "left, right");
/// commas with no word before them are dropped
fn tidy_commas(text: &str) -> String {
    let spaced = text.replace(',', ", ");
    let mut out: Vec<String> = Vec::new();

    for token in spaced.split_whitespace() {
        let word = token.trim_matches(',');
        let has_comma = token.ends_with(',');
        if word.is_empty() {
            if let Some(prev) = out.last_mut() {
                if !prev.ends_with(',') {
                    prev.push(',');
                }
            }
            continue;
        }
        let mut w = word.to_string();
        if has_comma {
            w.push(',');
        }
        out.push(w);
    }

    out.join(" ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_trailing_comma(token: &str) -> (&str, &str) {
    match token.strip_suffix(',') {
        Some(word) => (word, ","),
        None => (token, ""),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberWord {
    Digit(u64),
    Teen(u64),
    Tens(u64),
    Hundred,
    Thousand,
    Point,
}

fn classify_number_word(word: &str) -> Option<NumberWord> {
    let w = match word {
        "zero" => NumberWord::Digit(0),
        "one" => NumberWord::Digit(1),
        "two" => NumberWord::Digit(2),
        "three" => NumberWord::Digit(3),
        "four" => NumberWord::Digit(4),
        "five" => NumberWord::Digit(5),
        "six" => NumberWord::Digit(6),
        "seven" => NumberWord::Digit(7),
        "eight" => NumberWord::Digit(8),
        "nine" => NumberWord::Digit(9),
        "ten" => NumberWord::Teen(10),
        "eleven" => NumberWord::Teen(11),
        "twelve" => NumberWord::Teen(12),
        "thirteen" => NumberWord::Teen(13),
        "fourteen" => NumberWord::Teen(14),
        "fifteen" => NumberWord::Teen(15),
        "sixteen" => NumberWord::Teen(16),
        "seventeen" => NumberWord::Teen(17),
        "eighteen" => NumberWord::Teen(18),
        "nineteen" => NumberWord::Teen(19),
        "twenty" => NumberWord::Tens(20),
        "thirty" => NumberWord::Tens(30),
        "forty" => NumberWord::Tens(40),
        "fifty" => NumberWord::Tens(50),
        "sixty" => NumberWord::Tens(60),
        "seventy" => NumberWord::Tens(70),
        "eighty" => NumberWord::Tens(80),
        "ninety" => NumberWord::Tens(90),
        "hundred" => NumberWord::Hundred,
        "thousand" => NumberWord::Thousand,
        "point" | "dot" => NumberWord::Point,
        _ => return None,
    };
    Some(w)
}

/// What the previous token of a number run was
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunTail {
    /// a single digit or a teen
    Small,
    Tens,
    Hundred,
    Thousand,
    /// an integer already written as digits
    Numeric,
}

fn is_integer_token(word: &str) -> bool {
    !word.is_empty() && word.len() <= 9 && word.chars().all(|c| c.is_ascii_digit())
}

/// Decimal digits following a "point" at `idx`, and how many tokens they span
fn decimal_digits(words: &[&str], idx: usize) -> Option<(String, usize, bool)> {
    let mut digits = String::new();
    let mut i = idx;
    let mut comma = false;

    while i < words.len() {
        let (w, c) = split_trailing_comma(words[i]);
        match classify_number_word(w) {
            Some(NumberWord::Digit(d)) => digits.push_str(&d.to_string()),
            _ if is_integer_token(w) => {
                digits.push_str(w);
                i += 1;
                comma = !c.is_empty();
                break;
            }
            _ => break,
        }
        i += 1;
        if !c.is_empty() {
            comma = true;
            break;
        }
    }

    (!digits.is_empty()).then_some((digits, i - idx, comma))
}

/// Parse a number phrase starting at `start`; returns its digits and the token count
fn parse_number_at(words: &[&str], start: usize) -> Option<(String, usize)> {
    let (first, first_comma) = split_trailing_comma(words[start]);
    let mut total: u64 = 0;
    let mut current: u64;
    let mut tail: RunTail;
    let mut decimals: Option<String> = None;
    let mut idx = start + 1;
    let mut comma = !first_comma.is_empty();

    match classify_number_word(first) {
        Some(NumberWord::Digit(0)) => {
            // "zero point five"; a bare "zero" stays a word
            if !first_comma.is_empty() {
                return None;
            }
            let (next, next_comma) = split_trailing_comma(words.get(start + 1)?);
            if classify_number_word(next) != Some(NumberWord::Point) || !next_comma.is_empty() {
                return None;
            }
            let (digits, used, c) = decimal_digits(words, start + 2)?;
            return Some((decimal_string(0, &digits, c), 2 + used));
        }
        Some(NumberWord::Point) => {
            // "point five"
            if !first_comma.is_empty() {
                return None;
            }
            let (digits, used, c) = decimal_digits(words, start + 1)?;
            return Some((decimal_string(0, &digits, c), 1 + used));
        }
        Some(NumberWord::Digit(d)) => {
            current = d;
            tail = RunTail::Small;
        }
        Some(NumberWord::Teen(t)) => {
            current = t;
            tail = RunTail::Small;
        }
        Some(NumberWord::Tens(t)) => {
            current = t;
            tail = RunTail::Tens;
        }
        Some(NumberWord::Hundred) => {
            current = 100;
            tail = RunTail::Hundred;
        }
        Some(NumberWord::Thousand) => {
            total = 1000;
            current = 0;
            tail = RunTail::Thousand;
        }
        None if is_integer_token(first) => {
            current = first.parse().ok()?;
            tail = RunTail::Numeric;
        }
        None => return None,
    }

    let mut consumed_words = false;

    while !comma && idx < words.len() {
        let (w, c) = split_trailing_comma(words[idx]);

        let Some(class) = classify_number_word(w) else {
            // "one hundred and five"
            let joins = w == "and"
                && c.is_empty()
                && matches!(tail, RunTail::Hundred | RunTail::Thousand)
                && words.get(idx + 1).is_some_and(|next| {
                    matches!(
                        classify_number_word(split_trailing_comma(next).0),
                        Some(NumberWord::Digit(1..)) | Some(NumberWord::Teen(_)) | Some(NumberWord::Tens(_))
                    )
                });
            if joins {
                idx += 1;
                continue;
            }
            break;
        };

        match (tail, class) {
            (RunTail::Tens, NumberWord::Digit(d)) if d > 0 => {
                current += d;
                tail = RunTail::Small;
            }
            (RunTail::Hundred | RunTail::Thousand, NumberWord::Digit(d)) if d > 0 => {
                current += d;
                tail = RunTail::Small;
            }
            (RunTail::Hundred | RunTail::Thousand, NumberWord::Teen(t)) => {
                current += t;
                tail = RunTail::Small;
            }
            (RunTail::Hundred | RunTail::Thousand, NumberWord::Tens(t)) => {
                current += t;
                tail = RunTail::Tens;
            }
            (RunTail::Small | RunTail::Tens | RunTail::Numeric, NumberWord::Hundred)
                if current > 0 && current < 100 =>
            {
                current *= 100;
                tail = RunTail::Hundred;
            }
            (
                RunTail::Small | RunTail::Tens | RunTail::Hundred | RunTail::Numeric,
                NumberWord::Thousand,
            ) if total == 0 && current > 0 => {
                total = current * 1000;
                current = 0;
                tail = RunTail::Thousand;
            }
            (_, NumberWord::Point) if c.is_empty() => {
                let Some((digits, used, dc)) = decimal_digits(words, idx + 1) else {
                    break;
                };
                decimals = Some(digits);
                idx += 1 + used;
                comma = dc;
                consumed_words = true;
                break;
            }
            _ => break,
        }

        consumed_words = true;
        idx += 1;
        comma = !c.is_empty();
    }

    if tail == RunTail::Numeric && !consumed_words {
        return None;
    }

    let value = total + current;
    let s = match decimals {
        Some(d) => decimal_string(value, &d, comma),
        None if comma => format!("{},", value),
        None => value.to_string(),
    };
    Some((s, idx - start))
}

fn decimal_string(whole: u64, digits: &str, comma: bool) -> String {
    format!("{}.{}{}", whole, digits, if comma { "," } else { "" })
}

/// Replace spoken number phrases with digits
fn convert_spoken_numbers(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut out: Vec<String> = Vec::with_capacity(words.len());
    let mut i = 0;

    while i < words.len() {
        match parse_number_at(&words, i) {
            Some((number, used)) => {
                out.push(number);
                i += used.max(1);
            }
            None => {
                out.push(words[i].to_string());
                i += 1;
            }
        }
    }

    out.join(" ")
}
