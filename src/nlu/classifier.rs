//! Keyword-signature intent classifier
//!
//! Each signature names an intent, a list of keyword groups that must all be
//! present (any word of a group will do), entity types it needs, words that
//! rule it out, and an optional extra predicate. Every matching signature is
//! scored and the best one wins; near-ties between different intents lower
//! the confidence so the caller falls back to the grammar.

use crate::nlu::entities::extract_entities;
use crate::nlu::intent::{Entity, EntityType, Intent, IntentResult};
use crate::text::vocab::{
    contains_any, has_direction_word, has_jog_verb, has_stop_word, tokens, JOG_VERBS,
    QUESTION_WORDS,
};

// Scores are kept in hundredths so margins compare exactly.

/// Base score of a signature whose keyword groups all matched
pub const BASE_SCORE: u32 = 70;
/// Added per matched keyword group
pub const GROUP_BONUS: u32 = 10;
/// Added per required entity present
pub const ENTITY_BONUS: u32 = 5;
/// Ceiling for any keyword score
pub const MAX_SCORE: u32 = 98;
/// Two intents closer than this are treated as ambiguous
pub const AMBIGUITY_MARGIN: u32 = 5;
/// Score removed from an ambiguous result
pub const AMBIGUITY_PENALTY: u32 = 20;
/// Confidence when a STOP-class word is heard
pub const STOP_CONFIDENCE: f32 = 0.99;

/// Classifies normalized text into an intent with typed entities
pub trait IntentResolver: Send + Sync {
    fn resolve(&self, text: &str) -> IntentResult;
}

type Predicate = fn(&str, &[Entity]) -> bool;

struct Signature {
    intent: Intent,
    groups: &'static [&'static [&'static str]],
    required: &'static [EntityType],
    excluded: &'static [&'static str],
    predicate: Option<Predicate>,
}

impl Signature {
    fn score(&self, text: &str, entities: &[Entity]) -> Option<u32> {
        if self.groups.iter().any(|g| !contains_any(text, g)) {
            return None;
        }
        if self
            .required
            .iter()
            .any(|t| !entities.iter().any(|e| e.entity_type == *t))
        {
            return None;
        }
        if contains_any(text, self.excluded) {
            return None;
        }
        if let Some(predicate) = self.predicate {
            if !predicate(text, entities) {
                return None;
            }
        }

        let score = BASE_SCORE
            + GROUP_BONUS * self.groups.len() as u32
            + ENTITY_BONUS * self.required.len() as u32;
        Some(score.min(MAX_SCORE))
    }
}


fn no_direction(text: &str, entities: &[Entity]) -> bool {
    !has_direction_word(text) && !entities.iter().any(|e| e.entity_type == EntityType::Direction)
}

fn not_a_jog(text: &str, _: &[Entity]) -> bool {
    !has_jog_verb(text) && !has_direction_word(text)
}

fn not_a_question(text: &str, _: &[Entity]) -> bool {
    !contains_any(text, QUESTION_WORDS)
}

/// "undo" with nothing after it
fn bare_undo(text: &str, _: &[Entity]) -> bool {
    let toks = tokens(text);
    match toks.iter().position(|t| *t == "undo") {
        Some(i) => i + 1 == toks.len(),
        None => true,
    }
}

static SIGNATURES: &[Signature] = &[
    Signature {
        intent: Intent::StartJob,
        groups: &[
            &["run", "start", "begin", "execute"],
            &["job", "program", "file", "gcode", "g-code"],
        ],
        required: &[],
        excluded: &[],
        predicate: None,
    },
    Signature {
        intent: Intent::Resume,
        groups: &[&["resume", "continue", "unpause", "proceed", "cycle start"]],
        required: &[],
        excluded: &[],
        predicate: None,
    },
    Signature {
        intent: Intent::Reset,
        groups: &[&["reset", "soft reset"]],
        required: &[],
        excluded: &[],
        predicate: None,
    },
    Signature {
        intent: Intent::Repeat,
        groups: &[&["repeat", "again", "same again"]],
        required: &[],
        excluded: &["undo"],
        predicate: None,
    },
    Signature {
        intent: Intent::Undo,
        groups: &[&["undo", "reverse that", "take that back"]],
        required: &[],
        excluded: &[],
        predicate: Some(bare_undo),
    },
    Signature {
        intent: Intent::ToolChange,
        groups: &[&["tool"], &["change", "swap", "load", "switch"]],
        required: &[],
        excluded: &[],
        predicate: None,
    },
    Signature {
        intent: Intent::ToolChange,
        groups: &[&["tool"]],
        required: &[EntityType::ToolNumber],
        excluded: &[],
        predicate: None,
    },
    Signature {
        intent: Intent::Home,
        groups: &[&["home", "homing"]],
        required: &[],
        excluded: &["how far", "distance", "far"],
        predicate: None,
    },
    Signature {
        intent: Intent::Unlock,
        groups: &[&["unlock", "clear alarm", "kill alarm"]],
        required: &[],
        excluded: &[],
        predicate: None,
    },
    Signature {
        intent: Intent::Probe,
        groups: &[&["probe", "probing", "touch off"]],
        required: &[],
        excluded: &[
            "probe type", "use", "set", "switch", "change", "what", "which",
        ],
        predicate: None,
    },
    Signature {
        intent: Intent::SetProbeType,
        groups: &[&["probe type", "use", "switch to", "set probe", "change probe"]],
        required: &[EntityType::ProbeType],
        excluded: &["what", "which"],
        predicate: None,
    },
    Signature {
        intent: Intent::QueryProbeType,
        groups: &[&["what", "which", "tell"], &["probe type", "probe"]],
        required: &[],
        excluded: &["set"],
        predicate: None,
    },
    Signature {
        intent: Intent::SetWorkspace,
        groups: &[&[
            "workspace", "work space", "work offset", "coordinate system", "switch", "use",
        ]],
        required: &[EntityType::Workspace],
        excluded: &[],
        predicate: None,
    },
    Signature {
        intent: Intent::SetFeed,
        groups: &[&["feed", "feed rate"]],
        required: &[EntityType::FeedRate],
        excluded: &[],
        predicate: Some(not_a_jog),
    },
    Signature {
        intent: Intent::SetStep,
        groups: &[&["step", "step size"]],
        required: &[EntityType::StepSize],
        excluded: &[],
        predicate: Some(not_a_jog),
    },
    Signature {
        intent: Intent::Jog,
        groups: &[JOG_VERBS],
        required: &[EntityType::Direction],
        excluded: &["spindle", "router", "coolant", "clockwise", "counterclockwise"],
        predicate: Some(not_a_question),
    },
    Signature {
        intent: Intent::Jog,
        groups: &[],
        required: &[EntityType::Direction],
        excluded: &["spindle", "router", "coolant", "clockwise", "counterclockwise"],
        predicate: Some(not_a_question),
    },
    Signature {
        intent: Intent::MoveAbsolute,
        groups: &[&["move", "go", "goto"]],
        required: &[EntityType::Axis, EntityType::Distance],
        excluded: &[],
        predicate: Some(no_direction),
    },
    Signature {
        intent: Intent::ZeroAxis,
        groups: &[&["zero", "origin"]],
        required: &[],
        excluded: &["how far", "distance", "far", "go", "move", "jog", "what", "where"],
        predicate: None,
    },
    Signature {
        intent: Intent::QueryDistanceToZero,
        groups: &[&["how far", "distance"], &["zero", "origin"]],
        required: &[],
        excluded: &[],
        predicate: None,
    },
    Signature {
        intent: Intent::QueryDistanceToHome,
        groups: &[&["how far", "distance"], &["home"]],
        required: &[],
        excluded: &[],
        predicate: None,
    },
    Signature {
        intent: Intent::QueryTravelRemaining,
        groups: &[&["travel", "room"], &["remaining", "left", "have", "how much"]],
        required: &[],
        excluded: &[],
        predicate: None,
    },
    Signature {
        intent: Intent::QueryPosition,
        groups: &[
            &["what", "where", "tell", "read"],
            &["position", "location", "coordinates", "where am i"],
        ],
        required: &[],
        excluded: &[],
        predicate: None,
    },
    Signature {
        intent: Intent::QueryStatus,
        groups: &[&["what", "machine", "tell"], &["status", "state", "doing"]],
        required: &[],
        excluded: &[],
        predicate: None,
    },
    Signature {
        intent: Intent::QueryFeed,
        groups: &[&["what", "tell"], &["feed", "feed rate"]],
        required: &[],
        excluded: &["set"],
        predicate: None,
    },
    Signature {
        intent: Intent::QueryStep,
        groups: &[&["what", "tell"], &["step", "step size"]],
        required: &[],
        excluded: &["set"],
        predicate: None,
    },
    Signature {
        intent: Intent::SpindleOn,
        groups: &[
            &["spindle", "router"],
            &["on", "start", "run", "clockwise", "counterclockwise"],
        ],
        required: &[],
        excluded: &["off"],
        predicate: None,
    },
    Signature {
        intent: Intent::SpindleOff,
        groups: &[&["spindle", "router"], &["off"]],
        required: &[],
        excluded: &[],
        predicate: None,
    },
    Signature {
        intent: Intent::SetSpindleSpeed,
        groups: &[&["spindle", "router", "rpm"], &["speed", "rpm", "set", "to"]],
        required: &[EntityType::SpindleRpm],
        excluded: &["on", "off", "start", "clockwise", "counterclockwise"],
        predicate: None,
    },
    Signature {
        intent: Intent::CoolantOn,
        groups: &[&["coolant", "flood"], &["on", "start"]],
        required: &[],
        excluded: &["off", "mist"],
        predicate: None,
    },
    Signature {
        intent: Intent::CoolantOff,
        groups: &[&["coolant", "flood", "mist"], &["off"]],
        required: &[],
        excluded: &[],
        predicate: None,
    },
    Signature {
        intent: Intent::MistOn,
        groups: &[&["mist"], &["on", "start"]],
        required: &[],
        excluded: &["off"],
        predicate: None,
    },
    Signature {
        intent: Intent::Confirm,
        groups: &[&[
            "yes", "yeah", "yep", "confirm", "confirmed", "affirmative", "go ahead", "do it",
            "correct", "ok", "okay",
        ]],
        required: &[],
        excluded: &["again"],
        predicate: None,
    },
    Signature {
        intent: Intent::Cancel,
        groups: &[&["no", "nope", "never mind", "nevermind"]],
        required: &[],
        excluded: &[],
        predicate: None,
    },
];

/// Rule-based classifier over a fixed signature table
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordIntentResolver;

impl KeywordIntentResolver {
    pub fn new() -> Self {
        Self
    }
}

impl IntentResolver for KeywordIntentResolver {
    fn resolve(&self, text: &str) -> IntentResult {
        let entities = extract_entities(text);

        if has_stop_word(text) {
            return IntentResult::new(Intent::Stop, STOP_CONFIDENCE, entities);
        }

        let mut best: Option<(Intent, u32)> = None;
        let mut runner_up: Option<u32> = None;

        for signature in SIGNATURES {
            let Some(score) = signature.score(text, &entities) else {
                continue;
            };
            match best {
                Some((intent, best_score)) if score <= best_score => {
                    if intent != signature.intent {
                        runner_up = Some(runner_up.map_or(score, |r| r.max(score)));
                    }
                }
                Some((intent, best_score)) => {
                    if intent != signature.intent {
                        runner_up = Some(best_score);
                    }
                    best = Some((signature.intent, score));
                }
                None => best = Some((signature.intent, score)),
            }
        }

        let Some((intent, mut score)) = best else {
            return IntentResult::new(Intent::Unknown, 0.0, entities);
        };

        if runner_up.is_some_and(|r| score - r < AMBIGUITY_MARGIN) {
            tracing::debug!(?intent, score, runner_up, "ambiguous intent");
            score -= AMBIGUITY_PENALTY;
        }

        IntentResult::new(intent, score as f32 / 100.0, entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> IntentResult {
        KeywordIntentResolver::new().resolve(text)
    }

    #[test]
    fn test_stop_word_forces_stop() {
        let result = classify("stop and run the job");
        assert_eq!(result.intent, Intent::Stop);
        assert_eq!(result.confidence, STOP_CONFIDENCE);
        assert_eq!(classify("hold on").intent, Intent::Stop);
    }

    #[test]
    fn test_compound_jog() {
        let result = classify("jog left 10 and forward 5");
        assert_eq!(result.intent, Intent::Jog);
        assert!(result.confidence >= 0.84);
    }

    #[test]
    fn test_bare_direction_is_jog_with_lower_confidence() {
        let result = classify("left 10");
        assert_eq!(result.intent, Intent::Jog);
        assert!(result.confidence < classify("jog left 10").confidence);
    }

    #[test]
    fn test_move_absolute_needs_no_direction() {
        assert_eq!(classify("move x 10 y 20").intent, Intent::MoveAbsolute);
        assert_eq!(classify("move x plus 5").intent, Intent::Jog);
        assert_eq!(classify("move to x -5 y 10").intent, Intent::MoveAbsolute);
        assert_eq!(classify("go to x-5").intent, Intent::MoveAbsolute);
    }

    #[test]
    fn test_queries() {
        assert_eq!(classify("what is my position").intent, Intent::QueryPosition);
        assert_eq!(classify("what is the feed rate").intent, Intent::QueryFeed);
        assert_eq!(classify("how far to zero").intent, Intent::QueryDistanceToZero);
        assert_eq!(classify("how far from home").intent, Intent::QueryDistanceToHome);
        assert_eq!(
            classify("how much travel is left").intent,
            Intent::QueryTravelRemaining
        );
        assert_eq!(classify("which probe type").intent, Intent::QueryProbeType);
    }

    #[test]
    fn test_settings() {
        assert_eq!(classify("set feed rate 500").intent, Intent::SetFeed);
        assert_eq!(classify("step size 0.1").intent, Intent::SetStep);
        assert_eq!(classify("use the 3d probe").intent, Intent::SetProbeType);
        assert_eq!(classify("switch to g55").intent, Intent::SetWorkspace);
    }

    #[test]
    fn test_feed_inside_jog_is_not_set_feed() {
        assert_eq!(classify("jog left 10 feed 500").intent, Intent::Jog);
    }

    #[test]
    fn test_spindle_variants() {
        assert_eq!(classify("spindle on 12000").intent, Intent::SpindleOn);
        assert_eq!(classify("spindle off").intent, Intent::SpindleOff);
        assert_eq!(classify("set spindle to 12000 rpm").intent, Intent::SetSpindleSpeed);
        assert_eq!(classify("mist on").intent, Intent::MistOn);
        assert_eq!(classify("coolant off").intent, Intent::CoolantOff);
    }

    #[test]
    fn test_undo_only_when_bare() {
        assert_eq!(classify("undo").intent, Intent::Undo);
        assert_ne!(classify("undo the spindle").intent, Intent::Undo);
    }

    #[test]
    fn test_go_to_zero_is_not_zero_axis() {
        assert_ne!(classify("go to zero").intent, Intent::ZeroAxis);
        assert_eq!(classify("zero x").intent, Intent::ZeroAxis);
    }

    #[test]
    fn test_ambiguous_result_is_penalized() {
        let result = classify("take that back again");
        assert!(result.confidence < 0.7);
    }

    #[test]
    fn test_confirm_and_cancel() {
        assert_eq!(classify("yes").intent, Intent::Confirm);
        assert_eq!(classify("go ahead").intent, Intent::Confirm);
        assert_eq!(classify("never mind").intent, Intent::Cancel);
    }

    #[test]
    fn test_unknown() {
        let result = classify("banana");
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.confidence, 0.0);
    }
}
