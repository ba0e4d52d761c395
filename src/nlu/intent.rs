//! Intent and entity types produced by classification

use crate::text::vocab::parse_number;
use serde::{Deserialize, Serialize};

/// What the operator wants, independent of how it was phrased
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Stop,
    Resume,
    Reset,
    Home,
    Unlock,
    Jog,
    MoveAbsolute,
    Probe,
    SetFeed,
    SetStep,
    SetProbeType,
    SetWorkspace,
    ZeroAxis,
    SpindleOn,
    SpindleOff,
    SetSpindleSpeed,
    CoolantOn,
    CoolantOff,
    MistOn,
    ToolChange,
    QueryPosition,
    QueryStatus,
    QueryFeed,
    QueryStep,
    QueryDistanceToZero,
    QueryDistanceToHome,
    QueryTravelRemaining,
    QueryProbeType,
    Repeat,
    Undo,
    StartJob,
    /// Meta-intent consumed by the conversation layer
    Confirm,
    /// Meta-intent consumed by the conversation layer
    Cancel,
    /// Could not determine intent
    #[default]
    Unknown,
}

/// Kind of value pulled out of an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Axis,
    Direction,
    Distance,
    FeedRate,
    SpindleRpm,
    ToolNumber,
    ProbeType,
    Workspace,
    SpeedModifier,
    StepSize,
}

/// A typed value extracted from an utterance
///
/// Values are canonical strings: axes as `"X"`/`"XY"`/`"CENTER"`, directions
/// as `"LEFT"`/`"POSITIVE"`, numbers as written, workspaces as `"G55"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub value: String,
}

impl Entity {
    pub fn new(entity_type: EntityType, value: impl Into<String>) -> Self {
        Self {
            entity_type,
            value: value.into(),
        }
    }
}

/// Classification of one utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    /// Classifier confidence (0.0 - 1.0)
    pub confidence: f32,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl Default for IntentResult {
    fn default() -> Self {
        Self::unknown()
    }
}

impl IntentResult {
    pub fn new(intent: Intent, confidence: f32, entities: Vec<Entity>) -> Self {
        Self {
            intent,
            confidence,
            entities,
        }
    }

    pub fn unknown() -> Self {
        Self::new(Intent::Unknown, 0.0, Vec::new())
    }

    /// All values of one entity type, in utterance order
    pub fn values(&self, entity_type: EntityType) -> impl Iterator<Item = &str> + '_ {
        self.entities
            .iter()
            .filter(move |e| e.entity_type == entity_type)
            .map(|e| e.value.as_str())
    }

    pub fn first(&self, entity_type: EntityType) -> Option<&str> {
        self.values(entity_type).next()
    }

    pub fn has(&self, entity_type: EntityType) -> bool {
        self.first(entity_type).is_some()
    }

    /// Numeric values of one entity type; unparseable values are skipped
    pub fn numbers(&self, entity_type: EntityType) -> Vec<f64> {
        self.values(entity_type).filter_map(parse_number).collect()
    }

    pub fn first_number(&self, entity_type: EntityType) -> Option<f64> {
        self.values(entity_type).find_map(parse_number)
    }
}
