//! Intent classification
//!
//! Normalized text -> `IntentResult` (intent + typed entities + confidence).
//! The keyword classifier is always available; the LLM client is optional.

pub mod classifier;
pub mod client;
pub mod entities;
pub mod intent;

pub use classifier::{IntentResolver, KeywordIntentResolver};
pub use client::{classify_intent, LlmClient};
pub use intent::{Entity, EntityType, Intent, IntentResult};
