//! Pendant configuration with documented defaults
//!
//! `ParserConfig` is the session-scoped state the resolver reads and the
//! SETTING commands mutate. The rest shapes the conversation and the optional
//! remote intent classifier. Everything can be loaded from a TOML file.

use crate::core::error::{PendantError, Result};
use crate::core::types::{HomeLocation, ProbeType, UnitsPreference};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Lowest feed (display units per minute) a SET_FEED command accepts
pub const MIN_FEED_SETTING: f64 = 1.0;
/// Highest feed (display units per minute) a SET_FEED command accepts
pub const MAX_FEED_SETTING: f64 = 50_000.0;
/// Lowest step (display units) a SET_STEP command accepts
pub const MIN_STEP_SETTING: f64 = 0.001;
/// Highest step (display units) a SET_STEP command accepts
pub const MAX_STEP_SETTING: f64 = 100.0;

/// Session state read by the command resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Jog feed rate in mm/min
    pub feed_rate: f64,

    /// Default jog distance in mm when the operator gives no number
    pub step_size: f64,

    /// Probe used when a PROBE command does not name one
    pub probe_type: ProbeType,

    /// Which end of Y the machine homes to
    ///
    /// Decides whether "forward" is Y-minus (home at the back) or Y-plus.
    pub home_location: HomeLocation,

    /// Units the operator speaks in and hears answers in
    pub units: UnitsPreference,

    /// Whether "run the job" may start a program
    ///
    /// Off by default: starting a job by voice is blocked.
    pub allow_job_start: bool,

    /// Whether the intent classifier runs before the fallback grammar
    pub nlu_enabled: bool,

    /// Minimum classifier confidence to trust an intent
    pub nlu_threshold: f32,

    /// Active work coordinate system (G54..G59)
    pub workspace: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            feed_rate: 1000.0,
            step_size: 1.0,
            probe_type: ProbeType::Basic,
            home_location: HomeLocation::Back,
            units: UnitsPreference::Metric,
            allow_job_start: false,
            nlu_enabled: true,
            nlu_threshold: 0.7,
            workspace: "G54".into(),
        }
    }
}

/// Turn-taking behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Ask "yes or no" before motion, probing and spindle commands
    pub require_confirmation: bool,

    /// How long to wait for a command after the wake word
    pub wake_timeout_ms: u64,

    /// Keep listening after each command instead of going idle
    pub continuous_listening: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            require_confirmation: true,
            wake_timeout_ms: 8000,
            continuous_listening: false,
        }
    }
}

impl ConversationConfig {
    pub fn wake_timeout(&self) -> Duration {
        Duration::from_millis(self.wake_timeout_ms)
    }
}

/// Optional remote intent classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub api_url: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.anthropic.com/v1/messages".into(),
            model: "claude-3-haiku-20240307".into(),
        }
    }
}

/// Complete pendant configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendantConfig {
    pub parser: ParserConfig,
    pub conversation: ConversationConfig,
    pub llm: LlmConfig,
}

impl PendantConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        let parser = &self.parser;

        if !(10.0..=50_000.0).contains(&parser.feed_rate) {
            return Err(format!(
                "feed_rate ({}) must be within 10..=50000 mm/min",
                parser.feed_rate
            ));
        }

        if !(MIN_STEP_SETTING..=MAX_STEP_SETTING * crate::core::types::MM_PER_INCH)
            .contains(&parser.step_size)
        {
            return Err(format!("step_size ({}) is out of range", parser.step_size));
        }

        if !(0.0..=1.0).contains(&parser.nlu_threshold) {
            return Err(format!(
                "nlu_threshold ({}) must be within 0.0..=1.0",
                parser.nlu_threshold
            ));
        }

        if parse_workspace_code(&parser.workspace).is_none() {
            return Err(format!(
                "workspace ({}) must be one of G54..G59",
                parser.workspace
            ));
        }

        if self.conversation.wake_timeout_ms == 0 {
            return Err("wake_timeout_ms must be positive".into());
        }

        Ok(())
    }
}

/// Parse "G54".."G59" (any case) into its number
pub fn parse_workspace_code(code: &str) -> Option<u8> {
    let rest = code.trim().strip_prefix(['G', 'g'])?;
    let n: u8 = rest.parse().ok()?;
    (54..=59).contains(&n).then_some(n)
}

/// Load and validate a configuration file
pub fn load_config(path: &Path) -> Result<PendantConfig> {
    let contents = fs::read_to_string(path)?;
    let config: PendantConfig = toml::from_str(&contents)?;
    config.validate().map_err(PendantError::Config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PendantConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_str = r#"
            [parser]
            units = "imperial"
            home_location = "front"
            probe_type = "3d"

            [conversation]
            require_confirmation = false
        "#;
        let config: PendantConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.parser.units, UnitsPreference::Imperial);
        assert_eq!(config.parser.home_location, HomeLocation::Front);
        assert_eq!(config.parser.probe_type, ProbeType::ThreeD);
        assert_eq!(config.parser.feed_rate, 1000.0);
        assert!(!config.conversation.require_confirmation);
        assert_eq!(config.conversation.wake_timeout_ms, 8000);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = PendantConfig::default();
        config.parser.nlu_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_workspace() {
        let mut config = PendantConfig::default();
        config.parser.workspace = "G60".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_workspace_code() {
        assert_eq!(parse_workspace_code("g55"), Some(55));
        assert_eq!(parse_workspace_code("G59"), Some(59));
        assert_eq!(parse_workspace_code("G53"), None);
        assert_eq!(parse_workspace_code("X54"), None);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(Path::new("/nonexistent/pendant.toml"));
        assert!(matches!(result, Err(PendantError::Io(_))));
    }
}
