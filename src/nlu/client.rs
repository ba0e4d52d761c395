//! Remote intent classification
//!
//! Sends one normalized utterance to an Anthropic or OpenAI-compatible chat
//! endpoint and reads back the same `IntentResult` the keyword classifier
//! produces. Command building and every safety rule stay local.

use crate::core::config::LlmConfig;
use crate::core::error::{PendantError, Result};
use crate::nlu::intent::IntentResult;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;

/// Completion budget; the reply is one small JSON object
const MAX_TOKENS: u32 = 256;
/// Past this the local parser answers instead
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Wire dialect of the endpoint, chosen from its URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    Anthropic,
    OpenAI,
}

impl ApiFormat {
    fn for_url(url: &str) -> Self {
        if url.contains("anthropic.com") {
            ApiFormat::Anthropic
        } else {
            ApiFormat::OpenAI
        }
    }

    /// Where the model's text sits in the response body
    fn reply_pointer(self) -> &'static str {
        match self {
            ApiFormat::Anthropic => "/content/0/text",
            ApiFormat::OpenAI => "/choices/0/message/content",
        }
    }
}

pub struct LlmClient {
    http: Client,
    api_key: String,
    api_url: String,
    model: String,
    format: ApiFormat,
}

impl LlmClient {
    pub fn new(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let api_url = api_url.into();
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PendantError::Llm(e.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            format: ApiFormat::for_url(&api_url),
            api_url,
            model: model.into(),
        })
    }

    /// Build a client from the `[llm]` section; the key comes from `LLM_API_KEY`
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| PendantError::Llm("LLM_API_KEY not set".into()))?;
        Self::new(api_key, config.api_url.as_str(), config.model.as_str())
    }

    pub fn api_format(&self) -> ApiFormat {
        self.format
    }

    fn classification_request(&self, utterance: &str) -> RequestBuilder {
        let user = format!("OPERATOR SAID:\n{}\n\nClassify this utterance into JSON:", utterance);
        let post = self.http.post(&self.api_url);
        match self.format {
            ApiFormat::Anthropic => post
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&json!({
                    "model": self.model,
                    "max_tokens": MAX_TOKENS,
                    "system": CLASSIFY_SYSTEM_PROMPT,
                    "messages": [{ "role": "user", "content": user }],
                })),
            ApiFormat::OpenAI => post.bearer_auth(&self.api_key).json(&json!({
                "model": self.model,
                "max_tokens": MAX_TOKENS,
                "messages": [
                    { "role": "system", "content": CLASSIFY_SYSTEM_PROMPT },
                    { "role": "user", "content": user },
                ],
            })),
        }
    }

    async fn reply(&self, utterance: &str) -> Result<String> {
        let response = self
            .classification_request(utterance)
            .send()
            .await
            .map_err(|e| PendantError::Llm(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PendantError::Llm(format!("classifier returned {}: {}", status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PendantError::Llm(e.to_string()))?;
        reply_text(self.format, &body)
    }
}

fn reply_text(format: ApiFormat, body: &Value) -> Result<String> {
    body.pointer(format.reply_pointer())
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| PendantError::Llm("classifier reply carried no text".into()))
}

/// Classify a normalized utterance with the remote model
pub async fn classify_intent(client: &LlmClient, text: &str) -> Result<IntentResult> {
    let reply = client.reply(text).await?;
    parse_intent_response(&reply)
}

/// Decode the model's reply, tolerating prose around the JSON object
pub fn parse_intent_response(response: &str) -> Result<IntentResult> {
    let json_str = extract_json(response)?;
    let mut result: IntentResult = serde_json::from_str(json_str)
        .map_err(|e| PendantError::Llm(format!("unreadable intent {}: {}", response, e)))?;
    result.confidence = result.confidence.clamp(0.0, 1.0);
    Ok(result)
}

/// The outermost `{...}` in the reply
fn extract_json(response: &str) -> Result<&str> {
    let start = response
        .find('{')
        .ok_or_else(|| PendantError::Llm("no JSON in classifier reply".into()))?;
    let end = response
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| PendantError::Llm("unterminated JSON in classifier reply".into()))?;
    Ok(&response[start..=end])
}

const CLASSIFY_SYSTEM_PROMPT: &str = r#"You classify spoken commands for a CNC machine pendant.
The text is a lowercased speech transcript with numbers already written as digits.

INTENTS:
STOP, RESUME, RESET, HOME, UNLOCK, JOG, MOVE_ABSOLUTE, PROBE, SET_FEED, SET_STEP,
SET_PROBE_TYPE, SET_WORKSPACE, ZERO_AXIS, SPINDLE_ON, SPINDLE_OFF, SET_SPINDLE_SPEED,
COOLANT_ON, COOLANT_OFF, MIST_ON, TOOL_CHANGE, QUERY_POSITION, QUERY_STATUS, QUERY_FEED,
QUERY_STEP, QUERY_DISTANCE_TO_ZERO, QUERY_DISTANCE_TO_HOME, QUERY_TRAVEL_REMAINING,
QUERY_PROBE_TYPE, REPEAT, UNDO, START_JOB, CONFIRM, CANCEL, UNKNOWN

ENTITY TYPES (values in caps where listed):
- AXIS: X, Y, Z, XY, XYZ, CENTER
- DIRECTION: LEFT, RIGHT, FORWARD, BACK, UP, DOWN, POSITIVE, NEGATIVE
- DISTANCE, FEED_RATE, STEP_SIZE, SPINDLE_RPM, TOOL_NUMBER: the number as spoken
- PROBE_TYPE: basic or 3d
- WORKSPACE: G54..G59
- SPEED_MODIFIER: the word used (slow, fast, creep, half, ...)

Keep entities in the order they were spoken. When unsure, answer UNKNOWN with low confidence.

OUTPUT FORMAT (JSON only, no explanation):
{"intent": "INTENT", "confidence": 0.0-1.0, "entities": [{"type": "TYPE", "value": "VALUE"}]}

Examples:
"jog left 10 and forward 5" -> {"intent": "JOG", "confidence": 0.95, "entities": [{"type": "DIRECTION", "value": "LEFT"}, {"type": "DISTANCE", "value": "10"}, {"type": "DIRECTION", "value": "FORWARD"}, {"type": "DISTANCE", "value": "5"}]}
"move to x -5 y 10" -> {"intent": "MOVE_ABSOLUTE", "confidence": 0.9, "entities": [{"type": "AXIS", "value": "X"}, {"type": "DISTANCE", "value": "-5"}, {"type": "AXIS", "value": "Y"}, {"type": "DISTANCE", "value": "10"}]}
"what is the feed rate" -> {"intent": "QUERY_FEED", "confidence": 0.9, "entities": []}
"probe z with the 3d probe" -> {"intent": "PROBE", "confidence": 0.9, "entities": [{"type": "AXIS", "value": "Z"}, {"type": "PROBE_TYPE", "value": "3d"}]}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlu::intent::{EntityType, Intent};

    #[test]
    fn test_format_follows_url() {
        let client = LlmClient::new("k", "https://api.anthropic.com/v1/messages", "m").unwrap();
        assert_eq!(client.api_format(), ApiFormat::Anthropic);

        let client = LlmClient::new("k", "http://localhost:8080/v1/chat/completions", "m").unwrap();
        assert_eq!(client.api_format(), ApiFormat::OpenAI);
    }

    #[test]
    fn test_reply_text_per_format() {
        let anthropic = json!({ "content": [{ "type": "text", "text": "{\"intent\": \"HOME\"}" }] });
        assert_eq!(
            reply_text(ApiFormat::Anthropic, &anthropic).unwrap(),
            "{\"intent\": \"HOME\"}"
        );

        let openai = json!({ "choices": [{ "message": { "role": "assistant", "content": "hi" } }] });
        assert_eq!(reply_text(ApiFormat::OpenAI, &openai).unwrap(), "hi");
        assert!(reply_text(ApiFormat::Anthropic, &openai).is_err());
    }

    #[test]
    fn test_extract_json_with_surrounding_text() {
        let response = r#"Sure:
{"intent": "HOME", "confidence": 0.9, "entities": [{"type": "AXIS", "value": "X"}]}
Done."#;
        let json = extract_json(response).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.ends_with('}'));
    }

    #[test]
    fn test_extract_json_no_json() {
        assert!(extract_json("I don't understand").is_err());
        assert!(extract_json("} backwards {").is_err());
    }

    #[test]
    fn test_parse_intent_response() {
        let response = r#"{"intent": "SET_FEED", "confidence": 1.4, "entities": [{"type": "FEED_RATE", "value": "500"}]}"#;
        let result = parse_intent_response(response).unwrap();
        assert_eq!(result.intent, Intent::SetFeed);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.first_number(EntityType::FeedRate), Some(500.0));
    }

    #[test]
    fn test_parse_intent_response_rejects_unknown_intent() {
        let response = r#"{"intent": "DANCE", "confidence": 0.9}"#;
        assert!(matches!(
            parse_intent_response(response),
            Err(PendantError::Llm(_))
        ));
    }
}
