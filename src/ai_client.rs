use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

use crate::config::OpenAiConfig;
use crate::error::{AppError, AppResult};
use crate::intent::SearchIntent;

/// One entry of a chat transcript, in the provider's wire shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// The assistant's reply, split at the adapter boundary: display text on one
/// side, the machine-readable search intent (if any) on the other.
#[derive(Clone, Debug)]
pub struct AiReply {
    pub display_text: String,
    pub search_intent: Option<SearchIntent>,
}

/// key: ai-adapter -> chat completion client
#[derive(Clone)]
pub struct OpenAiClient {
    base: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiClient {
    pub fn new(base: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("client build"),
        }
    }

    pub fn from_config(config: &OpenAiConfig) -> Self {
        Self::new(&config.api_base, &config.api_key, &config.model)
    }

    /// One chat completion over the given transcript. Provider-reported
    /// errors surface as provider errors, not transport faults.
    pub async fn chat(&self, messages: &[ChatMessage]) -> AppResult<String> {
        let url = format!("{}/v1/chat/completions", self.base);
        let body: Value = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "max_tokens": 300,
                "temperature": 0.7,
            }))
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = body.get("error").filter(|value| !value.is_null()) {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("chat completion failed")
                .to_string();
            return Err(AppError::Provider(message));
        }

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AppError::Provider("malformed chat completion response".to_string()))?;
        Ok(content.to_string())
    }
}

static INTENT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[SEARCH_INTENT:\s*(\{.*?\})\]").expect("intent tag pattern"));

/// Split an assistant reply into display text and the embedded
/// `[SEARCH_INTENT: {json}]` tag, if present. This is the single place the
/// string-embedded format is parsed. Malformed embedded JSON leaves the text
/// unchanged and yields no intent.
pub fn parse_reply(raw: &str) -> AiReply {
    let Some(captures) = INTENT_TAG.captures(raw) else {
        return AiReply {
            display_text: raw.trim().to_string(),
            search_intent: None,
        };
    };

    match serde_json::from_str::<SearchIntent>(&captures[1]) {
        Ok(intent) => AiReply {
            display_text: INTENT_TAG.replace(raw, "").trim().to_string(),
            search_intent: Some(intent),
        },
        Err(err) => {
            warn!(?err, "failed to parse embedded search intent");
            AiReply {
                display_text: raw.trim().to_string(),
                search_intent: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_without_tag_passes_through() {
        let reply = parse_reply("Happy to help! What do you need?");
        assert_eq!(reply.display_text, "Happy to help! What do you need?");
        assert!(reply.search_intent.is_none());
    }

    #[test]
    fn well_formed_tag_is_stripped_and_parsed() {
        let raw = "I can find you a plumber.\n\n[SEARCH_INTENT: {\"category\": \"plumber\", \"query\": \"fix my tap\"}]";
        let reply = parse_reply(raw);
        assert_eq!(reply.display_text, "I can find you a plumber.");
        let intent = reply.search_intent.unwrap();
        assert_eq!(intent.category, "plumber");
        assert_eq!(intent.query, "fix my tap");
    }

    #[test]
    fn malformed_tag_leaves_text_unchanged() {
        let raw = "Sure. [SEARCH_INTENT: {not json}]";
        let reply = parse_reply(raw);
        assert_eq!(reply.display_text, raw);
        assert!(reply.search_intent.is_none());
    }

    #[test]
    fn missing_query_defaults_to_empty() {
        let raw = "[SEARCH_INTENT: {\"category\": \"beauty\"}]";
        let reply = parse_reply(raw);
        let intent = reply.search_intent.unwrap();
        assert_eq!(intent.category, "beauty");
        assert_eq!(intent.query, "");
    }
}
