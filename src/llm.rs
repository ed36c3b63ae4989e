//! Language-model access for script generation.
//!
//! [`LanguageModel`] is the seam: the generator only needs "prompt in, text
//! out".  [`ChatClient`] speaks the OpenAI chat-completions protocol, which
//! Groq (the default), OpenAI and most local servers expose.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::GenerationError;

/// Prompt in, completion text out.
pub trait LanguageModel {
    fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

impl<F> LanguageModel for F
where
    F: Fn(&str) -> Result<String, GenerationError>,
{
    fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        self(prompt)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// ChatClient
// ─────────────────────────────────────────────────────────────────────────────

/// Blocking chat-completions client.
#[derive(Debug, Clone)]
pub struct ChatClient {
    config: LlmConfig,
    api_key: String,
    http: reqwest::blocking::Client,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Result<Self, GenerationError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::NotConfigured("no API key (set GROQ_API_KEY)".into()))?;

        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        tracing::info!(model = %config.model, base_url = %config.base_url, "chat client ready");
        Ok(Self { config, api_key, http })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

impl LanguageModel for ChatClient {
    fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
            stream: false,
        };

        tracing::debug!(prompt_chars = prompt.len(), "sending completion request");
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GenerationError::Status { status: status.as_u16(), body });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| GenerationError::Malformed(format!("unexpected response body: {e}")))?;
        first_content(parsed)
    }
}

fn first_content(response: ChatResponse) -> Result<String, GenerationError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| GenerationError::Malformed("response has no message content".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_not_configured() {
        let err = ChatClient::new(LlmConfig::default()).unwrap_err();
        assert!(matches!(err, GenerationError::NotConfigured(_)));
    }

    #[test]
    fn test_endpoint_joins_cleanly() {
        let config = LlmConfig {
            api_key: Some("k".into()),
            base_url: "http://localhost:8080/v1/".into(),
            ..LlmConfig::default()
        };
        let client = ChatClient::new(config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_request_shape() {
        let body = ChatRequest {
            model: "m",
            messages: [ChatMessage { role: "user", content: "hi" }],
            temperature: 0.7,
            max_tokens: 10,
            response_format: ResponseFormat { kind: "json_object" },
            stream: false,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["messages"][0]["content"], "hi");
        assert_eq!(v["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_first_content() {
        let r: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"script\":[]}"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_content(r).unwrap(), r#"{"script":[]}"#);

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(first_content(empty), Err(GenerationError::Malformed(_))));
    }

    #[test]
    fn test_closure_is_a_model() {
        let stub = |_: &str| Ok::<_, GenerationError>("ok".to_string());
        assert_eq!(stub.complete("anything").unwrap(), "ok");
    }
}
