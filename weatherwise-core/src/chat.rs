//! OpenAI-compatible chat-completion client used for insights and intent parsing.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt::Debug, time::Duration};

use crate::{Config, error::PlannerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatProviderId {
    Groq,
    Together,
}

impl ChatProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatProviderId::Groq => "groq",
            ChatProviderId::Together => "together",
        }
    }

    pub const fn all() -> &'static [ChatProviderId] {
        &[ChatProviderId::Groq, ChatProviderId::Together]
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            ChatProviderId::Groq => "https://api.groq.com/openai/v1",
            ChatProviderId::Together => "https://api.together.xyz/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ChatProviderId::Groq => "llama-3.3-70b-versatile",
            ChatProviderId::Together => "meta-llama/Meta-Llama-3.1-70B-Instruct",
        }
    }

    /// Prefix of the `*_API_KEY` / `*_MODEL` environment variables.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            ChatProviderId::Groq => "GROQ",
            ChatProviderId::Together => "TOGETHER",
        }
    }

    fn timeout(&self) -> Duration {
        match self {
            ChatProviderId::Groq => Duration::from_secs(30),
            ChatProviderId::Together => Duration::from_secs(40),
        }
    }
}

impl std::fmt::Display for ChatProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ChatProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "groq" => Ok(ChatProviderId::Groq),
            "together" => Ok(ChatProviderId::Together),
            _ => Err(anyhow!(
                "Unknown chat provider '{value}'. Supported providers: groq, together."
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling knobs for one completion call.
#[derive(Debug, Clone, Default)]
pub struct CompletionParams {
    /// Replaces the client's model for this call.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: Option<f32>,
    /// Ask the provider for a JSON object reply.
    pub json_response: bool,
}

#[async_trait]
pub trait ChatCompletion: Send + Sync + Debug {
    async fn complete(&self, messages: &[ChatMessage], params: &CompletionParams)
    -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    provider: ChatProviderId,
    api_key: String,
    model: String,
    base_url: String,
    http: Client,
}

impl ChatClient {
    pub fn new(provider: ChatProviderId, api_key: String, model: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(provider.timeout())
            .build()
            .context("Failed to build chat HTTP client")?;

        Ok(Self {
            provider,
            api_key,
            model: model.unwrap_or_else(|| provider.default_model().to_string()),
            base_url: provider.base_url().to_string(),
            http,
        })
    }

    /// Point the client at another OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn provider(&self) -> ChatProviderId {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[async_trait]
impl ChatCompletion for ChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let model = params.model.as_deref().unwrap_or(&self.model);

        let body = CompletionRequest {
            model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
            response_format: params.json_response.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        tracing::debug!(provider = %self.provider, model, "sending chat completion request");

        let res = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {} chat API", self.provider))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .with_context(|| format!("Failed to read {} chat response body", self.provider))?;

        if !status.is_success() {
            let service = match self.provider {
                ChatProviderId::Groq => "Groq",
                ChatProviderId::Together => "Together",
            };
            return Err(PlannerError::upstream(service, status, &text).into());
        }

        let parsed: CompletionResponse = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {} chat completion JSON", self.provider))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| PlannerError::EmptyCompletion {
                provider: self.provider.to_string(),
            })?;

        Ok(content)
    }
}

/// Construct a client for an explicit provider from config.
pub fn client_from_config(id: ChatProviderId, config: &Config) -> Result<ChatClient> {
    let provider = config
        .provider_config(id)
        .ok_or_else(|| PlannerError::MissingApiKey {
            provider: id.to_string(),
        })?;

    ChatClient::new(id, provider.api_key.clone(), provider.model.clone())
}

/// Construct the default provider's client, using the `default_provider` field.
pub fn default_client_from_config(config: &Config) -> Result<ChatClient> {
    let id = config.default_provider_id()?;
    client_from_config(id, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_response(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
    }

    fn client(base_url: &str) -> ChatClient {
        ChatClient::new(ChatProviderId::Groq, "test_key".into(), None)
            .unwrap()
            .with_base_url(base_url)
    }

    #[test]
    fn provider_id_as_str_roundtrip() {
        for id in ChatProviderId::all() {
            let parsed = ChatProviderId::try_from(id.as_str()).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
        assert!(ChatProviderId::try_from("openai").is_err());
    }

    #[test]
    fn client_from_config_errors_when_missing_api_key() {
        let cfg = Config::default();
        let err = client_from_config(ChatProviderId::Together, &cfg).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PlannerError>(),
            Some(PlannerError::MissingApiKey { .. })
        ));
    }

    #[test]
    fn default_client_uses_configured_model() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ChatProviderId::Groq, "KEY".into());
        let client = default_client_from_config(&cfg).unwrap();
        assert_eq!(client.model(), "llama-3.3-70b-versatile");
        assert_eq!(client.provider(), ChatProviderId::Groq);
    }

    #[tokio::test]
    async fn complete_returns_trimmed_content() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test_key"))
            .and(body_partial_json(json!({
                "model": "llama-3.3-70b-versatile",
                "max_tokens": 300
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_response("  Pack a tarp.\n")),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let params = CompletionParams {
            temperature: 0.5,
            max_tokens: 300,
            ..Default::default()
        };
        let out = client(&mock_server.uri())
            .complete(&[ChatMessage::user("hi")], &params)
            .await
            .unwrap();

        assert_eq!(out, "Pack a tarp.");
    }

    #[tokio::test]
    async fn json_mode_and_model_override_are_sent() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "llama-3.1-8b-instant",
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("{}")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let params = CompletionParams {
            model: Some("llama-3.1-8b-instant".into()),
            json_response: true,
            max_tokens: 200,
            ..Default::default()
        };
        let out = client(&mock_server.uri())
            .complete(&[ChatMessage::user("hi")], &params)
            .await
            .unwrap();
        assert_eq!(out, "{}");
    }

    #[tokio::test]
    async fn error_status_maps_to_upstream() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server.uri())
            .complete(&[ChatMessage::user("hi")], &CompletionParams::default())
            .await
            .unwrap_err();

        match err.downcast_ref::<PlannerError>() {
            Some(PlannerError::Upstream { service, status, body }) => {
                assert_eq!(*service, "Groq");
                assert_eq!(*status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_choices_is_empty_completion() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server.uri())
            .complete(&[ChatMessage::user("hi")], &CompletionParams::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PlannerError>(),
            Some(PlannerError::EmptyCompletion { .. })
        ));
    }
}
