//! LLM completion providers.
//!
//! [`CompletionProvider`] is one request, one reply, no retry; retrying is
//! the artifact generator's job.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CompletionError;

pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://aipipe.org/openrouter/v1/chat/completions";
pub const DEFAULT_OPENAI_MODEL: &str = "openai/gpt-5-nano";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Sends a single prompt to a language model and returns the reply text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Short label used in logs.
    fn name(&self) -> &str;
}

fn build_http(timeout: Duration) -> Result<reqwest::Client, CompletionError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("pagesmith")
        .build()
        .map_err(CompletionError::Transport)
}

async fn read_success(resp: reqwest::Response) -> Result<String, CompletionError> {
    let status = resp.status();
    let body = resp.text().await.map_err(CompletionError::Transport)?;
    if !status.is_success() {
        return Err(CompletionError::Status {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        });
    }
    Ok(body)
}

// ── OpenAI-compatible chat completions ────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Any `/chat/completions` endpoint speaking the OpenAI wire format
/// (OpenRouter proxies included).
pub struct OpenAiCompatibleProvider {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        Ok(Self {
            http: build_http(timeout)?,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

/// Pull the first choice's text out of a chat-completions body.
pub fn parse_chat_response(body: &str) -> Result<String, CompletionError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::Malformed(format!("invalid JSON: {}", e)))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| CompletionError::Malformed("response has no choices[0].message.content".into()))
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleProvider {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(CompletionError::Transport)?;
        let body = read_success(resp).await?;
        tracing::debug!(provider = "openai", preview = %body.chars().take(200).collect::<String>(), "Raw completion response");
        parse_chat_response(&body)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ── Gemini generateContent ────────────────────────────────────────────

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

/// Google Gemini `models/{model}:generateContent`.
pub struct GeminiProvider {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        Ok(Self {
            http: build_http(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

/// Concatenate the text parts of the first candidate.
pub fn parse_gemini_response(body: &str) -> Result<String, CompletionError> {
    let parsed: GeminiResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::Malformed(format!("invalid JSON: {}", e)))?;
    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::Malformed("response has no candidates".into()))?;
    let text: String = candidate
        .content
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    if text.is_empty() {
        return Err(CompletionError::Malformed("candidate has no text parts".into()));
    }
    Ok(text)
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });
        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(CompletionError::Transport)?;
        let body = read_success(resp).await?;
        parse_gemini_response(&body)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
