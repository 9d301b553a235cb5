//! OpenAI Chat Completions client.
//!
//! Non-streaming `/v1/chat/completions`: a phone reply is synthesized as a
//! whole, so there is nothing to gain from token streaming here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use phonebridge_core::config::OpenAiConfig;
use phonebridge_core::session::Turn;

use crate::ChatModel;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 2000;

pub struct OpenAiChat {
    pub base_url: String,
    pub temperature: f64,
    pub max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &OpenAiConfig) -> Self {
        let mut chat = Self::new(config.base_url.as_deref());
        if let Some(t) = config.temperature {
            chat.temperature = t;
        }
        if let Some(m) = config.max_tokens {
            chat.max_tokens = m;
        }
        chat
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn format_messages(transcript: &[Turn]) -> Vec<ChatMessage<'_>> {
    transcript
        .iter()
        .map(|turn| ChatMessage {
            role: turn.role.as_str(),
            content: &turn.text,
        })
        .collect()
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn reply(&self, api_key: &str, transcript: &[Turn], model: &str) -> anyhow::Result<String> {
        if api_key.is_empty() {
            anyhow::bail!("OpenAI API key is not configured");
        }

        let body = ChatRequest {
            model,
            messages: format_messages(transcript),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(model, turns = transcript.len(), "Requesting chat completion");

        let response = self
            .client
            .post(&url)
            .header("authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error {status}: {body}");
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(content)
    }
}
