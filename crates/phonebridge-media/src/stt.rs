//! Speech-to-text via OpenAI's `/v1/audio/transcriptions`.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use phonebridge_core::config::OpenAiConfig;
use phonebridge_providers::SpeechToText;

use crate::audio::mulaw_to_wav;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-transcribe";

pub struct OpenAiTranscriber {
    pub base_url: String,
    pub model: String,
    /// Biases recognition toward the expected language and vocabulary.
    pub prompt: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

impl OpenAiTranscriber {
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: DEFAULT_MODEL.into(),
            prompt: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &OpenAiConfig) -> Self {
        let mut stt = Self::new(config.base_url.as_deref());
        if let Some(model) = &config.transcription_model {
            stt.model = model.clone();
        }
        stt.prompt = config.transcription_prompt.clone();
        stt
    }
}

#[async_trait]
impl SpeechToText for OpenAiTranscriber {
    async fn transcribe(
        &self,
        api_key: &str,
        audio: &[u8],
        language: Option<&str>,
    ) -> anyhow::Result<String> {
        if api_key.is_empty() {
            anyhow::bail!("No transcription API key configured");
        }

        let wav_data = mulaw_to_wav(audio);
        let url = format!("{}/v1/audio/transcriptions", self.base_url);
        debug!(model = %self.model, wav_bytes = wav_data.len(), "Sending audio for transcription");

        let part = reqwest::multipart::Part::bytes(wav_data)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;

        let mut form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json")
            .part("file", part);
        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }
        if let Some(prompt) = &self.prompt {
            form = form.text("prompt", prompt.clone());
        }

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Transcription API error {status}: {body}");
        }

        let parsed: TranscriptionResponse = resp.json().await?;
        Ok(parsed.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let stt = OpenAiTranscriber::from_config(&OpenAiConfig {
            base_url: Some("http://localhost:9999/".into()),
            transcription_prompt: Some("Le locuteur parle français.".into()),
            ..Default::default()
        });
        assert_eq!(stt.base_url, "http://localhost:9999");
        assert_eq!(stt.model, "gpt-4o-transcribe");
        assert_eq!(stt.prompt.as_deref(), Some("Le locuteur parle français."));
    }

    #[test]
    fn test_response_without_text_is_empty() {
        let parsed: TranscriptionResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.text.is_empty());
    }
}
