//! Speech synthesis via ElevenLabs.
//!
//! Audio is requested in the media stream's own codec (`ulaw_8000` by default)
//! so it can be forwarded to the caller without transcoding.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use phonebridge_core::config::TtsConfig;
use phonebridge_providers::SpeechSynthesizer;

const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_MODEL: &str = "eleven_multilingual_v2";
const DEFAULT_OUTPUT_FORMAT: &str = "ulaw_8000";

pub struct ElevenLabsSynthesizer {
    pub base_url: String,
    pub model: String,
    pub output_format: String,
    pub stability: f64,
    pub similarity_boost: f64,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f64,
    similarity_boost: f64,
}

impl ElevenLabsSynthesizer {
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(ELEVENLABS_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: DEFAULT_MODEL.into(),
            output_format: DEFAULT_OUTPUT_FORMAT.into(),
            stability: 0.5,
            similarity_boost: 0.75,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &TtsConfig) -> Self {
        let mut tts = Self::new(config.base_url.as_deref());
        if let Some(model) = &config.default_model {
            tts.model = model.clone();
        }
        if let Some(format) = &config.output_format {
            tts.output_format = format.clone();
        }
        if let Some(s) = config.stability {
            tts.stability = s;
        }
        if let Some(s) = config.similarity_boost {
            tts.similarity_boost = s;
        }
        tts
    }

    pub fn request_url(&self, voice_id: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{voice_id}?output_format={}",
            self.base_url, self.output_format
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, api_key: &str, text: &str, voice_id: &str) -> anyhow::Result<Vec<u8>> {
        if api_key.is_empty() {
            anyhow::bail!("No TTS API key configured");
        }

        debug!(voice_id, model = %self.model, text_len = text.len(), "Synthesizing speech");

        let resp = self
            .client
            .post(self.request_url(voice_id))
            .header("xi-api-key", api_key)
            .header("Accept", "audio/basic")
            .json(&SynthesisRequest {
                text,
                model_id: &self.model,
                voice_settings: VoiceSettings {
                    stability: self.stability,
                    similarity_boost: self.similarity_boost,
                },
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("TTS API error {status}: {body}");
        }

        let audio = resp.bytes().await?;
        if audio.is_empty() {
            anyhow::bail!("TTS API returned no audio");
        }
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url() {
        let tts = ElevenLabsSynthesizer::new(None);
        assert_eq!(
            tts.request_url("EXAVITQu4vr4xnSDxMaL"),
            "https://api.elevenlabs.io/v1/text-to-speech/EXAVITQu4vr4xnSDxMaL?output_format=ulaw_8000"
        );
    }

    #[test]
    fn test_from_config_overrides() {
        let tts = ElevenLabsSynthesizer::from_config(&TtsConfig {
            default_model: Some("eleven_turbo_v2_5".into()),
            output_format: Some("pcm_16000".into()),
            stability: Some(0.3),
            ..Default::default()
        });
        assert_eq!(tts.model, "eleven_turbo_v2_5");
        assert_eq!(tts.output_format, "pcm_16000");
        assert_eq!(tts.stability, 0.3);
        assert_eq!(tts.similarity_boost, 0.75);
    }
}
