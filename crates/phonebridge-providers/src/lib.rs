//! Collaborator abstraction for the voice pipeline.
//!
//! A call turn needs three external services: speech-to-text, a chat model,
//! and speech synthesis. Each is a trait so the gateway can run against real
//! HTTP clients in production and against fakes in tests.

use std::sync::Arc;

use async_trait::async_trait;

use phonebridge_core::session::Turn;

pub mod openai;

/// Turns caller audio into text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe one utterance. `audio` is raw telephony audio (8 kHz µ-law).
    async fn transcribe(
        &self,
        api_key: &str,
        audio: &[u8],
        language: Option<&str>,
    ) -> anyhow::Result<String>;
}

/// Produces the assistant's reply to a conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn reply(&self, api_key: &str, transcript: &[Turn], model: &str) -> anyhow::Result<String>;
}

/// Turns reply text into audio the media stream can play back.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, api_key: &str, text: &str, voice_id: &str) -> anyhow::Result<Vec<u8>>;
}

/// The set of collaborators a gateway runs turns against.
#[derive(Clone)]
pub struct Collaborators {
    pub stt: Arc<dyn SpeechToText>,
    pub chat: Arc<dyn ChatModel>,
    pub tts: Arc<dyn SpeechSynthesizer>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
