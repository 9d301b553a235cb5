//! Fake collaborators and fixtures shared by the gateway tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::mpsc;

use phonebridge_core::config::{AssistantConfig, Config};
use phonebridge_core::session::Turn;
use phonebridge_gateway::GatewayState;
use phonebridge_gateway::adapter::{MediaSender, StreamAdapter};
use phonebridge_providers::{ChatModel, Collaborators, SpeechSynthesizer, SpeechToText};

#[derive(Default)]
pub struct FakeStt {
    pub text: String,
    pub fail: bool,
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<Vec<u8>>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeStt {
    pub fn saying(text: &str) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<u8>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechToText for FakeStt {
    async fn transcribe(
        &self,
        _api_key: &str,
        audio: &[u8],
        _language: Option<&str>,
    ) -> anyhow::Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(audio.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("transcription unavailable");
        }
        Ok(self.text.clone())
    }
}

#[derive(Default)]
pub struct FakeChat {
    pub reply: String,
    pub fail: bool,
    pub calls: Mutex<Vec<Vec<Turn>>>,
}

impl FakeChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.into(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<Turn>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn reply(&self, _api_key: &str, transcript: &[Turn], _model: &str) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(transcript.to_vec());
        if self.fail {
            anyhow::bail!("chat unavailable");
        }
        Ok(self.reply.clone())
    }
}

/// Returns `audio:<text>` as the synthesized bytes.
#[derive(Default)]
pub struct FakeTts {
    pub fail: bool,
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeTts {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn fake_audio(text: &str) -> Vec<u8> {
    format!("audio:{text}").into_bytes()
}

#[async_trait]
impl SpeechSynthesizer for FakeTts {
    async fn synthesize(&self, _api_key: &str, text: &str, _voice_id: &str) -> anyhow::Result<Vec<u8>> {
        self.calls.lock().unwrap().push(text.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            anyhow::bail!("synthesis unavailable");
        }
        Ok(fake_audio(text))
    }
}

pub struct Harness {
    pub state: Arc<GatewayState>,
    pub stt: Arc<FakeStt>,
    pub chat: Arc<FakeChat>,
    pub tts: Arc<FakeTts>,
}

impl Harness {
    /// A connection-scoped adapter plus the receiving end of its outbound frames.
    pub fn adapter(&self) -> (StreamAdapter, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let adapter = StreamAdapter::new(
            Arc::clone(&self.state),
            MediaSender::new(Arc::new(tx)),
            "test-conn",
        );
        (adapter, rx)
    }
}

pub fn config_with_greeting(greeting: &str) -> Config {
    Config {
        assistant: Some(AssistantConfig {
            system_prompt: Some("Tu es un assistant.".into()),
            greeting: Some(greeting.into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn harness(config: Config, stt: FakeStt, chat: FakeChat, tts: FakeTts) -> Harness {
    let stt = Arc::new(stt);
    let chat = Arc::new(chat);
    let tts = Arc::new(tts);
    let collaborators = Collaborators {
        stt: stt.clone(),
        chat: chat.clone(),
        tts: tts.clone(),
    };
    Harness {
        state: Arc::new(GatewayState::new(config, collaborators)),
        stt,
        chat,
        tts,
    }
}

pub fn start_frame(stream_sid: &str) -> String {
    serde_json::json!({
        "event": "start",
        "sequenceNumber": "1",
        "start": {"streamSid": stream_sid, "callSid": "CA-call", "tracks": ["inbound"]},
        "streamSid": stream_sid,
    })
    .to_string()
}

pub fn media_frame(stream_sid: &str, audio: &[u8]) -> String {
    serde_json::json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": {"track": "inbound", "payload": BASE64.encode(audio)},
    })
    .to_string()
}

pub fn stop_frame(stream_sid: &str) -> String {
    serde_json::json!({"event": "stop", "streamSid": stream_sid}).to_string()
}

/// Decode an outbound media frame into (streamSid, audio bytes).
pub fn decode_outbound(frame: &str) -> (String, Vec<u8>) {
    let value: serde_json::Value = serde_json::from_str(frame).unwrap();
    assert_eq!(value["event"], "media");
    let sid = value["streamSid"].as_str().unwrap().to_string();
    let audio = BASE64
        .decode(value["media"]["payload"].as_str().unwrap())
        .unwrap();
    (sid, audio)
}
