//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::SessionConfig;

const DEFAULT_SYSTEM_PROMPT: &str =
    "Tu es un assistant téléphonique IA. Sois poli, concis et serviable. Réponds en français.";
const DEFAULT_GREETING: &str =
    "Bonjour, je suis votre assistant vocal. Comment puis-je vous aider aujourd'hui?";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_VOICE_ID: &str = "EXAVITQu4vr4xnSDxMaL"; // ElevenLabs "Sarah"
const DEFAULT_PORT: u16 = 10000;

/// Top-level PhoneBridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant: Option<AssistantConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai: Option<OpenAiConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<TtsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Public base URL the telephony platform reaches us on (e.g. `wss://calls.example.com`).
    /// When unset, the stream URL is derived from the webhook request's `Host` header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,

    /// WebSocket path for media streams (default: `/media-stream`).
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_stream_path() -> String {
    "/media-stream".into()
}

/// Conversation behavior for every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Spoken on stream start. An empty string disables the greeting turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,

    /// Language hint passed to transcription (default: "fr").
    #[serde(default = "default_language")]
    pub language: String,

    /// Silence, in milliseconds, after which buffered audio is treated as an utterance.
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,

    /// Voice used by the platform's own `<Say>` in call-control markup.
    #[serde(default = "default_say_voice")]
    pub say_voice: String,

    #[serde(default = "default_say_language")]
    pub say_language: String,

    /// Optional greeting spoken by the platform before the media stream opens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markup_greeting: Option<String>,
}

fn default_language() -> String {
    "fr".into()
}

fn default_pause_ms() -> u64 {
    1000
}

fn default_say_voice() -> String {
    "woman".into()
}

fn default_say_language() -> String {
    "fr-FR".into()
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            greeting: None,
            language: default_language(),
            pause_ms: default_pause_ms(),
            say_voice: default_say_voice(),
            say_language: default_say_language(),
            markup_greeting: None,
        }
    }
}

/// OpenAI configuration (transcription + chat completions).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the key (default: `OPENAI_API_KEY`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Chat model (default: "gpt-4o-mini").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_model: Option<String>,

    /// Transcription model (default: "gpt-4o-transcribe").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription_model: Option<String>,

    /// Prompt that biases transcription toward the expected language/vocabulary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription_prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl OpenAiConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        let env = self
            .api_key_env
            .clone()
            .or_else(|| Some("OPENAI_API_KEY".to_string()));
        resolve_secret_field(&self.api_key, &env)
    }
}

/// Text-to-speech (ElevenLabs) configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the key (default: `ELEVENLABS_API_KEY`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Default voice ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_voice: Option<String>,

    /// Default model ID (e.g. "eleven_multilingual_v2").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Output format (default: "ulaw_8000", what the media stream plays back).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_boost: Option<f64>,
}

impl TtsConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        let env = self
            .api_key_env
            .clone()
            .or_else(|| Some("ELEVENLABS_API_KEY".to_string()));
        resolve_secret_field(&self.api_key, &env)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "phonebridge_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

static ENV_VAR_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR_RE
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_default()
        })
        .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::PhoneBridgeError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn bind_addr(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn stream_path(&self) -> String {
        self.gateway
            .as_ref()
            .map(|g| g.stream_path.clone())
            .unwrap_or_else(default_stream_path)
    }

    pub fn assistant(&self) -> AssistantConfig {
        self.assistant.clone().unwrap_or_default()
    }

    /// Pause that closes an utterance.
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.assistant().pause_ms)
    }

    /// Greeting spoken when a stream starts, if any.
    pub fn greeting(&self) -> Option<String> {
        match self.assistant.as_ref().and_then(|a| a.greeting.clone()) {
            Some(g) if g.trim().is_empty() => None,
            Some(g) => Some(g),
            None => Some(DEFAULT_GREETING.to_string()),
        }
    }

    pub fn chat_model(&self) -> String {
        self.openai
            .as_ref()
            .and_then(|o| o.chat_model.clone())
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string())
    }

    pub fn voice_id(&self) -> String {
        self.tts
            .as_ref()
            .and_then(|t| t.default_voice.clone())
            .unwrap_or_else(|| DEFAULT_VOICE_ID.to_string())
    }

    /// Snapshot the per-call settings a new session captures at creation.
    pub fn session_config(&self) -> SessionConfig {
        let assistant = self.assistant();
        let openai_key = self
            .openai
            .clone()
            .unwrap_or_default()
            .resolve_api_key()
            .unwrap_or_default();
        SessionConfig {
            system_prompt: assistant
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            chat_model: self.chat_model(),
            chat_api_key: openai_key.clone(),
            transcription_api_key: openai_key,
            language: Some(assistant.language).filter(|l| !l.is_empty()),
            tts_api_key: self
                .tts
                .clone()
                .unwrap_or_default()
                .resolve_api_key()
                .unwrap_or_default(),
            voice_id: self.voice_id(),
        }
    }

    /// Get a config value by dotted path (e.g. "gateway.port", "assistant.pause_ms").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if self.openai.clone().unwrap_or_default().resolve_api_key().is_none() {
            warnings.push("OpenAI has no API key configured; transcription and chat will fail".to_string());
        }
        if self.tts.clone().unwrap_or_default().resolve_api_key().is_none() {
            warnings.push("TTS has no API key configured; no audio replies will be sent".to_string());
        }

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
            if !gw.stream_path.starts_with('/') {
                errors.push(format!(
                    "Stream path must start with '/': {}",
                    gw.stream_path
                ));
            }
        }

        if self.assistant().pause_ms == 0 {
            errors.push("assistant.pause_ms must be greater than 0".to_string());
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for PhoneBridge data: `~/.phonebridge/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".phonebridge")
}
