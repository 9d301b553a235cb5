//! Gateway shared state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use phonebridge_core::config::Config;
use phonebridge_core::registry::SessionRegistry;
use phonebridge_core::session::SessionConfig;
use phonebridge_media::stt::OpenAiTranscriber;
use phonebridge_media::tts::ElevenLabsSynthesizer;
use phonebridge_media::utterance::UtteranceBuffer;
use phonebridge_providers::Collaborators;
use phonebridge_providers::openai::OpenAiChat;

use crate::markup::SayOptions;
use crate::turn::TurnCoordinator;

/// Shared gateway state accessible from all connections and handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub buffer: UtteranceBuffer,
    pub coordinator: Arc<TurnCoordinator>,
    /// Settings every new call session starts with.
    pub session_config: Arc<SessionConfig>,
    pub greeting: Option<String>,
    pub say: SayOptions,
    pub connections: AtomicUsize,
    #[cfg(feature = "metrics")]
    pub metrics_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl GatewayState {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let buffer = UtteranceBuffer::new(Arc::clone(&registry), config.pause());
        let coordinator = Arc::new(TurnCoordinator::new(Arc::clone(&registry), collaborators));
        let assistant = config.assistant();

        Self {
            session_config: Arc::new(config.session_config()),
            greeting: config.greeting(),
            say: SayOptions {
                voice: assistant.say_voice,
                language: assistant.say_language,
            },
            config: Arc::new(config),
            registry,
            buffer,
            coordinator,
            connections: AtomicUsize::new(0),
            #[cfg(feature = "metrics")]
            metrics_handle: None,
        }
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, handle: metrics_exporter_prometheus::PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

/// Real HTTP collaborators built from config: OpenAI for transcription and
/// chat, ElevenLabs for synthesis.
pub fn default_collaborators(config: &Config) -> Collaborators {
    let openai = config.openai.clone().unwrap_or_default();
    let tts = config.tts.clone().unwrap_or_default();
    Collaborators {
        stt: Arc::new(OpenAiTranscriber::from_config(&openai)),
        chat: Arc::new(OpenAiChat::from_config(&openai)),
        tts: Arc::new(ElevenLabsSynthesizer::from_config(&tts)),
    }
}
