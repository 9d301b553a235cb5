//! One transcribe → reply → synthesize cycle per utterance.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use phonebridge_core::registry::SessionRegistry;
use phonebridge_core::session::{CallSession, Role, TurnGuard};
use phonebridge_media::speech::optimize_for_phone_call;
use phonebridge_providers::{ChatModel, Collaborators, SpeechSynthesizer, SpeechToText};

use crate::adapter::MediaSender;

/// Where a failed turn stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Transcription,
    Chat,
    Synthesis,
    Delivery,
}

impl TurnStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStage::Transcription => "transcription",
            TurnStage::Chat => "chat",
            TurnStage::Synthesis => "synthesis",
            TurnStage::Delivery => "delivery",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Reply audio was handed to the connection.
    Replied,
    /// No audio, or the transcription was blank.
    NothingSaid,
    /// Another turn holds the session.
    Busy,
    /// The call ended before or during the turn.
    SessionGone,
    Failed(TurnStage),
}

impl TurnOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TurnOutcome::Replied => "replied",
            TurnOutcome::NothingSaid => "nothing_said",
            TurnOutcome::Busy => "busy",
            TurnOutcome::SessionGone => "session_gone",
            TurnOutcome::Failed(stage) => stage.as_str(),
        }
    }
}

pub struct TurnCoordinator {
    registry: Arc<SessionRegistry>,
    stt: Arc<dyn SpeechToText>,
    chat: Arc<dyn ChatModel>,
    tts: Arc<dyn SpeechSynthesizer>,
}

impl TurnCoordinator {
    pub fn new(registry: Arc<SessionRegistry>, collaborators: Collaborators) -> Self {
        Self {
            registry,
            stt: collaborators.stt,
            chat: collaborators.chat,
            tts: collaborators.tts,
        }
    }

    /// Drain the session's pending audio and answer it.
    ///
    /// Collaborator failures end the turn; they are logged and never retried.
    pub async fn run_turn(&self, stream_id: &str, sender: &MediaSender) -> TurnOutcome {
        let Some(session) = self.registry.get(stream_id) else {
            return TurnOutcome::SessionGone;
        };
        let Some(guard) = session.begin_turn() else {
            let outcome = if session.is_closed() {
                TurnOutcome::SessionGone
            } else {
                TurnOutcome::Busy
            };
            debug!(stream_sid = %stream_id, outcome = outcome.label(), "Turn suppressed");
            return outcome;
        };

        let started = Instant::now();
        let outcome = self.drive(&guard, sender).await;
        drop(guard);

        let elapsed = started.elapsed();
        info!(
            stream_sid = %stream_id,
            outcome = outcome.label(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Turn finished"
        );
        #[cfg(feature = "metrics")]
        crate::metrics::record_turn(outcome.label(), elapsed.as_secs_f64());

        outcome
    }

    async fn drive(&self, guard: &TurnGuard, sender: &MediaSender) -> TurnOutcome {
        let session = guard.session();
        let config = Arc::clone(&session.config);

        let audio = guard.audio();
        if audio.is_empty() {
            return TurnOutcome::NothingSaid;
        }
        debug!(
            stream_sid = %session.stream_id,
            chunks = guard.chunk_count(),
            bytes = audio.len(),
            "Transcribing utterance"
        );

        let text = match self
            .stt
            .transcribe(&config.transcription_api_key, &audio, config.language.as_deref())
            .await
        {
            Ok(text) => text,
            Err(e) => return failed(session, TurnStage::Transcription, &e),
        };
        let text = text.trim();
        if text.is_empty() {
            debug!(stream_sid = %session.stream_id, "Empty transcription, skipping turn");
            return TurnOutcome::NothingSaid;
        }
        if !session.push_turn(Role::User, text) {
            return TurnOutcome::SessionGone;
        }
        info!(stream_sid = %session.stream_id, caller = %text, "Caller said");

        let transcript = session.transcript();
        let reply = match self
            .chat
            .reply(&config.chat_api_key, &transcript, &config.chat_model)
            .await
        {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => {
                return failed(
                    session,
                    TurnStage::Chat,
                    &anyhow::anyhow!("chat model returned an empty reply"),
                );
            }
            Err(e) => return failed(session, TurnStage::Chat, &e),
        };
        if !session.push_turn(Role::Assistant, reply.trim()) {
            return TurnOutcome::SessionGone;
        }

        self.deliver_reply(session, &reply, sender).await
    }

    /// Synthesize `text` for the phone line and send it on the session's stream.
    ///
    /// Shared by conversational replies and the greeting.
    pub async fn deliver_reply(
        &self,
        session: &CallSession,
        text: &str,
        sender: &MediaSender,
    ) -> TurnOutcome {
        let spoken = optimize_for_phone_call(text);
        let config = &session.config;

        let audio = match self
            .tts
            .synthesize(&config.tts_api_key, &spoken, &config.voice_id)
            .await
        {
            Ok(audio) => audio,
            Err(e) => return failed(session, TurnStage::Synthesis, &e),
        };
        if session.is_closed() {
            return TurnOutcome::SessionGone;
        }

        if sender.send_audio(&session.stream_id, &audio) {
            TurnOutcome::Replied
        } else {
            TurnOutcome::Failed(TurnStage::Delivery)
        }
    }
}

fn failed(session: &CallSession, stage: TurnStage, error: &anyhow::Error) -> TurnOutcome {
    if session.is_closed() {
        return TurnOutcome::SessionGone;
    }
    warn!(stream_sid = %session.stream_id, stage = stage.as_str(), %error, "Turn failed");
    #[cfg(feature = "metrics")]
    crate::metrics::record_error(stage.as_str());
    TurnOutcome::Failed(stage)
}
