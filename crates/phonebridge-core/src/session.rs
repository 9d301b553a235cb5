//! Call session model: transcript, pending audio, and the per-call turn lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Speaker of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered conversation history. The first turn is always the system turn.
#[derive(Debug, Clone)]
pub struct Transcript(Vec<Turn>);

impl Transcript {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self(vec![Turn::new(Role::System, system_prompt)])
    }

    /// Append a user or assistant turn.
    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        debug_assert!(role != Role::System, "system turn is only created at start");
        self.0.push(Turn::new(role, text));
    }

    pub fn as_slice(&self) -> &[Turn] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn roles(&self) -> Vec<Role> {
        self.0.iter().map(|t| t.role).collect()
    }
}

/// Per-call settings captured when the session is created.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub system_prompt: String,
    pub chat_model: String,
    pub chat_api_key: String,
    pub transcription_api_key: String,
    /// Language hint for transcription.
    pub language: Option<String>,
    pub tts_api_key: String,
    pub voice_id: String,
}

/// Mutable call state. Only touched through [`CallSession::with_state`].
#[derive(Debug)]
pub struct CallState {
    pub transcript: Transcript,
    pub pending_audio: Vec<Vec<u8>>,
    pub is_processing: bool,
    pub timer_armed: bool,
}

/// One active phone call.
#[derive(Debug)]
pub struct CallSession {
    pub stream_id: String,
    pub config: Arc<SessionConfig>,
    pub created_at: DateTime<Utc>,
    closed: AtomicBool,
    state: Mutex<CallState>,
}

impl CallSession {
    pub fn new(stream_id: impl Into<String>, config: Arc<SessionConfig>) -> Self {
        let transcript = Transcript::new(config.system_prompt.clone());
        Self {
            stream_id: stream_id.into(),
            config,
            created_at: Utc::now(),
            closed: AtomicBool::new(false),
            state: Mutex::new(CallState {
                transcript,
                pending_audio: Vec::new(),
                is_processing: false,
                timer_armed: false,
            }),
        }
    }

    /// Run `f` with the state lock held. `f` must not block.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut CallState) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut state)
    }

    /// Snapshot of the transcript.
    pub fn transcript(&self) -> Vec<Turn> {
        self.state.lock().transcript.as_slice().to_vec()
    }

    /// Append a turn unless the call has ended. Returns whether it was appended.
    pub fn push_turn(&self, role: Role, text: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        if self.is_closed() {
            return false;
        }
        state.transcript.push(role, text);
        true
    }

    /// Speaker of each transcript turn, in order.
    pub fn roles(&self) -> Vec<Role> {
        self.state.lock().transcript.roles()
    }

    pub fn is_processing(&self) -> bool {
        self.state.lock().is_processing
    }

    pub fn pending_chunks(&self) -> usize {
        self.state.lock().pending_audio.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the call as ended and drop any buffered audio.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.state.lock().pending_audio.clear();
    }

    /// Take the turn lock and drain pending audio in one step.
    ///
    /// Returns `None` when another turn is already running or the call has ended.
    pub fn begin_turn(self: &Arc<Self>) -> Option<TurnGuard> {
        let chunks = {
            let mut state = self.state.lock();
            if state.is_processing || self.is_closed() {
                return None;
            }
            state.is_processing = true;
            std::mem::take(&mut state.pending_audio)
        };
        Some(TurnGuard {
            session: Arc::clone(self),
            chunks,
        })
    }

    /// Take the turn lock without draining pending audio.
    ///
    /// Used for replies that are not answers to buffered speech (the greeting),
    /// so audio arriving meanwhile waits for the next turn.
    pub fn begin_reply(self: &Arc<Self>) -> Option<TurnGuard> {
        {
            let mut state = self.state.lock();
            if state.is_processing || self.is_closed() {
                return None;
            }
            state.is_processing = true;
        }
        Some(TurnGuard {
            session: Arc::clone(self),
            chunks: Vec::new(),
        })
    }
}

/// Held for the duration of one turn; clears `is_processing` on drop.
#[derive(Debug)]
pub struct TurnGuard {
    session: Arc<CallSession>,
    chunks: Vec<Vec<u8>>,
}

impl TurnGuard {
    pub fn session(&self) -> &Arc<CallSession> {
        &self.session
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Drained chunks concatenated in arrival order.
    pub fn audio(&self) -> Vec<u8> {
        self.chunks.concat()
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.session.with_state(|s| s.is_processing = false);
    }
}
