//! Utterance buffering and pause detection.
//!
//! Caller audio accumulates in the session's pending buffer. The first chunk
//! appended while no timer is armed and no turn is running arms a single pause
//! timer. Later chunks never reset it: the timer fires `pause` after it was
//! armed, disarms, and reports whether there is an utterance to process. The
//! platform keeps sending frames during silence, so a deadline that moved with
//! every append would never be reached.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::time::sleep;
use tracing::{debug, trace};

use phonebridge_core::error::{PhoneBridgeError, Result};
use phonebridge_core::registry::SessionRegistry;

/// What an append did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Audio buffered and a pause timer was armed; the caller must run it.
    ArmTimer,
    /// Audio buffered; a timer is already armed or a turn is running.
    Buffered,
    /// No such session (never started, or already stopped).
    Missing,
}

#[derive(Debug, Clone)]
pub struct UtteranceBuffer {
    registry: Arc<SessionRegistry>,
    pause: Duration,
}

impl UtteranceBuffer {
    pub fn new(registry: Arc<SessionRegistry>, pause: Duration) -> Self {
        Self { registry, pause }
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    /// Decode a base64 media payload and append it.
    ///
    /// An undecodable payload is a protocol error and leaves the buffer untouched.
    pub fn append(&self, stream_id: &str, payload_b64: &str) -> Result<AppendOutcome> {
        let bytes = BASE64
            .decode(payload_b64)
            .map_err(|e| PhoneBridgeError::Protocol(format!("invalid media payload: {e}")))?;
        Ok(self.append_bytes(stream_id, bytes))
    }

    pub fn append_bytes(&self, stream_id: &str, chunk: Vec<u8>) -> AppendOutcome {
        let outcome = self.registry.update(stream_id, |state| {
            state.pending_audio.push(chunk);
            if !state.is_processing && !state.timer_armed {
                state.timer_armed = true;
                AppendOutcome::ArmTimer
            } else {
                AppendOutcome::Buffered
            }
        });
        match outcome {
            Some(outcome) => {
                trace!(stream_sid = %stream_id, ?outcome, "Audio appended");
                outcome
            }
            None => AppendOutcome::Missing,
        }
    }

    /// Arm a timer for audio left behind by a finished turn.
    ///
    /// Returns `true` when the caller must run [`Self::wait_for_pause`].
    pub fn rearm_if_pending(&self, stream_id: &str) -> bool {
        self.registry
            .update(stream_id, |state| {
                if state.is_processing || state.timer_armed || state.pending_audio.is_empty() {
                    return false;
                }
                state.timer_armed = true;
                true
            })
            .unwrap_or(false)
    }

    /// Run an armed pause timer to completion.
    ///
    /// Sleeps `pause` from the moment it is called, then disarms. Returns `true`
    /// when a turn should run: the session still exists, no turn is running,
    /// and audio is pending.
    pub async fn wait_for_pause(&self, stream_id: &str) -> bool {
        sleep(self.pause).await;

        let Some(session) = self.registry.get(stream_id) else {
            return false;
        };
        if session.is_closed() {
            return false;
        }

        let flush = session.with_state(|state| {
            state.timer_armed = false;
            !state.is_processing && !state.pending_audio.is_empty()
        });
        debug!(stream_sid = %stream_id, flush, "Pause timer fired");
        flush
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phonebridge_core::session::SessionConfig;
    use tokio::time::Instant;

    const PAUSE: Duration = Duration::from_millis(1000);

    fn setup(ids: &[&str]) -> (Arc<SessionRegistry>, UtteranceBuffer) {
        let registry = Arc::new(SessionRegistry::new());
        for id in ids {
            registry.create(id, Arc::new(SessionConfig::default()));
        }
        let buffer = UtteranceBuffer::new(Arc::clone(&registry), PAUSE);
        (registry, buffer)
    }

    #[tokio::test]
    async fn test_append_arms_single_timer() {
        let (registry, buffer) = setup(&["CA1"]);
        assert_eq!(buffer.append("CA1", "AAEC").unwrap(), AppendOutcome::ArmTimer);
        assert_eq!(buffer.append("CA1", "AwQ=").unwrap(), AppendOutcome::Buffered);

        let session = registry.get("CA1").unwrap();
        let guard = session.begin_turn().unwrap();
        assert_eq!(guard.audio(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_append_unknown_session_is_missing() {
        let (registry, buffer) = setup(&[]);
        assert_eq!(buffer.append("CAX", "AAEC").unwrap(), AppendOutcome::Missing);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_payload_leaves_buffer() {
        let (registry, buffer) = setup(&["CA1"]);
        let err = buffer.append("CA1", "not base64!!").unwrap_err();
        assert!(matches!(err, PhoneBridgeError::Protocol(_)));
        let session = registry.get("CA1").unwrap();
        assert_eq!(session.pending_chunks(), 0);
        assert!(!session.with_state(|s| s.timer_armed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_pause_after_arming() {
        let (registry, buffer) = setup(&["CA1"]);
        let start = Instant::now();

        assert_eq!(buffer.append_bytes("CA1", vec![1]), AppendOutcome::ArmTimer);
        let waiter = tokio::spawn({
            let buffer = buffer.clone();
            async move { buffer.wait_for_pause("CA1").await }
        });

        sleep(Duration::from_millis(200)).await;
        assert_eq!(buffer.append_bytes("CA1", vec![2]), AppendOutcome::Buffered);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(buffer.append_bytes("CA1", vec![3]), AppendOutcome::Buffered);

        assert!(waiter.await.unwrap());
        assert!(start.elapsed() >= PAUSE);
        assert!(start.elapsed() < Duration::from_millis(1400));

        let session = registry.get("CA1").unwrap();
        assert!(!session.with_state(|s| s.timer_armed));
        assert_eq!(session.begin_turn().unwrap().audio(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_frames_do_not_postpone_timer() {
        let (_registry, buffer) = setup(&["CA1"]);
        let start = Instant::now();

        assert_eq!(buffer.append_bytes("CA1", vec![0]), AppendOutcome::ArmTimer);
        let waiter = tokio::spawn({
            let buffer = buffer.clone();
            async move {
                let flush = buffer.wait_for_pause("CA1").await;
                (flush, Instant::now())
            }
        });

        // 20 ms frames, as the platform sends them even while the caller is silent.
        for i in 1..100u8 {
            sleep(Duration::from_millis(20)).await;
            buffer.append_bytes("CA1", vec![i]);
        }

        let (flush, fired_at) = waiter.await.unwrap();
        assert!(flush);
        assert!(fired_at - start < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fire_during_turn_does_not_flush() {
        let (registry, buffer) = setup(&["CA1"]);
        let session = registry.get("CA1").unwrap();

        assert_eq!(buffer.append_bytes("CA1", vec![1]), AppendOutcome::ArmTimer);
        let guard = session.begin_turn().unwrap();
        buffer.append_bytes("CA1", vec![2]);

        assert!(!buffer.wait_for_pause("CA1").await);
        assert!(!session.with_state(|s| s.timer_armed));

        drop(guard);
        assert!(buffer.rearm_if_pending("CA1"));
        assert!(buffer.wait_for_pause("CA1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_after_stop_does_nothing() {
        let (registry, buffer) = setup(&["CA1"]);
        assert_eq!(buffer.append_bytes("CA1", vec![1]), AppendOutcome::ArmTimer);
        assert!(registry.destroy("CA1"));

        assert!(!buffer.wait_for_pause("CA1").await);
        assert_eq!(buffer.append_bytes("CA1", vec![2]), AppendOutcome::Missing);
    }

    #[tokio::test]
    async fn test_rearm_needs_pending_audio() {
        let (_registry, buffer) = setup(&["CA1"]);
        assert!(!buffer.rearm_if_pending("CA1"));
        assert!(!buffer.rearm_if_pending("CAX"));
    }
}
