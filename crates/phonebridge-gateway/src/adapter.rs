//! Media-stream protocol adapter.
//!
//! Parses inbound frames from one WebSocket connection, routes them to the
//! session registry, utterance buffer and turn coordinator, and frames reply
//! audio back onto the connection.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use phonebridge_core::error::{PhoneBridgeError, Result};
use phonebridge_core::protocol::{InboundFrame, OutboundMedia};
use phonebridge_core::registry::CreateOutcome;
use phonebridge_core::session::Role;
use phonebridge_media::utterance::AppendOutcome;

use crate::state::GatewayState;

/// Destination for outbound text frames.
pub trait FrameSink: Send + Sync {
    fn send_text(&self, frame: String) -> Result<()>;
}

impl FrameSink for mpsc::UnboundedSender<String> {
    fn send_text(&self, frame: String) -> Result<()> {
        self.send(frame)
            .map_err(|_| PhoneBridgeError::Transport("connection closed".into()))
    }
}

/// Frames audio as outbound `media` events.
#[derive(Clone)]
pub struct MediaSender {
    sink: Arc<dyn FrameSink>,
}

impl MediaSender {
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        Self { sink }
    }

    /// Send `audio` on `stream_id`. A closed sink drops the frame and returns `false`.
    pub fn send_audio(&self, stream_id: &str, audio: &[u8]) -> bool {
        let frame = match OutboundMedia::new(stream_id, BASE64.encode(audio)).to_json() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(stream_sid = %stream_id, %e, "Failed to encode media frame");
                return false;
            }
        };
        match self.sink.send_text(frame) {
            Ok(()) => {
                debug!(stream_sid = %stream_id, bytes = audio.len(), "Audio sent");
                true
            }
            Err(e) => {
                warn!(stream_sid = %stream_id, %e, "Dropping outbound audio");
                #[cfg(feature = "metrics")]
                crate::metrics::record_error("transport");
                false
            }
        }
    }
}

/// How an inbound frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    Handled,
    /// Valid frame with nothing to do (unknown event, unknown session, duplicate start).
    Ignored,
    /// Unparseable frame or payload; the connection stays open.
    Rejected,
}

/// Per-connection protocol state.
pub struct StreamAdapter {
    state: Arc<GatewayState>,
    sender: MediaSender,
    conn_id: String,
    streams: Vec<String>,
}

impl StreamAdapter {
    pub fn new(state: Arc<GatewayState>, sender: MediaSender, conn_id: impl Into<String>) -> Self {
        Self {
            state,
            sender,
            conn_id: conn_id.into(),
            streams: Vec::new(),
        }
    }

    /// Streams started on this connection and not yet stopped.
    pub fn streams(&self) -> &[String] {
        &self.streams
    }

    pub fn on_frame(&mut self, raw: &str) -> FrameDisposition {
        let frame = match InboundFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conn_id = %self.conn_id, %e, "Invalid frame received");
                #[cfg(feature = "metrics")]
                crate::metrics::record_error("protocol");
                return FrameDisposition::Rejected;
            }
        };
        trace!(conn_id = %self.conn_id, event = frame.event(), "Frame received");

        match frame {
            InboundFrame::Connected { protocol } => {
                debug!(conn_id = %self.conn_id, ?protocol, "Media stream connected");
                FrameDisposition::Handled
            }
            InboundFrame::Start {
                stream_sid,
                call_sid,
            } => self.on_start(stream_sid, call_sid),
            InboundFrame::Media {
                stream_sid,
                payload,
            } => self.on_media(&stream_sid, &payload),
            InboundFrame::Stop { stream_sid } => self.on_stop(&stream_sid),
            InboundFrame::Mark { stream_sid, name } => {
                debug!(conn_id = %self.conn_id, ?stream_sid, ?name, "Mark received");
                FrameDisposition::Handled
            }
            InboundFrame::Other { event } => {
                debug!(conn_id = %self.conn_id, %event, "Unhandled event");
                FrameDisposition::Ignored
            }
        }
    }

    fn on_start(&mut self, stream_sid: String, call_sid: Option<String>) -> FrameDisposition {
        let created = self
            .state
            .registry
            .create(&stream_sid, Arc::clone(&self.state.session_config));
        let session = match created {
            CreateOutcome::Existing(_) => {
                debug!(stream_sid = %stream_sid, "Duplicate start ignored");
                return FrameDisposition::Ignored;
            }
            CreateOutcome::Created(session) => session,
        };
        info!(conn_id = %self.conn_id, stream_sid = %stream_sid, ?call_sid, "Call started");
        #[cfg(feature = "metrics")]
        crate::metrics::record_call_start();
        self.streams.push(stream_sid);

        if let Some(greeting) = self.state.greeting.clone() {
            session.push_turn(Role::Assistant, greeting.as_str());
            // Held until the greeting is sent, so no reply can overtake it.
            if let Some(guard) = session.begin_reply() {
                let state = Arc::clone(&self.state);
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    let session = Arc::clone(guard.session());
                    let outcome = state
                        .coordinator
                        .deliver_reply(&session, &greeting, &sender)
                        .await;
                    debug!(stream_sid = %session.stream_id, outcome = outcome.label(), "Greeting delivered");
                    drop(guard);

                    if state.buffer.rearm_if_pending(&session.stream_id) {
                        run_pause_loop(&state, &session.stream_id, &sender).await;
                    }
                });
            }
        }
        FrameDisposition::Handled
    }

    fn on_media(&self, stream_sid: &str, payload: &str) -> FrameDisposition {
        match self.state.buffer.append(stream_sid, payload) {
            Ok(AppendOutcome::ArmTimer) => {
                self.spawn_pause_timer(stream_sid.to_string());
                FrameDisposition::Handled
            }
            Ok(AppendOutcome::Buffered) => FrameDisposition::Handled,
            Ok(AppendOutcome::Missing) => {
                trace!(stream_sid = %stream_sid, "Media for unknown stream");
                FrameDisposition::Ignored
            }
            Err(e) => {
                warn!(stream_sid = %stream_sid, %e, "Invalid media payload");
                #[cfg(feature = "metrics")]
                crate::metrics::record_error("protocol");
                FrameDisposition::Rejected
            }
        }
    }

    fn on_stop(&mut self, stream_sid: &str) -> FrameDisposition {
        self.streams.retain(|s| s != stream_sid);
        if self.end_call(stream_sid) {
            FrameDisposition::Handled
        } else {
            FrameDisposition::Ignored
        }
    }

    fn end_call(&self, stream_sid: &str) -> bool {
        let existed = self.state.registry.destroy(stream_sid);
        if existed {
            info!(conn_id = %self.conn_id, stream_sid = %stream_sid, "Call ended");
            #[cfg(feature = "metrics")]
            crate::metrics::record_call_end();
        }
        existed
    }

    fn spawn_pause_timer(&self, stream_sid: String) {
        let state = Arc::clone(&self.state);
        let sender = self.sender.clone();
        tokio::spawn(async move {
            run_pause_loop(&state, &stream_sid, &sender).await;
        });
    }

    /// Tear down every call started on this connection.
    pub fn close(&mut self) {
        for stream_sid in std::mem::take(&mut self.streams) {
            self.end_call(&stream_sid);
        }
    }
}

/// Wait out an armed pause timer, then run turns until no audio is left behind.
async fn run_pause_loop(state: &GatewayState, stream_sid: &str, sender: &MediaSender) {
    while state.buffer.wait_for_pause(stream_sid).await {
        state.coordinator.run_turn(stream_sid, sender).await;
        if !state.buffer.rearm_if_pending(stream_sid) {
            break;
        }
    }
}

impl Drop for StreamAdapter {
    fn drop(&mut self) {
        self.close();
    }
}
