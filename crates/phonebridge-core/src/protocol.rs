//! Media stream wire protocol.
//!
//! The telephony platform speaks JSON-over-WebSocket. Every frame carries an
//! `event` tag; inbound audio arrives as base64 µ-law in `media.payload` and
//! outbound audio is sent back in the same shape.

use serde::{Deserialize, Serialize};

use crate::error::{PhoneBridgeError, Result};

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Handshake frame sent once when the socket opens.
    Connected { protocol: Option<String> },
    /// A call's media stream begins.
    Start {
        stream_sid: String,
        call_sid: Option<String>,
    },
    /// One chunk of caller audio (base64).
    Media { stream_sid: String, payload: String },
    /// The call's media stream ended.
    Stop { stream_sid: String },
    /// Playback acknowledgement for a previously sent mark.
    Mark {
        stream_sid: Option<String>,
        name: Option<String>,
    },
    /// Any event tag this gateway does not handle.
    Other { event: String },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(rename = "streamSid")]
    stream_sid: Option<String>,
    protocol: Option<String>,
    start: Option<StartBody>,
    media: Option<MediaBody>,
    mark: Option<MarkBody>,
}

#[derive(Deserialize)]
struct StartBody {
    #[serde(rename = "streamSid")]
    stream_sid: Option<String>,
    #[serde(rename = "callSid")]
    call_sid: Option<String>,
}

#[derive(Deserialize)]
struct MediaBody {
    payload: Option<String>,
}

#[derive(Deserialize)]
struct MarkBody {
    name: Option<String>,
}

impl InboundFrame {
    /// Parse a raw text frame.
    pub fn parse(raw: &str) -> Result<Self> {
        let env: Envelope = serde_json::from_str(raw)
            .map_err(|e| PhoneBridgeError::Protocol(format!("malformed frame: {e}")))?;

        let frame = match env.event.as_str() {
            "connected" => InboundFrame::Connected {
                protocol: env.protocol,
            },
            "start" => {
                let (nested_sid, call_sid) = match env.start {
                    Some(s) => (s.stream_sid, s.call_sid),
                    None => (None, None),
                };
                let stream_sid = nested_sid
                    .or(env.stream_sid)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| missing("start", "streamSid"))?;
                InboundFrame::Start {
                    stream_sid,
                    call_sid,
                }
            }
            "media" => {
                let stream_sid = env.stream_sid.ok_or_else(|| missing("media", "streamSid"))?;
                let payload = env
                    .media
                    .and_then(|m| m.payload)
                    .ok_or_else(|| missing("media", "media.payload"))?;
                InboundFrame::Media {
                    stream_sid,
                    payload,
                }
            }
            "stop" => InboundFrame::Stop {
                stream_sid: env.stream_sid.ok_or_else(|| missing("stop", "streamSid"))?,
            },
            "mark" => InboundFrame::Mark {
                stream_sid: env.stream_sid,
                name: env.mark.and_then(|m| m.name),
            },
            _ => InboundFrame::Other { event: env.event },
        };
        Ok(frame)
    }

    /// The event tag this frame was parsed from.
    pub fn event(&self) -> &str {
        match self {
            InboundFrame::Connected { .. } => "connected",
            InboundFrame::Start { .. } => "start",
            InboundFrame::Media { .. } => "media",
            InboundFrame::Stop { .. } => "stop",
            InboundFrame::Mark { .. } => "mark",
            InboundFrame::Other { event } => event,
        }
    }
}

fn missing(event: &str, field: &str) -> PhoneBridgeError {
    PhoneBridgeError::Protocol(format!("{event} frame without {field}"))
}

/// Outbound audio frame: `{"event":"media","streamSid":..,"media":{"payload":..}}`.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMedia<'a> {
    pub event: &'static str,
    #[serde(rename = "streamSid")]
    pub stream_sid: &'a str,
    pub media: OutboundPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundPayload {
    pub payload: String,
}

impl<'a> OutboundMedia<'a> {
    pub fn new(stream_sid: &'a str, payload_b64: String) -> Self {
        Self {
            event: "media",
            stream_sid,
            media: OutboundPayload {
                payload: payload_b64,
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
