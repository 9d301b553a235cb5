//! HTTP and media-stream WebSocket gateway.
//!
//! The gateway answers the telephony platform's voice webhook with markup that
//! opens a media stream, then drives each call over that stream: it buffers
//! caller audio, detects pauses, runs one turn at a time per call, and sends
//! synthesized replies back as media frames.

pub mod adapter;
pub mod connection;
pub mod markup;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod server;
pub mod state;
pub mod turn;

pub use server::{router, start_gateway};
pub use state::{GatewayState, default_collaborators};
