//! Core types, config, errors, stream protocol, and call session model for PhoneBridge.

pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
