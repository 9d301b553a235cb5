//! Media pipeline: telephony audio codec, utterance buffering, STT, TTS, and
//! speech-oriented text shaping.

pub mod audio;
pub mod speech;
pub mod stt;
pub mod tts;
pub mod utterance;
