//! Piper voice management.

pub mod catalog;
pub mod download;

pub use catalog::{VoiceInfo, VoiceName, get_voice, list_voices};
