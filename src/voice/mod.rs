//! Voice engines: the opaque text-to-PCM step of the pipeline.

pub mod engine;
pub mod piper;
pub mod tone;

pub use engine::{MockVoice, VoiceEngine};
pub use piper::PiperVoice;
pub use tone::ToneVoice;

use crate::config::{VoiceConfig, VoiceKind};
use crate::error::{Result, VoxflowError};
use crate::models::VoiceName;
use crate::models::download::voice_path;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Build the engine selected by `config`.
///
/// # Errors
/// Returns `VoxflowError::ConfigInvalidValue` when piper is selected without a
/// model, or `VoiceModelNotFound` when the model file is missing.
///
/// `voice.model` is either a path to an `.onnx` file or the name of a voice
/// installed with `voxflow models install`.
pub fn voice_from_config(config: &VoiceConfig) -> Result<Arc<dyn VoiceEngine>> {
    match config.engine {
        VoiceKind::Tone => Ok(Arc::new(ToneVoice::new())),
        VoiceKind::Piper => {
            let model = config
                .model
                .as_ref()
                .ok_or_else(|| VoxflowError::ConfigInvalidValue {
                    key: "voice.model".to_string(),
                    message: "piper needs a model path (or set VOXFLOW_VOICE_MODEL)".to_string(),
                })?;
            let voice = PiperVoice::new(resolve_model(model))?
                .with_binary(&config.piper_binary)
                .with_timeout(Duration::from_millis(config.timeout_ms));
            Ok(Arc::new(voice))
        }
    }
}

/// Installed-voice path for a bare voice name, otherwise `model` unchanged.
fn resolve_model(model: &Path) -> PathBuf {
    if model.extension().is_none()
        && let Some(name) = model.to_str()
        && VoiceName::parse(name).is_ok()
    {
        return voice_path(name);
    }
    model.to_path_buf()
}
