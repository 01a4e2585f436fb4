//! Error types for voxflow.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxflowError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    // Audio output errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio output failed: {message}")]
    AudioOutput { message: String },

    // Voice engine errors
    #[error("Voice engine not found: {engine}")]
    VoiceEngineNotFound { engine: String },

    #[error("Voice model not found at {path}")]
    VoiceModelNotFound { path: String },

    #[error("'{name}' is not a piper voice name (expected <lang>_<REGION>-<speaker>-<quality>)")]
    InvalidVoiceName { name: String },

    #[error("Failed to download voice {voice}: {message}")]
    VoiceDownload { voice: String, message: String },

    #[error("Synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Synthesis timed out after {timeout_ms}ms")]
    SynthesisTimeout { timeout_ms: u64 },

    // Buffer errors
    #[error("PCM buffer overflow: dropped {dropped} samples after {retries} retries")]
    BufferOverflow { dropped: usize, retries: u32 },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VoxflowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_file_not_found_display() {
        let error = VoxflowError::ConfigFileNotFound {
            path: "/path/to/config.toml".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Configuration file not found at /path/to/config.toml"
        );
    }

    #[test]
    fn test_voice_download_display() {
        let error = VoxflowError::VoiceDownload {
            voice: "fr_FR-siwis-medium".to_string(),
            message: "status 404".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to download voice fr_FR-siwis-medium: status 404"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = VoxflowError::ConfigInvalidValue {
            key: "buffer.capacity_samples".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for buffer.capacity_samples: must be positive"
        );
    }

    #[test]
    fn test_audio_output_display() {
        let error = VoxflowError::AudioOutput {
            message: "device disconnected".to_string(),
        };
        assert_eq!(error.to_string(), "Audio output failed: device disconnected");
    }

    #[test]
    fn test_synthesis_display() {
        let error = VoxflowError::Synthesis {
            message: "model crashed".to_string(),
        };
        assert_eq!(error.to_string(), "Synthesis failed: model crashed");
    }

    #[test]
    fn test_synthesis_timeout_display() {
        let error = VoxflowError::SynthesisTimeout { timeout_ms: 30000 };
        assert_eq!(error.to_string(), "Synthesis timed out after 30000ms");
    }

    #[test]
    fn test_buffer_overflow_display() {
        let error = VoxflowError::BufferOverflow {
            dropped: 4410,
            retries: 50,
        };
        assert_eq!(
            error.to_string(),
            "PCM buffer overflow: dropped 4410 samples after 50 retries"
        );
    }

    #[test]
    fn test_voice_engine_not_found_display() {
        let error = VoxflowError::VoiceEngineNotFound {
            engine: "piper".to_string(),
        };
        assert_eq!(error.to_string(), "Voice engine not found: piper");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: VoxflowError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: VoxflowError = toml_error.into();
        assert!(error.to_string().contains("Failed to parse configuration"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: VoxflowError = io_error.into();
        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<VoxflowError>();
        assert_sync::<VoxflowError>();
    }
}
