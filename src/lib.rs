//! voxflow - Streaming text-to-speech
//!
//! Turns text arriving in fragments into continuous spoken audio while the
//! text is still being produced.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod text;
pub mod voice;

// Core traits (text → voice → device)
pub use audio::output::AudioOutput;
pub use voice::engine::VoiceEngine;

// Pipeline
pub use pipeline::controller::{PipelineConfig, SpeechPipeline, StopHandle};
pub use pipeline::state::{PipelineState, PlaybackState};
pub use pipeline::stats::{PipelineFault, PipelineStats};

// Error handling
pub use error::{Result, VoxflowError};

// Config
pub use config::Config;

// Station framework (for advanced users)
pub use pipeline::error::{ErrorReporter, StationError};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
