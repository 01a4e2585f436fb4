use crate::audio::ShapingConfig;
use crate::defaults;
use crate::error::VoxflowError;
use crate::pipeline::PipelineConfig;
use crate::text::SegmenterConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub segmenter: SegmentationConfig,
    pub buffer: BufferConfig,
    pub playback: PlaybackConfig,
    pub voice: VoiceConfig,
    pub shaping: LevelConfig,
}

/// When streamed text is cut into utterances
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentationConfig {
    pub min_words_primary: usize,
    pub min_words_secondary: usize,
    pub initial_threshold: usize,
    pub sustained_threshold: usize,
    pub min_interval_ms: u64,
}

/// PCM ring buffer sizing and write backpressure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity_samples: usize,
    pub write_retry_budget: u32,
    pub write_backoff_ms: u64,
}

/// Output device and stream timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub preroll_ms: u32,
    pub startup_timeout_ms: u64,
    pub stop_timeout_ms: u64,
}

/// Voice engine selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    pub engine: VoiceKind,
    pub model: Option<PathBuf>,
    pub piper_binary: String,
    pub timeout_ms: u64,
}

/// Available voice engines
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoiceKind {
    Piper,
    Tone,
}

/// Per-segment loudness and fades
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LevelConfig {
    pub normalize: bool,
    pub normalize_peak: f32,
    pub fade_ms: u32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_words_primary: defaults::MIN_WORDS_PRIMARY,
            min_words_secondary: defaults::MIN_WORDS_SECONDARY,
            initial_threshold: defaults::INITIAL_SEGMENT_THRESHOLD,
            sustained_threshold: defaults::SUSTAINED_SEGMENT_THRESHOLD,
            min_interval_ms: defaults::MIN_SEGMENT_INTERVAL_MS,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity_samples: defaults::RING_CAPACITY_SAMPLES,
            write_retry_budget: defaults::WRITE_RETRY_BUDGET,
            write_backoff_ms: defaults::WRITE_BACKOFF_MS,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            preroll_ms: defaults::PREROLL_MS,
            startup_timeout_ms: defaults::STARTUP_TIMEOUT_MS,
            stop_timeout_ms: defaults::STOP_TIMEOUT_MS,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            engine: VoiceKind::Piper,
            model: None,
            piper_binary: defaults::PIPER_BINARY.to_string(),
            timeout_ms: defaults::SYNTHESIS_TIMEOUT_MS,
        }
    }
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            normalize: true,
            normalize_peak: defaults::NORMALIZE_PEAK,
            fade_ms: defaults::FADE_MS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML or out-of-range values.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => VoxflowError::ConfigFileNotFound {
                path: path.display().to_string(),
            },
            _ => VoxflowError::Io(e),
        })?;
        let config: Config = toml::from_str(&contents).map_err(VoxflowError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if matches!(
                    e.downcast_ref::<VoxflowError>(),
                    Some(VoxflowError::ConfigFileNotFound { .. })
                ) =>
            {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), VoxflowError> {
        let invalid = |key: &str, message: &str| VoxflowError::ConfigInvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        if self.playback.sample_rate == 0 {
            return Err(invalid("playback.sample_rate", "must be greater than zero"));
        }
        if self.buffer.capacity_samples == 0 {
            return Err(invalid("buffer.capacity_samples", "must be greater than zero"));
        }
        if !(self.shaping.normalize_peak > 0.0 && self.shaping.normalize_peak <= 1.0) {
            return Err(invalid("shaping.normalize_peak", "must be in (0, 1]"));
        }
        if self.segmenter.initial_threshold == 0 || self.segmenter.sustained_threshold == 0 {
            return Err(invalid("segmenter", "word thresholds must be greater than zero"));
        }
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXFLOW_VOICE_MODEL → voice.model
    /// - VOXFLOW_PIPER_BIN → voice.piper_binary
    /// - VOXFLOW_AUDIO_DEVICE → playback.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("VOXFLOW_VOICE_MODEL")
            && !model.is_empty()
        {
            self.voice.model = Some(PathBuf::from(model));
        }

        if let Ok(binary) = std::env::var("VOXFLOW_PIPER_BIN")
            && !binary.is_empty()
        {
            self.voice.piper_binary = binary;
        }

        if let Ok(device) = std::env::var("VOXFLOW_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.playback.device = Some(device);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxflow/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxflow")
            .join("config.toml")
    }

    /// Translate the file settings into runtime pipeline settings.
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            sample_rate: self.playback.sample_rate,
            segmenter: SegmenterConfig {
                min_words_primary: self.segmenter.min_words_primary,
                min_words_secondary: self.segmenter.min_words_secondary,
                initial_threshold: self.segmenter.initial_threshold,
                sustained_threshold: self.segmenter.sustained_threshold,
                min_interval: Duration::from_millis(self.segmenter.min_interval_ms),
            },
            shaping: ShapingConfig {
                normalize_peak: self.shaping.normalize.then_some(self.shaping.normalize_peak),
                fade_ms: self.shaping.fade_ms,
            },
            ring_capacity: self.buffer.capacity_samples,
            write_retry_budget: self.buffer.write_retry_budget,
            write_backoff: Duration::from_millis(self.buffer.write_backoff_ms),
            preroll: Duration::from_millis(u64::from(self.playback.preroll_ms)),
            startup_timeout: Duration::from_millis(self.playback.startup_timeout_ms),
            stop_timeout: Duration::from_millis(self.playback.stop_timeout_ms),
            ..PipelineConfig::default()
        }
    }
}
