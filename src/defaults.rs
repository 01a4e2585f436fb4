//! Default configuration constants for voxflow.
//!
//! Shared between `Config` (TOML) and the runtime configuration structs so the
//! two never drift apart.

/// Default synthesis sample rate in Hz.
///
/// Matches the medium-quality piper voices, which emit 22.05kHz mono.
pub const SAMPLE_RATE: u32 = 22050;

/// Words required before a sentence boundary (`.`, `!`, `?`, newline) cuts a segment.
pub const MIN_WORDS_PRIMARY: usize = 5;

/// Words required before a clause boundary (`:`, `;`) cuts a segment.
pub const MIN_WORDS_SECONDARY: usize = 10;

/// Forced-cut threshold while nothing is playing yet.
///
/// Kept low so the first audio starts quickly.
pub const INITIAL_SEGMENT_THRESHOLD: usize = 15;

/// Forced-cut threshold once speech is already playing.
///
/// Larger segments give the voice more context and fewer engine invocations.
pub const SUSTAINED_SEGMENT_THRESHOLD: usize = 50;

/// Minimum time between two segment cuts, in milliseconds.
pub const MIN_SEGMENT_INTERVAL_MS: u64 = 100;

/// Ring buffer capacity in samples (~190s at 22.05kHz).
pub const RING_CAPACITY_SAMPLES: usize = 4 * 1024 * 1024;

/// Consecutive zero-progress write attempts before a segment's remainder is dropped.
pub const WRITE_RETRY_BUDGET: u32 = 50;

/// Sleep between write attempts while the ring buffer is full, in milliseconds.
pub const WRITE_BACKOFF_MS: u64 = 20;

/// Audio buffered before the output stream is opened, in milliseconds.
pub const PREROLL_MS: u32 = 200;

/// How long a partial preroll may wait before playback starts anyway, in milliseconds.
pub const STARTUP_TIMEOUT_MS: u64 = 300;

/// Playback driver polling interval, in milliseconds.
pub const PLAYBACK_POLL_MS: u64 = 10;

/// Grace period after the last sample is pulled before the stream closes, in milliseconds.
pub const DRAIN_TAIL_MS: u64 = 60;

/// Upper bound for `stop()` to wait on the playback driver, in milliseconds.
pub const STOP_TIMEOUT_MS: u64 = 2000;

/// Per-segment synthesis deadline for subprocess engines, in milliseconds.
pub const SYNTHESIS_TIMEOUT_MS: u64 = 30_000;

/// Default piper executable.
pub const PIPER_BINARY: &str = "piper";

/// Piper voice suggested by `voxflow models install` when none is named.
pub const DEFAULT_VOICE: &str = "fr_FR-siwis-medium";

/// Repository the piper voices are downloaded from.
pub const VOICES_BASE_URL: &str = "https://huggingface.co/rhasspy/piper-voices/resolve/main";

/// Peak level segments are normalized to (fraction of full scale).
pub const NORMALIZE_PEAK: f32 = 0.8;

/// Fade in/out applied to each segment, in milliseconds.
pub const FADE_MS: u32 = 10;

/// Convert a duration in milliseconds to a sample count at `sample_rate`.
pub fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (u64::from(ms) * u64::from(sample_rate) / 1000) as usize
}
