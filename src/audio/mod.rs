//! Audio side of the pipeline: the PCM hand-off buffer, per-segment shaping
//! and the output devices playback pulls into.

#[cfg(feature = "cpal-audio")]
pub mod cpal_output;
pub mod output;
pub mod ring_buffer;
pub mod shaping;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub use cpal_output::{CpalOutput, list_output_devices};
pub use output::{AudioOutput, DeviceFaults, MockOutput, PlaybackRecording, RenderFn};
pub use ring_buffer::{PcmRingBuffer, RingStats};
pub use shaping::{ShapingConfig, shape_segment};
pub use wav::{WavFileOutput, resample};
