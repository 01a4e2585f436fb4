//! Streaming speech pipeline.
//!
//! Text fragments enter through [`SpeechPipeline::feed`], are cut into
//! segments, synthesized on one thread per segment, written in order into a
//! PCM ring buffer and pulled by the output device on its real-time thread.
//! Every stage checks a shared generation token so `stop()` cancels work in
//! flight without waiting for it.

pub mod controller;
pub mod error;
pub mod gate;
pub(crate) mod playback;
pub(crate) mod shared;
pub mod state;
pub mod stats;
pub(crate) mod worker;

pub use controller::{PipelineConfig, SpeechPipeline, StopHandle};
pub use error::{ErrorReporter, LogReporter, StationError};
pub use gate::{OrderingGate, Ticket, TurnGuard};
pub use state::{GenerationToken, PipelineState, PlaybackState};
pub use stats::{PipelineFault, PipelineStats};
