//! Text side of the pipeline: segmentation of the streamed response and
//! cleanup of each segment before it reaches the voice engine.

pub mod prosody;
pub mod segmenter;
pub mod split;

pub use prosody::normalize_for_speech;
pub use segmenter::{Segment, Segmenter, SegmenterConfig};
pub use split::{split_clauses, split_sentences, synthesis_pieces};
