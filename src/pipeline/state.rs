//! Pipeline and playback state machines plus the cancellation token.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Controller state as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Nothing queued or playing
    Idle,
    /// At least one segment dispatched, input still open
    Speaking,
    /// Input finalized, remaining audio playing out
    Draining,
    /// Output device failed; `stop()` recovers
    Stopped,
}

/// Playback driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    NoStream,
    Starting,
    Active,
    Draining,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Speaking => "speaking",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoStream => "no-stream",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Lock-free cell holding a [`PipelineState`].
#[derive(Debug)]
pub(crate) struct AtomicPipelineState(AtomicU8);

impl AtomicPipelineState {
    pub(crate) fn new(state: PipelineState) -> Self {
        Self(AtomicU8::new(encode_pipeline(state)))
    }

    pub(crate) fn load(&self) -> PipelineState {
        decode_pipeline(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn store(&self, state: PipelineState) {
        self.0.store(encode_pipeline(state), Ordering::SeqCst);
    }

    /// Sets `new` only if the current state is `current`.
    pub(crate) fn transition(&self, current: PipelineState, new: PipelineState) -> bool {
        self.0
            .compare_exchange(
                encode_pipeline(current),
                encode_pipeline(new),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

fn encode_pipeline(state: PipelineState) -> u8 {
    match state {
        PipelineState::Idle => 0,
        PipelineState::Speaking => 1,
        PipelineState::Draining => 2,
        PipelineState::Stopped => 3,
    }
}

fn decode_pipeline(value: u8) -> PipelineState {
    match value {
        1 => PipelineState::Speaking,
        2 => PipelineState::Draining,
        3 => PipelineState::Stopped,
        _ => PipelineState::Idle,
    }
}

/// Lock-free cell holding a [`PlaybackState`].
#[derive(Debug)]
pub(crate) struct AtomicPlaybackState(AtomicU8);

impl AtomicPlaybackState {
    pub(crate) fn new(state: PlaybackState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> PlaybackState {
        match self.0.load(Ordering::SeqCst) {
            1 => PlaybackState::Starting,
            2 => PlaybackState::Active,
            3 => PlaybackState::Draining,
            4 => PlaybackState::Stopped,
            _ => PlaybackState::NoStream,
        }
    }

    pub(crate) fn store(&self, state: PlaybackState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Shared, monotonically increasing cancellation counter.
///
/// Work captures the value when it is scheduled and compares it later; any
/// mismatch means a stop happened in between and the work is stale.
#[derive(Debug, Clone, Default)]
pub struct GenerationToken(Arc<AtomicU64>);

impl GenerationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Invalidates everything captured so far and returns the new generation.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_advances_monotonically() {
        let token = GenerationToken::new();
        assert_eq!(token.current(), 0);
        assert_eq!(token.advance(), 1);
        assert_eq!(token.advance(), 2);
        assert!(token.is_current(2));
        assert!(!token.is_current(1));
    }

    #[test]
    fn test_generation_is_shared_between_clones() {
        let token = GenerationToken::new();
        let captured = token.current();
        let clone = token.clone();
        clone.advance();
        assert!(!token.is_current(captured));
    }

    #[test]
    fn test_atomic_pipeline_state_roundtrip() {
        let cell = AtomicPipelineState::new(PipelineState::Idle);
        for state in [
            PipelineState::Speaking,
            PipelineState::Draining,
            PipelineState::Stopped,
            PipelineState::Idle,
        ] {
            cell.store(state);
            assert_eq!(cell.load(), state);
        }
    }

    #[test]
    fn test_transition_only_from_expected_state() {
        let cell = AtomicPipelineState::new(PipelineState::Idle);
        assert!(!cell.transition(PipelineState::Draining, PipelineState::Idle));
        assert_eq!(cell.load(), PipelineState::Idle);
        assert!(cell.transition(PipelineState::Idle, PipelineState::Speaking));
        assert_eq!(cell.load(), PipelineState::Speaking);
    }

    #[test]
    fn test_atomic_playback_state_roundtrip() {
        let cell = AtomicPlaybackState::new(PlaybackState::NoStream);
        for state in [
            PlaybackState::Starting,
            PlaybackState::Active,
            PlaybackState::Draining,
            PlaybackState::Stopped,
            PlaybackState::NoStream,
        ] {
            cell.store(state);
            assert_eq!(cell.load(), state);
        }
    }

    #[test]
    fn test_state_display_and_serialize() {
        assert_eq!(PipelineState::Speaking.to_string(), "speaking");
        assert_eq!(PlaybackState::NoStream.to_string(), "no-stream");
        assert_eq!(
            serde_json::to_string(&PlaybackState::NoStream).unwrap(),
            "\"no_stream\""
        );
    }
}
