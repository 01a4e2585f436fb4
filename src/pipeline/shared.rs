//! State shared between the controller, synthesis workers and playback.

use crate::audio::PcmRingBuffer;
use crate::pipeline::PipelineConfig;
use crate::pipeline::error::{ErrorReporter, LogReporter, StationError};
use crate::pipeline::gate::OrderingGate;
use crate::pipeline::state::{
    AtomicPipelineState, AtomicPlaybackState, GenerationToken, PipelineState, PlaybackState,
};
use crate::pipeline::stats::{PipelineFault, PipelineStats, StatsCounters};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub(crate) struct Shared {
    pub config: PipelineConfig,
    pub ring: PcmRingBuffer,
    pub gate: Arc<OrderingGate>,
    pub generation: GenerationToken,
    pub state: AtomicPipelineState,
    pub playback_state: AtomicPlaybackState,
    pub stats: StatsCounters,
    /// Synthesis workers that have not finished yet
    pub in_flight: AtomicUsize,
    pub playback_running: AtomicBool,
    pub reporter: Arc<dyn ErrorReporter>,
    fault: Mutex<Option<PipelineFault>>,
}

impl Shared {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            ring: PcmRingBuffer::new(config.ring_capacity),
            config,
            gate: Arc::new(OrderingGate::new()),
            generation: GenerationToken::new(),
            state: AtomicPipelineState::new(PipelineState::Idle),
            playback_state: AtomicPlaybackState::new(PlaybackState::NoStream),
            stats: StatsCounters::default(),
            in_flight: AtomicUsize::new(0),
            playback_running: AtomicBool::new(false),
            reporter: Arc::new(LogReporter),
            fault: Mutex::new(None),
        }
    }

    /// Records `fault` as the most recent one and reports it.
    pub fn escalate(&self, station: &str, fault: PipelineFault) {
        let error = match &fault {
            PipelineFault::BufferOverflow { .. } => StationError::Recoverable(fault.to_string()),
            PipelineFault::Device { .. } => StationError::Fatal(fault.to_string()),
        };
        self.reporter.report(station, &error);
        *self.fault.lock().unwrap_or_else(PoisonError::into_inner) = Some(fault);
    }

    pub fn last_fault(&self) -> Option<PipelineFault> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_fault(&self) {
        *self.fault.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn workers_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> PipelineStats {
        self.stats.snapshot(self.ring.stats())
    }

    /// Playback ran out of audio with nothing left to synthesize.
    pub fn speech_finished(&self) {
        if self
            .state
            .transition(PipelineState::Draining, PipelineState::Idle)
        {
            tracing::debug!(generation = self.generation.current(), "speech finished");
        }
    }
}
