//! Synthesis workers: one thread per finalized segment.
//!
//! A worker normalizes the text, breaks long sentences into clause pieces,
//! synthesizes and shapes each piece, then waits for its turn at the
//! ordering gate before copying the samples into the ring buffer. Generation
//! checks happen before each engine call, after the turn arrives, and inside
//! every ring write.

use crate::audio::{resample, shape_segment};
use crate::error::{Result, VoxflowError};
use crate::pipeline::error::StationError;
use crate::pipeline::gate::{Ticket, TurnGuard};
use crate::pipeline::shared::Shared;
use crate::pipeline::stats::{PipelineFault, StatsCounters};
use crate::text::{Segment, normalize_for_speech, synthesis_pieces};
use crate::voice::VoiceEngine;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const STATION: &str = "synthesis";

/// One segment's worth of work.
pub(crate) struct SynthesisJob {
    pub segment: Segment,
    pub generation: u64,
    pub guard: TurnGuard,
}

/// Result of copying a segment into the ring buffer.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    Complete,
    Stale,
    Overflow { dropped: usize, retries: u32 },
}

/// Counts a worker as in flight until dropped, panics included.
struct InFlight(Arc<Shared>);

impl InFlight {
    fn enter(shared: Arc<Shared>) -> Self {
        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Synthesizes one segment and writes it in order. Never panics on engine errors.
pub(crate) fn run_job(shared: &Shared, voice: &dyn VoiceEngine, job: SynthesisJob) {
    let SynthesisJob {
        segment,
        generation,
        guard,
    } = job;
    let sequence = segment.sequence;

    if !shared.generation.is_current(generation) {
        StatsCounters::incr(&shared.stats.stale_discards);
        tracing::trace!(segment = sequence, generation, "stale before synthesis");
        return;
    }

    let text = normalize_for_speech(&segment.text);
    if text.is_empty() {
        tracing::debug!(segment = sequence, "nothing speakable after normalization");
        return;
    }

    let started = Instant::now();
    let pieces = synthesis_pieces(&text);
    let mut samples = Vec::new();
    for piece in &pieces {
        if !shared.generation.is_current(generation) {
            StatsCounters::incr(&shared.stats.stale_discards);
            tracing::trace!(segment = sequence, generation, "stale between pieces");
            return;
        }
        match synthesize_piece(shared, voice, piece) {
            Ok(audio) => samples.extend_from_slice(&audio),
            Err(e) => {
                StatsCounters::incr(&shared.stats.segments_failed);
                shared.reporter.report(
                    STATION,
                    &StationError::Recoverable(format!("segment {} dropped: {}", sequence, e)),
                );
                return;
            }
        }
    }
    tracing::debug!(
        segment = sequence,
        pieces = pieces.len(),
        samples = samples.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "segment synthesized"
    );

    if !guard.wait_turn() {
        StatsCounters::incr(&shared.stats.stale_discards);
        tracing::trace!(segment = sequence, generation, "stale at turn");
        return;
    }

    match write_all(shared, generation, &samples) {
        WriteOutcome::Complete => {
            StatsCounters::incr(&shared.stats.segments_written);
        }
        WriteOutcome::Stale => {
            StatsCounters::incr(&shared.stats.stale_discards);
            tracing::trace!(segment = sequence, generation, "stale during write");
        }
        WriteOutcome::Overflow { dropped, retries } => {
            StatsCounters::add(&shared.stats.dropped_samples, dropped as u64);
            StatsCounters::incr(&shared.stats.buffer_overflows);
            tracing::warn!(
                segment = sequence,
                "{}",
                VoxflowError::BufferOverflow { dropped, retries }
            );
            shared.escalate(
                STATION,
                PipelineFault::BufferOverflow {
                    segment: sequence,
                    dropped,
                },
            );
        }
    }
}

/// One engine call, resampled to the pipeline rate and shaped on its own.
fn synthesize_piece(shared: &Shared, voice: &dyn VoiceEngine, piece: &str) -> Result<Vec<i16>> {
    let mut samples = voice.synthesize(piece)?;
    let rate = shared.config.sample_rate;
    if voice.sample_rate() != rate {
        samples = resample(&samples, voice.sample_rate(), rate);
    }
    shape_segment(&mut samples, rate, &shared.config.shaping);
    Ok(samples)
}

/// Copies `samples` into the ring, backing off while it is full.
///
/// The retry budget counts consecutive attempts that made no progress; any
/// accepted sample resets it.
pub(crate) fn write_all(shared: &Shared, generation: u64, samples: &[i16]) -> WriteOutcome {
    let budget = shared.config.write_retry_budget;
    let backoff = shared.config.write_backoff;
    let mut offset = 0;
    let mut stalled = 0u32;

    while offset < samples.len() {
        match shared.ring.write_for(generation, &samples[offset..]) {
            None => return WriteOutcome::Stale,
            Some(0) => {
                if stalled >= budget {
                    return WriteOutcome::Overflow {
                        dropped: samples.len() - offset,
                        retries: stalled,
                    };
                }
                stalled += 1;
                thread::sleep(backoff);
            }
            Some(written) => {
                offset += written;
                stalled = 0;
            }
        }
    }
    WriteOutcome::Complete
}

/// Tracks worker threads so panics are noticed and shutdown can join them.
#[derive(Default)]
pub(crate) struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a synthesis thread for `job`.
    pub fn spawn(
        &mut self,
        shared: &Arc<Shared>,
        voice: Arc<dyn VoiceEngine>,
        job: SynthesisJob,
    ) -> Result<()> {
        let in_flight = InFlight::enter(Arc::clone(shared));
        let name = format!("voxflow-synth-{}", job.segment.sequence);
        let handle = thread::Builder::new().name(name).spawn(move || {
            run_job(&in_flight.0, voice.as_ref(), job);
            drop(in_flight);
        })?;
        self.handles.push(handle);
        Ok(())
    }

    /// Starts the end-of-input marker: once every earlier segment has been
    /// written, the ring is marked finished unless more segments arrived.
    pub fn spawn_finisher(&mut self, shared: &Arc<Shared>, ticket: Ticket) -> Result<()> {
        let shared = Arc::clone(shared);
        let guard = TurnGuard::new(Arc::clone(&shared.gate), ticket);
        let handle = thread::Builder::new()
            .name("voxflow-finish".to_string())
            .spawn(move || {
                if guard.wait_turn()
                    && shared
                        .gate
                        .run_if_last(&guard.ticket(), || shared.ring.mark_finished())
                {
                    tracing::trace!(generation = ticket.generation, "input finished");
                }
            })?;
        self.handles.push(handle);
        Ok(())
    }

    /// Joins finished threads, reporting any that panicked.
    pub fn reap(&mut self, shared: &Shared) {
        let (finished, running): (Vec<_>, Vec<_>) =
            self.handles.drain(..).partition(|h| h.is_finished());
        self.handles = running;
        for handle in finished {
            Self::join(shared, handle);
        }
    }

    fn join(shared: &Shared, handle: JoinHandle<()>) {
        let name = handle.thread().name().unwrap_or("worker").to_string();
        if let Err(panic_info) = handle.join() {
            let msg = panic_info
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                .unwrap_or("unknown panic");
            StatsCounters::incr(&shared.stats.worker_panics);
            shared.reporter.report(
                STATION,
                &StationError::Recoverable(format!("{} panicked: {}", name, msg)),
            );
        }
    }

    /// Waits up to `timeout` for all threads, then detaches the rest.
    pub fn shutdown(&mut self, shared: &Shared, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let poll_interval = Duration::from_millis(10);
        loop {
            self.reap(shared);
            if self.handles.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    threads = self.handles.len(),
                    "shutdown timeout, detaching synthesis threads"
                );
                // Dropping JoinHandles detaches threads; they die with the process.
                self.handles.clear();
                break;
            }
            thread::sleep(poll_interval);
        }
    }

    /// Threads not yet reaped.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.handles.len()
    }
}
