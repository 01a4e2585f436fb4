//! Speech pipeline controller.
//!
//! Owns the segmenter, dispatches synthesis workers and drives the playback
//! thread. All calls return without waiting on the voice engine; `stop()`
//! waits only for the playback driver to acknowledge, bounded by
//! `stop_timeout`.

use crate::audio::{AudioOutput, ShapingConfig};
use crate::clock::Clock;
use crate::defaults;
use crate::error::{Result, VoxflowError};
use crate::pipeline::error::ErrorReporter;
use crate::pipeline::gate::TurnGuard;
use crate::pipeline::playback::{PlaybackCommand, PlaybackDriver};
use crate::pipeline::shared::Shared;
use crate::pipeline::state::{PipelineState, PlaybackState};
use crate::pipeline::stats::{PipelineFault, PipelineStats, StatsCounters};
use crate::pipeline::worker::{SynthesisJob, WorkerPool};
use crate::text::{Segment, Segmenter, SegmenterConfig};
use crate::voice::VoiceEngine;
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Output sample rate; engine audio is resampled to it
    pub sample_rate: u32,
    /// Segmentation rules
    pub segmenter: SegmenterConfig,
    /// Per-segment normalization and fades
    pub shaping: ShapingConfig,
    /// Ring buffer capacity in samples
    pub ring_capacity: usize,
    /// Consecutive no-progress write attempts before samples are dropped
    pub write_retry_budget: u32,
    /// Sleep between write attempts on a full buffer
    pub write_backoff: Duration,
    /// Audio buffered before a stream opens
    pub preroll: Duration,
    /// Partial preroll wait before playback starts anyway
    pub startup_timeout: Duration,
    /// Playback driver polling interval
    pub poll_interval: Duration,
    /// Upper bound on `stop()` waiting for playback
    pub stop_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            segmenter: SegmenterConfig::default(),
            shaping: ShapingConfig::default(),
            ring_capacity: defaults::RING_CAPACITY_SAMPLES,
            write_retry_budget: defaults::WRITE_RETRY_BUDGET,
            write_backoff: Duration::from_millis(defaults::WRITE_BACKOFF_MS),
            preroll: Duration::from_millis(u64::from(defaults::PREROLL_MS)),
            startup_timeout: Duration::from_millis(defaults::STARTUP_TIMEOUT_MS),
            poll_interval: Duration::from_millis(defaults::PLAYBACK_POLL_MS),
            stop_timeout: Duration::from_millis(defaults::STOP_TIMEOUT_MS),
        }
    }
}

/// Cancels a pipeline from any thread.
///
/// Stopping through a handle fences out all in-flight work exactly like
/// [`SpeechPipeline::stop`]; pending segmenter text is discarded on the
/// pipeline's next `feed` or `finalize`.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
    commands: Sender<PlaybackCommand>,
}

impl StopHandle {
    /// Idempotent. Returns once playback has acknowledged or `stop_timeout` elapsed.
    pub fn stop(&self) {
        let generation = self.shared.generation.advance();
        self.shared.gate.reset(generation);
        self.shared.ring.clear(generation);
        self.shared.state.store(PipelineState::Idle);

        if self.shared.playback_running.load(std::sync::atomic::Ordering::SeqCst) {
            let (ack, acked) = bounded(1);
            if self
                .commands
                .send(PlaybackCommand::Reset { generation, ack })
                .is_ok()
                && acked.recv_timeout(self.shared.config.stop_timeout).is_err()
            {
                tracing::warn!(
                    generation,
                    timeout_ms = self.shared.config.stop_timeout.as_millis() as u64,
                    "playback did not acknowledge stop in time"
                );
            }
        }
        tracing::debug!(generation, "pipeline stopped");
    }
}

/// Streaming text-to-speech pipeline.
///
/// Feed it text as it arrives; it cuts utterances, synthesizes them in
/// parallel and plays them back in order without gaps.
pub struct SpeechPipeline {
    shared: Arc<Shared>,
    voice: Arc<dyn VoiceEngine>,
    segmenter: Segmenter,
    /// Generation the segmenter's pending text belongs to
    segmenter_generation: u64,
    workers: WorkerPool,
    commands: Sender<PlaybackCommand>,
    /// Held until the playback thread is spawned
    pending_playback: Option<(Box<dyn AudioOutput>, Receiver<PlaybackCommand>)>,
    playback_thread: Option<JoinHandle<()>>,
    shut_down: bool,
}

impl SpeechPipeline {
    /// Create a pipeline. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: PipelineConfig,
        voice: Arc<dyn VoiceEngine>,
        output: Box<dyn AudioOutput>,
    ) -> Self {
        let segmenter = Segmenter::new(config.segmenter.clone());
        let shared = Arc::new(Shared::new(config));
        let (commands, command_rx) = unbounded();
        Self {
            workers: WorkerPool::new(),
            segmenter_generation: shared.generation.current(),
            shared,
            voice,
            segmenter,
            commands,
            pending_playback: Some((output, command_rx)),
            playback_thread: None,
            shut_down: false,
        }
    }

    /// Route station errors to `reporter` instead of the log.
    ///
    /// Only takes effect before [`start`](Self::start).
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.reporter = reporter,
            None => tracing::warn!("error reporter must be set before the pipeline starts"),
        }
        self
    }

    /// Use `clock` for segmentation timing.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.segmenter = Segmenter::with_clock(self.shared.config.segmenter.clone(), clock);
        self
    }

    /// Start (or restart) the pipeline with a fresh generation.
    ///
    /// The playback thread is spawned on first call. Clears any recorded fault.
    pub fn start(&mut self) -> Result<()> {
        if self.shut_down {
            return Err(VoxflowError::Other("pipeline has been shut down".to_string()));
        }
        if let Some((output, command_rx)) = self.pending_playback.take() {
            let driver = PlaybackDriver::new(Arc::clone(&self.shared), output, command_rx);
            self.playback_thread = Some(driver.spawn()?);
        }
        self.stop();
        self.shared.clear_fault();
        tracing::info!(
            voice = self.voice.name(),
            sample_rate = self.shared.config.sample_rate,
            "speech pipeline started"
        );
        Ok(())
    }

    /// Append a text fragment. Dispatches synthesis when a segment is cut.
    ///
    /// Ignored while the pipeline is `Stopped`.
    pub fn feed(&mut self, fragment: &str) {
        self.workers.reap(&self.shared);
        if self.shared.state.load() == PipelineState::Stopped {
            tracing::debug!("ignoring text while stopped");
            return;
        }
        self.sync_generation();

        let speaking = self.shared.state.load() != PipelineState::Idle;
        let mut next = self.segmenter.append(fragment, speaking);
        while let Some(segment) = next {
            self.dispatch(segment);
            next = self.segmenter.take_ready();
        }
    }

    /// Flush pending text and mark end of input.
    ///
    /// Playback drains and the pipeline returns to `Idle` on its own.
    pub fn finalize(&mut self) {
        self.workers.reap(&self.shared);
        if self.shared.state.load() == PipelineState::Stopped {
            return;
        }
        self.sync_generation();

        let mut next = self.segmenter.finalize();
        while let Some(segment) = next {
            self.dispatch(segment);
            next = self.segmenter.take_ready();
        }
        self.shared
            .state
            .transition(PipelineState::Speaking, PipelineState::Draining);

        let ticket = self.shared.gate.issue();
        if let Err(e) = self.workers.spawn_finisher(&self.shared, ticket) {
            tracing::error!(error = %e, "failed to spawn finisher, marking input finished now");
            self.shared.gate.complete(&ticket);
            self.shared.ring.mark_finished();
        }
    }

    /// Cancel everything queued or playing and return to `Idle`. Idempotent.
    pub fn stop(&mut self) {
        self.stop_handle().stop();
        self.segmenter.reset();
        self.segmenter_generation = self.shared.generation.current();
        self.workers.reap(&self.shared);
    }

    /// A handle that can stop this pipeline from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
            commands: self.commands.clone(),
        }
    }

    /// True while audio is queued, being synthesized or playing.
    pub fn is_speaking(&self) -> bool {
        matches!(
            self.shared.state.load(),
            PipelineState::Speaking | PipelineState::Draining
        )
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state.load()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.shared.playback_state.load()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.snapshot()
    }

    /// Most recent escalated fault, if any.
    pub fn last_fault(&self) -> Option<PipelineFault> {
        self.shared.last_fault()
    }

    /// Text received but not yet cut into a segment.
    pub fn pending_text(&self) -> &str {
        self.segmenter.pending()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    /// Block until speech has finished (or the pipeline stopped).
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.workers.reap(&self.shared);
            if !self.is_speaking() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.shared.config.poll_interval);
        }
    }

    /// Stop and release all threads.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.stop();

        if self.commands.send(PlaybackCommand::Shutdown).is_err() {
            tracing::debug!("playback driver already gone");
        }
        if let Some(handle) = self.playback_thread.take() {
            let deadline = Instant::now() + self.shared.config.stop_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    tracing::error!("playback thread panicked");
                }
            } else {
                tracing::warn!("playback thread did not exit in time, detaching");
            }
        }
        self.workers
            .shutdown(&self.shared, self.shared.config.stop_timeout);
        tracing::debug!("speech pipeline shut down");
    }

    /// Reset the segmenter if a stop happened through a [`StopHandle`].
    fn sync_generation(&mut self) {
        let current = self.shared.generation.current();
        if current != self.segmenter_generation {
            self.segmenter.reset();
            self.segmenter_generation = current;
        }
    }

    fn dispatch(&mut self, segment: Segment) {
        let generation = self.shared.generation.current();
        let ticket = self.shared.gate.issue();
        self.shared.ring.reopen();
        StatsCounters::incr(&self.shared.stats.segments_dispatched);
        begin_speaking(&self.shared, generation);

        tracing::debug!(
            segment = segment.sequence,
            generation,
            chars = segment.text.len(),
            "dispatching segment"
        );
        let job = SynthesisJob {
            segment,
            generation,
            guard: TurnGuard::new(Arc::clone(&self.shared.gate), ticket),
        };
        if let Err(e) = self
            .workers
            .spawn(&self.shared, Arc::clone(&self.voice), job)
        {
            StatsCounters::incr(&self.shared.stats.segments_failed);
            tracing::error!(error = %e, "failed to spawn synthesis worker");
        }
    }
}

/// Moves the pipeline to `Speaking` for a segment of `generation`.
///
/// A stop on another thread may land between reading the generation and the
/// transition; it has already stored `Idle`, so the transition is undone.
fn begin_speaking(shared: &Shared, generation: u64) {
    if !shared
        .state
        .transition(PipelineState::Idle, PipelineState::Speaking)
    {
        shared
            .state
            .transition(PipelineState::Draining, PipelineState::Speaking);
    }
    if !shared.generation.is_current(generation)
        && shared
            .state
            .transition(PipelineState::Speaking, PipelineState::Idle)
    {
        tracing::debug!(generation, "stop raced dispatch, back to idle");
    }
}

impl Drop for SpeechPipeline {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}
