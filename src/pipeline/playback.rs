//! Playback driver: owns the output device and decides when a stream runs.
//!
//! The driver thread polls the ring buffer and a control channel. It opens a
//! stream once enough audio is buffered (preroll), or once any audio has
//! waited for the startup timeout, or once input is finished. The stream's
//! render callback only copies from the ring. Underruns play silence; the
//! stream closes when the ring is drained and no synthesis is pending.

use crate::audio::{AudioOutput, DeviceFaults};
use crate::defaults;
use crate::error::Result;
use crate::pipeline::shared::Shared;
use crate::pipeline::state::{PipelineState, PlaybackState};
use crate::pipeline::stats::PipelineFault;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const STATION: &str = "playback";

/// Messages from the controller to the driver thread.
#[derive(Debug)]
pub(crate) enum PlaybackCommand {
    /// Close any stream and return to `NoStream`; ack once done.
    Reset { generation: u64, ack: Sender<()> },
    /// Close any stream and exit.
    Shutdown,
}

pub(crate) struct PlaybackDriver {
    shared: Arc<Shared>,
    output: Box<dyn AudioOutput>,
    commands: Receiver<PlaybackCommand>,
    faults: DeviceFaults,
    preroll_samples: usize,
    data_since: Option<Instant>,
    draining_since: Option<Instant>,
}

impl PlaybackDriver {
    pub fn new(
        shared: Arc<Shared>,
        output: Box<dyn AudioOutput>,
        commands: Receiver<PlaybackCommand>,
    ) -> Self {
        let preroll_ms = u32::try_from(shared.config.preroll.as_millis()).unwrap_or(u32::MAX);
        let preroll_samples = defaults::ms_to_samples(preroll_ms, shared.config.sample_rate);
        Self {
            shared,
            output,
            commands,
            faults: DeviceFaults::new(),
            preroll_samples,
            data_since: None,
            draining_since: None,
        }
    }

    /// Runs the driver on its own named thread.
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let shared = Arc::clone(&self.shared);
        shared.playback_running.store(true, Ordering::SeqCst);
        thread::Builder::new()
            .name("voxflow-playback".to_string())
            .spawn(move || self.run())
            .map_err(|e| {
                shared.playback_running.store(false, Ordering::SeqCst);
                e.into()
            })
    }

    fn run(mut self) {
        tracing::debug!(device = self.output.name(), "playback driver started");
        let poll = self.shared.config.poll_interval;
        loop {
            match self.commands.recv_timeout(poll) {
                Ok(PlaybackCommand::Reset { generation, ack }) => {
                    self.reset();
                    tracing::trace!(generation, "playback reset");
                    if ack.send(()).is_err() {
                        tracing::trace!(generation, "stop no longer waiting for playback ack");
                    }
                }
                Ok(PlaybackCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
            self.tick();
        }
        self.close_stream();
        self.shared.playback_running.store(false, Ordering::SeqCst);
        tracing::debug!("playback driver stopped");
    }

    fn state(&self) -> PlaybackState {
        self.shared.playback_state.load()
    }

    fn set_state(&self, state: PlaybackState) {
        let previous = self.shared.playback_state.load();
        if previous != state {
            tracing::trace!(from = %previous, to = %state, "playback state");
            self.shared.playback_state.store(state);
        }
    }

    /// One step of the state machine.
    fn tick(&mut self) {
        let shared = Arc::clone(&self.shared);
        let ring = &shared.ring;
        let idle_workers = shared.workers_in_flight() == 0;

        match self.state() {
            PlaybackState::NoStream => {
                if self.should_start() {
                    self.open_stream();
                } else if ring.is_drained() && idle_workers {
                    shared.speech_finished();
                }
            }
            PlaybackState::Active => {
                if self.faults.has_failed() {
                    let message = self
                        .faults
                        .message()
                        .unwrap_or_else(|| "unknown device error".to_string());
                    self.fail(message);
                } else if ring.is_drained() && idle_workers {
                    self.set_state(PlaybackState::Draining);
                    self.draining_since = Some(Instant::now());
                }
            }
            PlaybackState::Draining => {
                if !ring.is_drained() {
                    // More input arrived after finalize
                    self.draining_since = None;
                    self.set_state(PlaybackState::Active);
                } else if self
                    .draining_since
                    .is_none_or(|since| since.elapsed() >= self.drain_tail())
                {
                    self.close_stream();
                    self.set_state(PlaybackState::NoStream);
                    shared.speech_finished();
                }
            }
            PlaybackState::Starting | PlaybackState::Stopped => {}
        }
    }

    /// Time the device gets to play out what it already pulled.
    fn drain_tail(&self) -> Duration {
        Duration::from_millis(defaults::DRAIN_TAIL_MS)
    }

    fn should_start(&mut self) -> bool {
        let available = self.shared.ring.available();
        if available == 0 {
            self.data_since = None;
            return false;
        }
        if available >= self.preroll_samples || self.shared.ring.is_finished() {
            return true;
        }
        let since = *self.data_since.get_or_insert_with(Instant::now);
        since.elapsed() >= self.shared.config.startup_timeout
    }

    fn open_stream(&mut self) {
        self.set_state(PlaybackState::Starting);
        self.faults.clear();
        self.data_since = None;

        let shared = Arc::clone(&self.shared);
        let render = Box::new(move |out: &mut [i16]| {
            shared.ring.read_into(out);
        });

        match self
            .output
            .open(self.shared.config.sample_rate, render, self.faults.clone())
        {
            Ok(()) => {
                tracing::debug!(
                    device = self.output.name(),
                    buffered = self.shared.ring.available(),
                    "playback started"
                );
                self.set_state(PlaybackState::Active);
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn close_stream(&mut self) {
        if self.output.is_open() {
            self.output.close();
            tracing::debug!(device = self.output.name(), "playback stream closed");
        }
        self.draining_since = None;
    }

    fn reset(&mut self) {
        self.close_stream();
        self.faults.clear();
        self.data_since = None;
        self.set_state(PlaybackState::NoStream);
    }

    fn fail(&mut self, message: String) {
        self.close_stream();
        self.set_state(PlaybackState::Stopped);
        self.shared.state.store(PipelineState::Stopped);
        self.shared
            .escalate(STATION, PipelineFault::Device { message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{MockOutput, ShapingConfig};
    use crate::pipeline::PipelineConfig;
    use crossbeam_channel::unbounded;

    fn config() -> PipelineConfig {
        PipelineConfig {
            shaping: ShapingConfig::passthrough(),
            poll_interval: Duration::from_millis(2),
            ..PipelineConfig::default()
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_preroll_saturates_instead_of_wrapping() {
        let shared = Arc::new(Shared::new(PipelineConfig {
            preroll: Duration::from_secs(10_000_000),
            ..config()
        }));
        let (_commands, rx) = unbounded();
        let driver = PlaybackDriver::new(Arc::clone(&shared), Box::new(MockOutput::new()), rx);
        assert_eq!(
            driver.preroll_samples,
            defaults::ms_to_samples(u32::MAX, shared.config.sample_rate)
        );
    }

    struct Harness {
        shared: Arc<Shared>,
        commands: Sender<PlaybackCommand>,
        thread: Option<JoinHandle<()>>,
    }

    impl Harness {
        fn start(config: PipelineConfig, output: MockOutput) -> Self {
            let shared = Arc::new(Shared::new(config));
            let (commands, rx) = unbounded();
            let thread = PlaybackDriver::new(Arc::clone(&shared), Box::new(output), rx)
                .spawn()
                .unwrap();
            Self {
                shared,
                commands,
                thread: Some(thread),
            }
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.commands.send(PlaybackCommand::Shutdown).ok();
            if let Some(thread) = self.thread.take() {
                thread.join().unwrap();
            }
        }
    }

    #[test]
    fn test_waits_for_preroll() {
        let output = MockOutput::new();
        let recording = output.recording();
        let harness = Harness::start(
            PipelineConfig {
                startup_timeout: Duration::from_secs(60),
                ..config()
            },
            output,
        );

        harness.shared.ring.write(&[1; 100]);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(harness.shared.playback_state.load(), PlaybackState::NoStream);
        assert_eq!(recording.open_count(), 0);

        let preroll = defaults::ms_to_samples(200, defaults::SAMPLE_RATE);
        harness.shared.ring.write(&vec![1; preroll]);
        assert!(wait_until(|| recording.open_count() == 1));
    }

    #[test]
    fn test_starts_after_startup_timeout() {
        let output = MockOutput::new();
        let recording = output.recording();
        let harness = Harness::start(
            PipelineConfig {
                startup_timeout: Duration::from_millis(20),
                ..config()
            },
            output,
        );

        harness.shared.ring.write(&[7; 10]);
        assert!(wait_until(|| recording.audible().len() == 10));
        assert!(recording.audible().iter().all(|&s| s == 7));
    }

    #[test]
    fn test_finished_input_starts_immediately_and_drains() {
        let output = MockOutput::new();
        let recording = output.recording();
        let harness = Harness::start(
            PipelineConfig {
                startup_timeout: Duration::from_secs(60),
                ..config()
            },
            output,
        );
        harness.shared.state.store(PipelineState::Draining);

        harness.shared.ring.write(&[3; 50]);
        harness.shared.ring.mark_finished();

        assert!(wait_until(|| harness.shared.state.load() == PipelineState::Idle));
        assert_eq!(recording.audible(), vec![3; 50]);
        assert!(wait_until(|| {
            harness.shared.playback_state.load() == PlaybackState::NoStream
        }));
    }

    #[test]
    fn test_open_failure_stops_pipeline() {
        let harness = Harness::start(config(), MockOutput::new().with_open_failure());
        harness.shared.state.store(PipelineState::Speaking);
        harness.shared.ring.write(&[1; 10]);
        harness.shared.ring.mark_finished();

        assert!(wait_until(|| {
            harness.shared.playback_state.load() == PlaybackState::Stopped
        }));
        assert_eq!(harness.shared.state.load(), PipelineState::Stopped);
        assert!(matches!(
            harness.shared.last_fault(),
            Some(PipelineFault::Device { .. })
        ));
    }

    #[test]
    fn test_runtime_device_failure_is_escalated() {
        let harness = Harness::start(config(), MockOutput::new().with_failure_after(2));
        harness.shared.state.store(PipelineState::Speaking);
        harness.shared.ring.write(&vec![1; 100_000]);

        assert!(wait_until(|| {
            harness.shared.state.load() == PipelineState::Stopped
        }));
        assert_eq!(
            harness.shared.last_fault(),
            Some(PipelineFault::Device {
                message: "mock device disconnected".to_string()
            })
        );
    }

    #[test]
    fn test_reset_is_acknowledged_and_recovers_from_stopped() {
        let harness = Harness::start(config(), MockOutput::new().with_open_failure());
        harness.shared.ring.write(&[1; 10]);
        harness.shared.ring.mark_finished();
        assert!(wait_until(|| {
            harness.shared.playback_state.load() == PlaybackState::Stopped
        }));

        harness.shared.ring.clear(1);
        let (ack, acked) = crossbeam_channel::bounded(1);
        harness
            .commands
            .send(PlaybackCommand::Reset { generation: 1, ack })
            .unwrap();
        acked.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(harness.shared.playback_state.load(), PlaybackState::NoStream);
    }

    #[test]
    fn test_underrun_keeps_stream_open() {
        let output = MockOutput::new();
        let recording = output.recording();
        let harness = Harness::start(
            PipelineConfig {
                startup_timeout: Duration::from_millis(5),
                ..config()
            },
            output,
        );

        harness.shared.ring.write(&[2; 10]);
        assert!(wait_until(|| recording.audible().len() == 10));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(harness.shared.playback_state.load(), PlaybackState::Active);
        assert!(harness.shared.ring.stats().underrun_samples > 0);

        harness.shared.ring.write(&[4; 10]);
        assert!(wait_until(|| recording.audible().len() == 20));
        assert_eq!(recording.open_count(), 1);
    }
}
