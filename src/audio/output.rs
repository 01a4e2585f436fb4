//! Output device abstraction.
//!
//! A device is a pull sink: once opened it invokes the render callback on its
//! own real-time thread, asking for a buffer of mono samples each period.
//! Devices report asynchronous failures (disconnects, stream errors) through
//! [`DeviceFaults`] rather than by returning from the callback.

use crate::error::{Result, VoxflowError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Real-time render callback: fill the slice with mono samples.
pub type RenderFn = Box<dyn FnMut(&mut [i16]) + Send + 'static>;

/// Shared slot a device uses to report a runtime failure.
#[derive(Debug, Clone, Default)]
pub struct DeviceFaults {
    failed: Arc<AtomicBool>,
    message: Arc<Mutex<Option<String>>>,
}

impl DeviceFaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure. The first message wins.
    ///
    /// Safe to call from a device's error callback.
    pub fn report(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.message.try_lock()
            && slot.is_none()
        {
            *slot = Some(message.into());
        }
        self.failed.store(true, Ordering::SeqCst);
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// The recorded failure message, if any.
    pub fn message(&self) -> Option<String> {
        self.message
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget any recorded failure.
    pub fn clear(&self) {
        *self.message.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.failed.store(false, Ordering::SeqCst);
    }
}

/// Trait for audio output devices.
///
/// This trait allows swapping implementations (real sound card, WAV file, mock).
pub trait AudioOutput: Send {
    /// Open a stream at `sample_rate` and start pulling from `render`.
    fn open(&mut self, sample_rate: u32, render: RenderFn, faults: DeviceFaults) -> Result<()>;

    /// Stop pulling and release the stream. Must be idempotent.
    fn close(&mut self);

    /// Whether a stream is currently open.
    fn is_open(&self) -> bool;

    /// Human-readable device name for logs.
    fn name(&self) -> &str;
}

/// Everything a [`MockOutput`] has pulled, shared with the test.
#[derive(Debug, Clone, Default)]
pub struct PlaybackRecording {
    samples: Arc<Mutex<Vec<i16>>>,
    opens: Arc<Mutex<u32>>,
}

impl PlaybackRecording {
    /// All samples pulled so far, silence included.
    pub fn samples(&self) -> Vec<i16> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pulled samples with silence removed.
    pub fn audible(&self) -> Vec<i16> {
        self.samples().into_iter().filter(|&s| s != 0).collect()
    }

    /// How many times the device was opened.
    pub fn open_count(&self) -> u32 {
        *self.opens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops recorded samples.
    pub fn clear(&self) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Mock output device for testing.
///
/// Pulls `period_frames` samples every `period` on a background thread and
/// records them, which makes it behave like a fast real-time device.
pub struct MockOutput {
    period_frames: usize,
    period: Duration,
    fail_open: bool,
    fail_after_pulls: Option<u64>,
    recording: PlaybackRecording,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl MockOutput {
    /// Create a mock device pulling 256 frames every millisecond.
    pub fn new() -> Self {
        Self {
            period_frames: 256,
            period: Duration::from_millis(1),
            fail_open: false,
            fail_after_pulls: None,
            recording: PlaybackRecording::default(),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Configure the pull size and cadence.
    pub fn with_period(mut self, frames: usize, period: Duration) -> Self {
        self.period_frames = frames.max(1);
        self.period = period;
        self
    }

    /// Configure the mock to fail on open
    pub fn with_open_failure(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Configure the mock to report a device fault after `pulls` callbacks
    pub fn with_failure_after(mut self, pulls: u64) -> Self {
        self.fail_after_pulls = Some(pulls);
        self
    }

    /// Handle to inspect what was played.
    pub fn recording(&self) -> PlaybackRecording {
        self.recording.clone()
    }
}

impl Default for MockOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for MockOutput {
    fn open(&mut self, _sample_rate: u32, mut render: RenderFn, faults: DeviceFaults) -> Result<()> {
        if self.fail_open {
            return Err(VoxflowError::AudioOutput {
                message: "mock open failure".to_string(),
            });
        }
        self.close();

        *self
            .recording
            .opens
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let samples = Arc::clone(&self.recording.samples);
        let frames = self.period_frames;
        let period = self.period;
        let fail_after = self.fail_after_pulls;

        self.worker = Some(thread::spawn(move || {
            let mut buffer = vec![0i16; frames];
            let mut pulls = 0u64;
            while running.load(Ordering::SeqCst) {
                if fail_after.is_some_and(|limit| pulls >= limit) {
                    faults.report("mock device disconnected");
                    break;
                }
                render(&mut buffer);
                pulls += 1;
                samples
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&buffer);
                thread::sleep(period);
            }
        }));
        Ok(())
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!("mock output thread panicked");
        }
    }

    fn is_open(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        self.close();
    }
}
