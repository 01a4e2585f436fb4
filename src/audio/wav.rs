//! WAV helpers: a paced virtual output device and sample-rate conversion.

use crate::audio::output::{AudioOutput, DeviceFaults, RenderFn};
use crate::error::{Result, VoxflowError};
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Writer = hound::WavWriter<BufWriter<File>>;

/// Output device that "plays" into a WAV file in real time.
///
/// Pulls one period of samples at the same cadence a sound card would, so the
/// pipeline behaves exactly as it does on speakers (preroll, underruns,
/// draining). Successive streams append to the same file; the header is
/// finalized when the device is dropped or [`finish`](Self::finish) is called.
pub struct WavFileOutput {
    path: PathBuf,
    name: String,
    period: Duration,
    writer: Arc<Mutex<Option<Writer>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl WavFileOutput {
    /// Create a device writing to `path`. The file is created on first open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("wav:{}", path.display());
        Self {
            path,
            name,
            period: Duration::from_millis(20),
            writer: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Override the pull period (default 20ms).
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period.max(Duration::from_millis(1));
        self
    }

    /// Stop any stream and finalize the WAV header.
    pub fn finish(&mut self) -> Result<()> {
        self.close();
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(writer) = writer {
            writer.finalize().map_err(|e| VoxflowError::AudioOutput {
                message: format!("Failed to finalize {}: {}", self.path.display(), e),
            })?;
        }
        Ok(())
    }

    fn ensure_writer(&self, sample_rate: u32) -> Result<()> {
        let mut slot = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Ok(());
        }
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&self.path, spec).map_err(|e| {
            VoxflowError::AudioOutput {
                message: format!("Failed to create {}: {}", self.path.display(), e),
            }
        })?;
        *slot = Some(writer);
        Ok(())
    }
}

impl AudioOutput for WavFileOutput {
    fn open(&mut self, sample_rate: u32, mut render: RenderFn, faults: DeviceFaults) -> Result<()> {
        self.close();
        self.ensure_writer(sample_rate)?;
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let writer = Arc::clone(&self.writer);
        let period = self.period;
        let frames = crate::defaults::ms_to_samples(period.as_millis() as u32, sample_rate).max(1);

        self.worker = Some(thread::spawn(move || {
            let mut buffer = vec![0i16; frames];
            let mut next_tick = Instant::now();
            while running.load(Ordering::SeqCst) {
                render(&mut buffer);
                {
                    let mut slot = writer.lock().unwrap_or_else(PoisonError::into_inner);
                    if let Some(w) = slot.as_mut()
                        && let Err(e) = buffer.iter().try_for_each(|&s| w.write_sample(s))
                    {
                        faults.report(format!("WAV write failed: {}", e));
                        break;
                    }
                }
                next_tick += period;
                if let Some(wait) = next_tick.checked_duration_since(Instant::now()) {
                    thread::sleep(wait);
                }
            }
        }));

        tracing::debug!(device = %self.name, sample_rate, "wav output opened");
        Ok(())
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!(device = %self.name, "wav output thread panicked");
        }
    }

    fn is_open(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for WavFileOutput {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!(error = %e, "finalizing wav output failed");
        }
    }
}

/// Read a mono 16-bit WAV into memory, downmixing stereo.
///
/// Returns the samples and their sample rate.
pub fn read_wav(reader: impl Read) -> Result<(Vec<i16>, u32)> {
    let mut wav_reader = hound::WavReader::new(reader).map_err(|e| VoxflowError::Other(format!(
        "Failed to parse WAV data: {}",
        e
    )))?;

    let spec = wav_reader.spec();
    let raw: Vec<i16> = wav_reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| VoxflowError::Other(format!("Failed to read WAV samples: {}", e)))?;

    let samples = if spec.channels == 2 {
        raw.chunks_exact(2)
            .map(|pair| ((i32::from(pair[0]) + i32::from(pair[1])) / 2) as i16)
            .collect()
    } else {
        raw
    };
    Ok((samples, spec.sample_rate))
}

/// Read a WAV file from disk. See [`read_wav`].
pub fn read_wav_file(path: &Path) -> Result<(Vec<i16>, u32)> {
    read_wav(std::io::BufReader::new(File::open(path)?))
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}
