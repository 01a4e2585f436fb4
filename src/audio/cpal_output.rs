//! Speaker output using CPAL (Cross-Platform Audio Library).

use crate::audio::output::{AudioOutput, DeviceFaults, RenderFn};
use crate::error::{Result, VoxflowError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};

/// Frames rendered per scratch pass when the device is not i16 mono.
const SCRATCH_FRAMES: usize = 4096;

/// Device name patterns that are never useful for speech playback.
const FILTERED_PATTERNS: &[&str] = &["surround", "rear:", "center:", "side:", "S/PDIF"];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

/// List output device names, skipping multichannel/digital endpoints.
///
/// # Errors
/// Returns `VoxflowError::AudioOutput` if device enumeration fails.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| VoxflowError::AudioOutput {
            message: format!("Failed to enumerate output devices: {}", e),
        })?;

    Ok(devices
        .filter_map(|device| device.name().ok())
        .filter(|name| !should_filter_device(name))
        .collect())
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is created, played and dropped by whichever thread owns
/// the `CpalOutput`; it is never shared, only moved together with its owner.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Real audio output implementation using CPAL.
///
/// Prefers an i16 stream at the synthesis rate; falls back to f32 and to
/// multichannel configs, duplicating the mono signal across channels.
pub struct CpalOutput {
    device: cpal::Device,
    name: String,
    stream: Option<SendableStream>,
}

impl CpalOutput {
    /// Create a new CPAL output.
    ///
    /// # Arguments
    /// * `device_name` - Optional device name. If None, uses the default output device.
    ///
    /// # Errors
    /// Returns `VoxflowError::AudioDeviceNotFound` if the device does not exist.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(wanted) => host
                .output_devices()
                .map_err(|e| VoxflowError::AudioOutput {
                    message: format!("Failed to enumerate devices: {}", e),
                })?
                .find(|dev| dev.name().is_ok_and(|name| name == wanted))
                .ok_or_else(|| VoxflowError::AudioDeviceNotFound {
                    device: wanted.to_string(),
                })?,
            None => host
                .default_output_device()
                .ok_or_else(|| VoxflowError::AudioDeviceNotFound {
                    device: "default".to_string(),
                })?,
        };

        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        Ok(Self {
            device,
            name,
            stream: None,
        })
    }

    /// Pick a supported config at `sample_rate`, preferring mono and i16.
    fn select_config(&self, sample_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
        let rate = cpal::SampleRate(sample_rate);
        let mut candidates: Vec<_> = self
            .device
            .supported_output_configs()
            .map_err(|e| VoxflowError::AudioOutput {
                message: format!("Failed to query output configs: {}", e),
            })?
            .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .filter(|c| matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32))
            .collect();

        candidates.sort_by_key(|c| (c.channels(), c.sample_format() != SampleFormat::I16));

        let chosen = candidates
            .into_iter()
            .next()
            .ok_or_else(|| VoxflowError::AudioOutput {
                message: format!("{} has no i16/f32 output config at {}Hz", self.name, sample_rate),
            })?;

        let format = chosen.sample_format();
        Ok((chosen.with_sample_rate(rate).config(), format))
    }

    fn build_stream(
        &self,
        config: &StreamConfig,
        format: SampleFormat,
        mut render: RenderFn,
        faults: DeviceFaults,
    ) -> Result<cpal::Stream> {
        let channels = usize::from(config.channels).max(1);
        let err_callback = move |err: cpal::StreamError| {
            tracing::error!(error = %err, "audio output stream error");
            faults.report(err.to_string());
        };

        // Allocated once here; the callbacks below only index into it.
        let mut scratch = vec![0i16; SCRATCH_FRAMES];

        let stream = match format {
            SampleFormat::I16 => self.device.build_output_stream(
                config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    if channels == 1 {
                        render(data);
                        return;
                    }
                    for block in data.chunks_mut(SCRATCH_FRAMES * channels) {
                        let frames = block.len() / channels;
                        render(&mut scratch[..frames]);
                        for (frame, &sample) in block.chunks_mut(channels).zip(&scratch[..frames]) {
                            frame.fill(sample);
                        }
                    }
                },
                err_callback,
                None,
            ),
            SampleFormat::F32 => self.device.build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for block in data.chunks_mut(SCRATCH_FRAMES * channels) {
                        let frames = block.len() / channels;
                        render(&mut scratch[..frames]);
                        for (frame, &sample) in block.chunks_mut(channels).zip(&scratch[..frames]) {
                            frame.fill(f32::from(sample) / 32768.0);
                        }
                    }
                },
                err_callback,
                None,
            ),
            other => {
                return Err(VoxflowError::AudioOutput {
                    message: format!("unsupported sample format {:?}", other),
                });
            }
        };

        stream.map_err(|e| VoxflowError::AudioOutput {
            message: format!("Failed to build output stream on {}: {}", self.name, e),
        })
    }
}

impl AudioOutput for CpalOutput {
    fn open(&mut self, sample_rate: u32, render: RenderFn, faults: DeviceFaults) -> Result<()> {
        self.close();

        let (config, format) = self.select_config(sample_rate)?;
        let stream = self.build_stream(&config, format, render, faults)?;
        stream.play().map_err(|e| VoxflowError::AudioOutput {
            message: format!("Failed to start output stream: {}", e),
        })?;

        tracing::debug!(
            device = %self.name,
            sample_rate,
            channels = config.channels,
            format = ?format,
            "output stream opened"
        );
        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn close(&mut self) {
        if let Some(SendableStream(stream)) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::debug!(error = %e, "pausing output stream failed");
            }
            drop(stream);
            tracing::debug!(device = %self.name, "output stream closed");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}
