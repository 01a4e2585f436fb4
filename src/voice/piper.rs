//! Piper neural TTS driven as a subprocess.
//!
//! Each call spawns `piper --model <onnx> --output-raw`, writes the text to
//! stdin and collects raw S16LE mono samples from stdout. The model's sample
//! rate comes from the `<model>.onnx.json` file that ships next to it.

use crate::defaults;
use crate::error::{Result, VoxflowError};
use serde::Deserialize;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::VoiceEngine;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Deserialize)]
struct ModelConfig {
    audio: ModelAudio,
}

#[derive(Debug, Deserialize)]
struct ModelAudio {
    sample_rate: u32,
}

/// Voice engine backed by the `piper` binary.
#[derive(Debug, Clone)]
pub struct PiperVoice {
    binary: PathBuf,
    model: PathBuf,
    name: String,
    sample_rate: u32,
    timeout: Duration,
}

impl PiperVoice {
    /// Create a voice for the given `.onnx` model.
    ///
    /// # Errors
    /// Returns `VoxflowError::VoiceModelNotFound` if the model file is missing.
    pub fn new(model: impl Into<PathBuf>) -> Result<Self> {
        let model = model.into();
        if !model.exists() {
            return Err(VoxflowError::VoiceModelNotFound {
                path: model.display().to_string(),
            });
        }

        let sample_rate = read_model_sample_rate(&model).unwrap_or_else(|| {
            tracing::debug!(
                model = %model.display(),
                "no readable model config, assuming {}Hz",
                defaults::SAMPLE_RATE
            );
            defaults::SAMPLE_RATE
        });

        let name = model
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "piper".to_string());

        Ok(Self {
            binary: PathBuf::from(defaults::PIPER_BINARY),
            model,
            name,
            sample_rate,
            timeout: Duration::from_millis(defaults::SYNTHESIS_TIMEOUT_MS),
        })
    }

    /// Use a specific piper executable instead of the one on `PATH`.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Kill synthesis that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &Path {
        &self.model
    }

    fn spawn(&self) -> Result<Child> {
        Command::new(&self.binary)
            .arg("--model")
            .arg(&self.model)
            .arg("--output-raw")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    VoxflowError::VoiceEngineNotFound {
                        engine: self.binary.display().to_string(),
                    }
                } else {
                    VoxflowError::Synthesis {
                        message: format!("Failed to start {}: {}", self.binary.display(), e),
                    }
                }
            })
    }

    /// Poll the child until it exits or the timeout elapses.
    fn wait_with_timeout(&self, child: &mut Child) -> Result<ExitStatus> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                if let Err(e) = child.kill() {
                    tracing::warn!(error = %e, "failed to kill piper");
                }
                if let Err(e) = child.wait() {
                    tracing::warn!(error = %e, "failed to reap piper");
                }
                return Err(VoxflowError::SynthesisTimeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl VoiceEngine for PiperVoice {
    fn synthesize(&self, text: &str) -> Result<Vec<i16>> {
        let mut child = self.spawn()?;

        // Readers start before stdin is written so a full pipe never stalls piper.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        if let Some(mut stdin) = child.stdin.take() {
            let written = stdin
                .write_all(text.as_bytes())
                .and_then(|()| stdin.write_all(b"\n"));
            if let Err(e) = written {
                tracing::warn!(error = %e, "writing text to piper failed");
            }
        }

        let status = self.wait_with_timeout(&mut child)?;
        let raw = stdout.map(join_reader).unwrap_or_default();
        let errors = stderr.map(join_reader).unwrap_or_default();

        if !status.success() {
            let message = String::from_utf8_lossy(&errors);
            return Err(VoxflowError::Synthesis {
                message: format!("piper exited with {}: {}", status, message.trim()),
            });
        }

        let samples = decode_s16le(&raw);
        tracing::trace!(chars = text.len(), samples = samples.len(), "piper synthesized");
        Ok(samples)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Err(e) = reader.read_to_end(&mut bytes) {
            tracing::debug!(error = %e, "reading piper output failed");
        }
        bytes
    })
}

fn join_reader(handle: JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

/// Raw little-endian 16-bit samples; a trailing odd byte is ignored.
fn decode_s16le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Sample rate from `<model>.json` (piper's `model.onnx.json` convention).
fn read_model_sample_rate(model: &Path) -> Option<u32> {
    let mut config_path = model.as_os_str().to_owned();
    config_path.push(".json");
    let content = std::fs::read_to_string(PathBuf::from(config_path)).ok()?;
    sample_rate_from_config(&content)
}

/// Output sample rate declared by a piper voice config.
pub(crate) fn sample_rate_from_config(json: &str) -> Option<u32> {
    let config: ModelConfig = serde_json::from_str(json).ok()?;
    Some(config.audio.sample_rate)
}
