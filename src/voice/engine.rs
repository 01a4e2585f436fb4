use crate::defaults;
use crate::error::{Result, VoxflowError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Trait for text-to-speech synthesis.
///
/// This trait allows swapping implementations (piper subprocess, tone
/// generator, mock). Implementations may block for as long as synthesis
/// takes; the pipeline always calls them from a worker thread.
pub trait VoiceEngine: Send + Sync {
    /// Synthesize `text` into mono 16-bit PCM at [`sample_rate`](Self::sample_rate).
    fn synthesize(&self, text: &str) -> Result<Vec<i16>>;

    /// Native output rate of the engine.
    fn sample_rate(&self) -> u32;

    /// Get the name of the loaded voice
    fn name(&self) -> &str;
}

/// Implement VoiceEngine for Arc<T> to allow sharing across pipelines.
impl<T: VoiceEngine> VoiceEngine for Arc<T> {
    fn synthesize(&self, text: &str) -> Result<Vec<i16>> {
        (**self).synthesize(text)
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Mock voice for testing.
///
/// Returns scripted audio per text (or a constant default), optionally after
/// a delay, and records every text it was asked to speak.
#[derive(Debug, Clone)]
pub struct MockVoice {
    sample_rate: u32,
    default_response: Vec<i16>,
    responses: HashMap<String, Vec<i16>>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    failures: HashSet<String>,
    fail_all: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockVoice {
    /// Create a mock returning 100ms of a constant signal for any text.
    pub fn new() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            default_response: vec![1000; defaults::ms_to_samples(100, defaults::SAMPLE_RATE)],
            responses: HashMap::new(),
            delays: HashMap::new(),
            default_delay: Duration::ZERO,
            failures: HashSet::new(),
            fail_all: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the audio returned for `text`
    pub fn with_response(mut self, text: &str, samples: Vec<i16>) -> Self {
        self.responses.insert(text.to_string(), samples);
        self
    }

    /// Configure the audio returned for unscripted text
    pub fn with_default_response(mut self, samples: Vec<i16>) -> Self {
        self.default_response = samples;
        self
    }

    /// Sleep for `delay` before answering `text`
    pub fn with_delay(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    /// Sleep for `delay` before answering unscripted text
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Configure the mock to fail for `text`
    pub fn with_failure_for(mut self, text: &str) -> Self {
        self.failures.insert(text.to_string());
        self
    }

    /// Configure the mock to fail on every call
    pub fn with_failure(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Texts synthesized so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockVoice {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceEngine for MockVoice {
    fn synthesize(&self, text: &str) -> Result<Vec<i16>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());

        let delay = self.delays.get(text).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        if self.fail_all || self.failures.contains(text) {
            return Err(VoxflowError::Synthesis {
                message: "mock synthesis failure".to_string(),
            });
        }

        Ok(self
            .responses
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.default_response.clone()))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn name(&self) -> &str {
        "mock"
    }
}
