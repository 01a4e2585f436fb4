//! Model-free voice that "speaks" one beep per word.
//!
//! Useful for demos and for exercising the pipeline on real hardware without
//! a neural model installed. Output is deterministic: the pitch of each beep
//! is derived from the word's bytes and its length from the word's length.

use crate::defaults;
use crate::error::Result;
use std::f32::consts::TAU;

use super::VoiceEngine;

const BASE_FREQ_HZ: f32 = 220.0;
const FREQ_SPREAD_HZ: u32 = 440;
const MS_PER_CHAR: u32 = 45;
const MIN_BEEP_MS: u32 = 80;
const GAP_MS: u32 = 60;
const AMPLITUDE: f32 = 0.3;

/// Deterministic beep generator.
#[derive(Debug, Clone)]
pub struct ToneVoice {
    sample_rate: u32,
}

impl ToneVoice {
    pub fn new() -> Self {
        Self::with_sample_rate(defaults::SAMPLE_RATE)
    }

    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
        }
    }

    fn beep(&self, word: &str, out: &mut Vec<i16>) {
        let chars = word.chars().count() as u32;
        let duration_ms = (chars * MS_PER_CHAR).max(MIN_BEEP_MS);
        let len = defaults::ms_to_samples(duration_ms, self.sample_rate);
        let freq = pitch_for(word);
        let rate = self.sample_rate as f32;

        out.extend((0..len).map(|i| {
            let t = i as f32 / rate;
            let value = (TAU * freq * t).sin() * AMPLITUDE * f32::from(i16::MAX);
            value as i16
        }));
        out.extend(std::iter::repeat_n(0, defaults::ms_to_samples(GAP_MS, self.sample_rate)));
    }
}

impl Default for ToneVoice {
    fn default() -> Self {
        Self::new()
    }
}

fn pitch_for(word: &str) -> f32 {
    let hash = word
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
    BASE_FREQ_HZ + (hash % FREQ_SPREAD_HZ) as f32
}

impl VoiceEngine for ToneVoice {
    fn synthesize(&self, text: &str) -> Result<Vec<i16>> {
        let mut samples = Vec::new();
        for word in text.split_whitespace() {
            self.beep(word, &mut samples);
        }
        Ok(samples)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn name(&self) -> &str {
        "tone"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_beep_per_word() {
        let voice = ToneVoice::with_sample_rate(1000);
        // "a" -> 80ms minimum beep, "there" -> 225ms; each followed by a 60ms gap
        let samples = voice.synthesize("a there").unwrap();
        assert_eq!(samples.len(), 80 + 60 + 225 + 60);
    }

    #[test]
    fn test_deterministic() {
        let voice = ToneVoice::new();
        assert_eq!(
            voice.synthesize("same words").unwrap(),
            voice.synthesize("same words").unwrap()
        );
    }

    #[test]
    fn test_distinct_words_have_distinct_pitch() {
        assert_ne!(pitch_for("hello"), pitch_for("world"));
    }

    #[test]
    fn test_empty_text_is_silent() {
        assert!(ToneVoice::new().synthesize("   ").unwrap().is_empty());
    }

    #[test]
    fn test_amplitude_stays_in_range() {
        let samples = ToneVoice::new().synthesize("loudness check").unwrap();
        let limit = (AMPLITUDE * f32::from(i16::MAX)) as i16 + 1;
        assert!(samples.iter().all(|&s| s.abs() <= limit));
        assert!(samples.iter().any(|&s| s != 0));
    }
}
