//! Per-segment loudness and edge shaping.
//!
//! Segments are synthesized independently, so their levels differ and their
//! edges start/stop abruptly. Peak normalization evens out the level and a
//! short linear fade removes the click at each boundary.

use crate::defaults;

/// Shaping parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapingConfig {
    /// Target peak as a fraction of full scale; `None` disables normalization
    pub normalize_peak: Option<f32>,
    /// Fade in/out length in milliseconds; 0 disables fades
    pub fade_ms: u32,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            normalize_peak: Some(defaults::NORMALIZE_PEAK),
            fade_ms: defaults::FADE_MS,
        }
    }
}

impl ShapingConfig {
    /// Leaves audio untouched.
    pub fn passthrough() -> Self {
        Self {
            normalize_peak: None,
            fade_ms: 0,
        }
    }
}

/// Normalizes and fades `samples` in place.
pub fn shape_segment(samples: &mut [i16], sample_rate: u32, config: &ShapingConfig) {
    if samples.is_empty() {
        return;
    }

    if let Some(peak) = config.normalize_peak {
        normalize_peak(samples, peak);
    }

    let fade = defaults::ms_to_samples(config.fade_ms, sample_rate);
    if fade > 0 && samples.len() > 2 * fade {
        apply_fades(samples, fade);
    }
}

/// Scales samples so the loudest one reaches `target` of full scale.
///
/// Silent input is left untouched.
fn normalize_peak(samples: &mut [i16], target: f32) {
    let max = samples
        .iter()
        .map(|&s| i32::from(s).unsigned_abs())
        .max()
        .unwrap_or(0);
    if max == 0 {
        return;
    }

    let gain = target.clamp(0.0, 1.0) * f32::from(i16::MAX) / max as f32;
    for sample in samples.iter_mut() {
        *sample = (f32::from(*sample) * gain)
            .round()
            .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
    }
}

/// Linear ramps over the first and last `fade` samples.
fn apply_fades(samples: &mut [i16], fade: usize) {
    let len = samples.len();
    let denom = (fade - 1).max(1) as f32;
    for i in 0..fade {
        let gain = i as f32 / denom;
        samples[i] = (f32::from(samples[i]) * gain) as i16;
        let j = len - 1 - i;
        samples[j] = (f32::from(samples[j]) * gain) as i16;
    }
}
