//! Observable counters and escalated faults.

use crate::audio::RingStats;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by workers and the playback driver.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub segments_dispatched: AtomicU64,
    pub segments_written: AtomicU64,
    pub segments_failed: AtomicU64,
    pub stale_discards: AtomicU64,
    pub dropped_samples: AtomicU64,
    pub buffer_overflows: AtomicU64,
    pub worker_panics: AtomicU64,
}

impl StatsCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn snapshot(&self, ring: RingStats) -> PipelineStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineStats {
            segments_dispatched: load(&self.segments_dispatched),
            segments_written: load(&self.segments_written),
            segments_failed: load(&self.segments_failed),
            stale_discards: load(&self.stale_discards),
            dropped_samples: load(&self.dropped_samples),
            buffer_overflows: load(&self.buffer_overflows),
            worker_panics: load(&self.worker_panics),
            samples_written: ring.written,
            samples_read: ring.read,
            underrun_samples: ring.underrun_samples,
        }
    }
}

/// Point-in-time view of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub segments_dispatched: u64,
    pub segments_written: u64,
    pub segments_failed: u64,
    pub stale_discards: u64,
    pub dropped_samples: u64,
    pub buffer_overflows: u64,
    pub worker_panics: u64,
    pub samples_written: u64,
    pub samples_read: u64,
    pub underrun_samples: u64,
}

/// A failure escalated to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineFault {
    /// A segment could not fit in the ring buffer within the retry budget.
    BufferOverflow { segment: u64, dropped: usize },
    /// The output device failed to open or died while streaming.
    Device { message: String },
}

impl fmt::Display for PipelineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferOverflow { segment, dropped } => write!(
                f,
                "buffer overflow in segment {}: {} samples dropped",
                segment, dropped
            ),
            Self::Device { message } => write!(f, "output device failed: {}", message),
        }
    }
}
