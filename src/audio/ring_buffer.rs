//! Bounded PCM ring buffer between synthesis workers and the audio callback.
//!
//! One logical producer (writes are serialized by the ordering gate) and one
//! real-time consumer. Every operation holds the internal lock only for a
//! bounded copy, so the audio callback never waits behind a long critical
//! section.
//!
//! Writes can be tagged with a generation: the buffer only accepts tagged
//! writes for the epoch it was last cleared with, which lets `stop()` fence
//! out workers that finish after cancellation.

use serde::Serialize;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lifetime counters of a ring buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RingStats {
    /// Samples accepted by `write`
    pub written: u64,
    /// Real samples handed to the consumer (padding excluded)
    pub read: u64,
    /// Silence inserted because the consumer outran the producer
    pub underrun_samples: u64,
}

struct RingState {
    samples: Box<[i16]>,
    write_pos: usize,
    read_pos: usize,
    available: usize,
    finished: bool,
    epoch: u64,
    stats: RingStats,
}

impl RingState {
    fn write(&mut self, data: &[i16]) -> usize {
        let capacity = self.samples.len();
        let count = data.len().min(capacity - self.available);
        if count == 0 {
            return 0;
        }

        let first = count.min(capacity - self.write_pos);
        self.samples[self.write_pos..self.write_pos + first].copy_from_slice(&data[..first]);
        let second = count - first;
        if second > 0 {
            self.samples[..second].copy_from_slice(&data[first..count]);
        }

        self.write_pos = (self.write_pos + count) % capacity;
        self.available += count;
        self.stats.written += count as u64;
        count
    }

    fn read(&mut self, out: &mut [i16]) -> usize {
        let capacity = self.samples.len();
        let count = out.len().min(self.available);

        let first = count.min(capacity - self.read_pos);
        out[..first].copy_from_slice(&self.samples[self.read_pos..self.read_pos + first]);
        let second = count - first;
        if second > 0 {
            out[first..count].copy_from_slice(&self.samples[..second]);
        }
        out[count..].fill(0);

        self.read_pos = (self.read_pos + count) % capacity;
        self.available -= count;
        self.stats.read += count as u64;
        if count < out.len() && !self.finished {
            self.stats.underrun_samples += (out.len() - count) as u64;
        }
        count
    }
}

/// Fixed-capacity circular buffer of mono 16-bit samples.
pub struct PcmRingBuffer {
    state: Mutex<RingState>,
    data_ready: Condvar,
    capacity: usize,
}

impl PcmRingBuffer {
    /// Creates a buffer holding up to `capacity` samples (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(RingState {
                samples: vec![0i16; capacity].into_boxed_slice(),
                write_pos: 0,
                read_pos: 0,
                available: 0,
                finished: false,
                epoch: 0,
                stats: RingStats::default(),
            }),
            data_ready: Condvar::new(),
            capacity,
        }
    }

    /// Lock the state, recovering from poisoning.
    ///
    /// Every critical section is a plain copy with no panicking paths, so a
    /// poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes as many samples as fit and returns how many were written.
    pub fn write(&self, data: &[i16]) -> usize {
        if data.is_empty() {
            return 0;
        }
        let written = self.lock().write(data);
        if written > 0 {
            self.data_ready.notify_all();
        }
        written
    }

    /// Like [`write`](Self::write), but only if `generation` is the current epoch.
    ///
    /// Returns `None` when the write belongs to a cancelled generation. The
    /// check and the copy happen under the same lock as `clear`, so once
    /// `clear(new_epoch)` returns no older generation can add samples.
    pub fn write_for(&self, generation: u64, data: &[i16]) -> Option<usize> {
        let written = {
            let mut state = self.lock();
            if state.epoch != generation {
                return None;
            }
            state.write(data)
        };
        if written > 0 {
            self.data_ready.notify_all();
        }
        Some(written)
    }

    /// Reads exactly `frames` samples, zero-padding any shortfall.
    ///
    /// Allocates; the audio callback uses [`read_into`](Self::read_into).
    pub fn read(&self, frames: usize) -> Vec<i16> {
        let mut out = vec![0i16; frames];
        self.read_into(&mut out);
        out
    }

    /// Fills `out` from the buffer, zero-filling whatever is not available.
    ///
    /// Returns the number of real samples copied. Never allocates and never
    /// waits on anything but the internal lock.
    pub fn read_into(&self, out: &mut [i16]) -> usize {
        self.lock().read(out)
    }

    /// Declares that no further writes will occur for this utterance.
    pub fn mark_finished(&self) {
        self.lock().finished = true;
        self.data_ready.notify_all();
    }

    /// Accepts writes again after `mark_finished` (a new utterance begins).
    pub fn reopen(&self) {
        self.lock().finished = false;
    }

    /// Whether `mark_finished` was called since the last clear/reopen.
    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// True once finished and fully consumed.
    pub fn is_drained(&self) -> bool {
        let state = self.lock();
        state.finished && state.available == 0
    }

    /// Resets cursors, count and finished flag, and adopts `generation` as the
    /// only epoch accepted by [`write_for`](Self::write_for).
    pub fn clear(&self, generation: u64) {
        let mut state = self.lock();
        state.write_pos = 0;
        state.read_pos = 0;
        state.available = 0;
        state.finished = false;
        state.epoch = generation;
    }

    /// Epoch accepted by tagged writes.
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Samples waiting to be read.
    pub fn available(&self) -> usize {
        self.lock().available
    }

    /// Free space in samples.
    pub fn free(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Blocks until data is available or `timeout` elapses.
    ///
    /// Returns true if samples are available on return.
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .data_ready
            .wait_timeout_while(guard, timeout, |state| {
                state.available == 0 && !state.finished
            })
            .unwrap_or_else(PoisonError::into_inner);
        guard.available > 0
    }

    /// Lifetime counters.
    pub fn stats(&self) -> RingStats {
        self.lock().stats
    }
}

impl std::fmt::Debug for PcmRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("PcmRingBuffer")
            .field("capacity", &self.capacity)
            .field("available", &state.available)
            .field("finished", &state.finished)
            .field("epoch", &state.epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_write_then_read() {
        let ring = PcmRingBuffer::new(16);
        assert_eq!(ring.write(&[1, 2, 3, 4]), 4);
        assert_eq!(ring.available(), 4);
        assert_eq!(ring.read(4), vec![1, 2, 3, 4]);
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn test_read_zero_pads_shortfall() {
        let ring = PcmRingBuffer::new(16);
        ring.write(&[7, 8]);
        assert_eq!(ring.read(5), vec![7, 8, 0, 0, 0]);
        assert_eq!(ring.read(3), vec![0, 0, 0]);
    }

    #[test]
    fn test_read_into_reports_real_samples() {
        let ring = PcmRingBuffer::new(8);
        ring.write(&[5, 6, 7]);
        let mut out = [42i16; 6];
        assert_eq!(ring.read_into(&mut out), 3);
        assert_eq!(out, [5, 6, 7, 0, 0, 0]);
    }

    #[test]
    fn test_partial_write_when_nearly_full() {
        let ring = PcmRingBuffer::new(4);
        assert_eq!(ring.write(&[1, 2, 3]), 3);
        assert_eq!(ring.write(&[4, 5, 6]), 1);
        assert_eq!(ring.write(&[9]), 0);
        assert_eq!(ring.available(), 4);
        assert_eq!(ring.free(), 0);
        assert_eq!(ring.read(4), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_wraps_around() {
        let ring = PcmRingBuffer::new(5);
        ring.write(&[1, 2, 3, 4]);
        assert_eq!(ring.read(3), vec![1, 2, 3]);
        // write_pos=4, read_pos=3: this write wraps
        assert_eq!(ring.write(&[5, 6, 7, 8]), 4);
        assert_eq!(ring.available(), 5);
        assert_eq!(ring.read(5), vec![4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_available_tracks_written_minus_read() {
        let ring = PcmRingBuffer::new(64);
        let mut written = 0usize;
        let mut read = 0usize;
        let mut next = 0i16;

        // Deterministic mix of write and read sizes that stays within capacity
        for step in 0..200usize {
            let write_len = (step * 7) % 13;
            let chunk: Vec<i16> = (0..write_len)
                .map(|_| {
                    next = next.wrapping_add(1);
                    next
                })
                .collect();
            let accepted = ring.write(&chunk);
            written += accepted;

            let read_len = (step * 5) % 11;
            let mut out = vec![0i16; read_len];
            read += ring.read_into(&mut out);

            assert_eq!(ring.available(), written - read, "step {step}");
            assert!(ring.available() <= ring.capacity());
        }

        let stats = ring.stats();
        assert_eq!(stats.written, written as u64);
        assert_eq!(stats.read, read as u64);
    }

    #[test]
    fn test_no_loss_no_duplication_across_wraps() {
        let ring = PcmRingBuffer::new(10);
        let input: Vec<i16> = (1..=100).collect();
        let mut output = Vec::new();
        let mut offset = 0;

        while output.len() < input.len() {
            offset += ring.write(&input[offset..(offset + 7).min(input.len())]);
            let mut out = [0i16; 4];
            let n = ring.read_into(&mut out);
            output.extend_from_slice(&out[..n]);
        }

        assert_eq!(output, input);
    }

    #[test]
    fn test_finished_and_drained() {
        let ring = PcmRingBuffer::new(8);
        ring.write(&[1, 2]);
        assert!(!ring.is_drained());

        ring.mark_finished();
        assert!(ring.is_finished());
        assert!(!ring.is_drained(), "data still pending");

        ring.read(2);
        assert!(ring.is_drained());

        ring.reopen();
        assert!(!ring.is_finished());
        assert!(!ring.is_drained());
    }

    #[test]
    fn test_clear_resets_state() {
        let ring = PcmRingBuffer::new(8);
        ring.write(&[1, 2, 3]);
        ring.mark_finished();

        ring.clear(1);
        assert_eq!(ring.available(), 0);
        assert!(!ring.is_finished());
        assert_eq!(ring.epoch(), 1);
        assert_eq!(ring.read(2), vec![0, 0]);

        ring.write(&[4]);
        assert_eq!(ring.read(1), vec![4]);
    }

    #[test]
    fn test_write_for_rejects_stale_generation() {
        let ring = PcmRingBuffer::new(8);
        ring.clear(3);

        assert_eq!(ring.write_for(2, &[1, 2]), None);
        assert_eq!(ring.available(), 0);

        assert_eq!(ring.write_for(3, &[1, 2]), Some(2));
        assert_eq!(ring.available(), 2);
    }

    #[test]
    fn test_underrun_counted_only_while_unfinished() {
        let ring = PcmRingBuffer::new(8);
        ring.write(&[1]);
        ring.read(4);
        assert_eq!(ring.stats().underrun_samples, 3);

        ring.mark_finished();
        ring.read(4);
        assert_eq!(ring.stats().underrun_samples, 3);
    }

    #[test]
    fn test_wait_for_data_times_out() {
        let ring = PcmRingBuffer::new(8);
        let start = Instant::now();
        assert!(!ring.wait_for_data(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_wait_for_data_wakes_on_write() {
        let ring = Arc::new(PcmRingBuffer::new(8));
        let writer = Arc::clone(&ring);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.write(&[1, 2, 3]);
        });

        assert!(ring.wait_for_data(Duration::from_secs(2)));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_for_data_returns_immediately_when_available() {
        let ring = PcmRingBuffer::new(8);
        ring.write(&[1]);
        let start = Instant::now();
        assert!(ring.wait_for_data(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_concurrent_producer_consumer_preserves_order() {
        let ring = Arc::new(PcmRingBuffer::new(256));
        let producer_ring = Arc::clone(&ring);
        let total = 20_000usize;

        let producer = thread::spawn(move || {
            let data: Vec<i16> = (0..total).map(|i| (i % 30_000) as i16).collect();
            let mut offset = 0;
            while offset < data.len() {
                let end = (offset + 97).min(data.len());
                let written = producer_ring.write(&data[offset..end]);
                if written == 0 {
                    thread::yield_now();
                }
                offset += written;
            }
        });

        let mut received = Vec::with_capacity(total);
        let mut out = [0i16; 64];
        let deadline = Instant::now() + Duration::from_secs(10);
        while received.len() < total && Instant::now() < deadline {
            let n = ring.read_into(&mut out);
            received.extend_from_slice(&out[..n]);
        }
        producer.join().unwrap();

        assert_eq!(received.len(), total);
        for (i, sample) in received.iter().enumerate() {
            assert_eq!(*sample, (i % 30_000) as i16, "mismatch at {i}");
        }
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let ring = PcmRingBuffer::new(0);
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.write(&[1, 2]), 1);
    }
}
