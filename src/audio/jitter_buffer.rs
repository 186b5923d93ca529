//! A jitter buffer for emulator-produced sample chunks.
//!
//! The emulation loop pushes one timestamped chunk per emulated frame at an
//! irregular cadence; the audio callback pulls single samples at the device's
//! fixed rate. The buffer absorbs the mismatch with two bounds that are
//! always enforced together:
//!
//! - Size bound: the queue never retains more than `max_queue_samples`
//!   unread samples. A burst of fresh chunks trims the oldest data first.
//! - Age bound: the head chunk is dropped once its next unread sample is
//!   older than twice the target latency, so a stalled consumer never plays
//!   stale audio after it wakes up.
//!
//! Underruns repeat the last emitted sample instead of snapping to zero,
//! which keeps the output click-free while the producer catches up. Both
//! overflow and underrun are silently counted, never surfaced as errors:
//! there is no failure mode in steady state, only degraded quality visible
//! through [`JitterBuffer::stats`].

use crate::audio::chunk::SampleChunk;
use crate::pipeline::{BlockSource, ChunkSink};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::debug;

/// One emulated frame at 50Hz.
const DEFAULT_TARGET_LATENCY_MS: u64 = 20;
/// Head chunks older than `MAX_AGE_FACTOR * target_latency_ms` are dropped.
const MAX_AGE_FACTOR: u64 = 2;
/// Default hard ceiling on buffered audio, in milliseconds.
const DEFAULT_MAX_QUEUE_MS: u64 = 250;

/// Full scale of the internal 16-bit sample representation.
const I16_FULL_SCALE: f32 = 32768.0;

/// Tuning for one buffering session.
#[derive(Clone, Debug)]
pub struct JitterConfig {
    /// Rate the producer generates samples at, in Hz.
    pub sample_rate: u32,
    /// Steady-state buffering depth the session aims for.
    pub target_latency_ms: u64,
    /// Hard ceiling on unread samples retained across all chunks.
    pub max_queue_samples: usize,
}

impl JitterConfig {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            target_latency_ms: DEFAULT_TARGET_LATENCY_MS,
            max_queue_samples: (sample_rate as u64 * DEFAULT_MAX_QUEUE_MS / 1000) as usize,
        }
    }

    /// Oldest a head chunk may get before eviction.
    fn max_age_ms(&self) -> u64 {
        self.target_latency_ms * MAX_AGE_FACTOR
    }
}

/// Milliseconds elapsed since the buffer was created.
///
/// Producers stamp chunks with this clock rather than wall-clock time so the
/// head-age arithmetic can never run backwards.
#[derive(Clone, Copy, Debug)]
pub struct SessionClock {
    epoch: Instant,
}

impl SessionClock {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// Counters for buffer behavior, readable without taking the queue lock.
pub struct JitterStats {
    dropped_chunks: AtomicU64,
    underruns: AtomicU64,
    queued_samples: AtomicUsize,
}

impl JitterStats {
    fn new() -> Self {
        Self {
            dropped_chunks: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            queued_samples: AtomicUsize::new(0),
        }
    }

    /// Chunks evicted to honor the size or age bound since the last reset.
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped_chunks.load(Ordering::Acquire)
    }

    /// Pulls that found the queue empty since the last reset.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Acquire)
    }

    /// Unread samples currently retained.
    pub fn queued_samples(&self) -> usize {
        self.queued_samples.load(Ordering::Acquire)
    }

    fn record_dropped(&self, count: u64) {
        self.dropped_chunks.fetch_add(count, Ordering::AcqRel);
    }

    fn record_underruns(&self, count: u64) {
        self.underruns.fetch_add(count, Ordering::AcqRel);
    }

    fn record_queued(&self, count: usize) {
        self.queued_samples.store(count, Ordering::Release);
    }

    fn reset(&self) {
        self.dropped_chunks.store(0, Ordering::Release);
        self.underruns.store(0, Ordering::Release);
        self.queued_samples.store(0, Ordering::Release);
    }
}

/// A point-in-time copy of the counters, for polling by UI or logging code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub dropped_chunks: u64,
    pub underruns: u64,
    pub queued_samples: usize,
}

/// Queue state mutated under the lock. `queued_samples` is maintained
/// incrementally on every push, read, and eviction; it is never recomputed
/// by rescanning the chunks.
struct ChunkQueue {
    chunks: VecDeque<SampleChunk>,
    queued_samples: usize,
    /// Held-over value used to fill underrun gaps.
    last_sample: i16,
}

impl ChunkQueue {
    fn new() -> Self {
        Self {
            chunks: VecDeque::new(),
            queued_samples: 0,
            last_sample: 0,
        }
    }

    fn push(&mut self, chunk: SampleChunk) {
        self.queued_samples += chunk.remaining();
        self.chunks.push_back(chunk);
    }

    /// Drop head chunks until both bounds hold. Returns the number dropped.
    ///
    /// Each iteration removes one whole chunk, so the loop terminates after
    /// at most `chunks.len()` steps and the head only ever gets fresher.
    fn evict(&mut self, config: &JitterConfig, now_ms: u64) -> u64 {
        let max_age_ms = config.max_age_ms();
        let mut dropped = 0;
        while let Some(head) = self.chunks.front() {
            let over_size = self.queued_samples > config.max_queue_samples;
            let over_age = head.age_ms(now_ms, config.sample_rate) > max_age_ms;
            if !over_size && !over_age {
                break;
            }
            if let Some(dead) = self.chunks.pop_front() {
                self.queued_samples -= dead.remaining();
                dropped += 1;
            }
        }
        dropped
    }

    /// Read one sample from the head chunk, popping it once exhausted.
    /// Returns `None` on an empty queue (an underrun).
    fn next_sample(&mut self) -> Option<i16> {
        loop {
            let head = self.chunks.front_mut()?;
            match head.next() {
                Some(sample) => {
                    self.queued_samples -= 1;
                    if head.is_exhausted() {
                        self.chunks.pop_front();
                    }
                    self.last_sample = sample;
                    return Some(sample);
                }
                // An exhausted chunk at the head; discard and retry.
                None => {
                    self.chunks.pop_front();
                }
            }
        }
    }
}

/// Bounded FIFO between the emulation loop and the audio callback.
///
/// Implements [`ChunkSink`] for the producer side and [`BlockSource`] for
/// the renderer side. Both sides take the queue lock only for work bounded
/// by the chunk or block size, and the counters are atomics, so a thread
/// polling [`stats`](Self::stats) never delays the audio callback.
pub struct JitterBuffer {
    config: JitterConfig,
    clock: SessionClock,
    queue: Mutex<ChunkQueue>,
    stats: JitterStats,
}

impl JitterBuffer {
    pub fn new(config: JitterConfig) -> Self {
        Self {
            config,
            clock: SessionClock::new(),
            queue: Mutex::new(ChunkQueue::new()),
            stats: JitterStats::new(),
        }
    }

    pub fn config(&self) -> &JitterConfig {
        &self.config
    }

    /// The clock producers should stamp their submissions with.
    pub fn clock(&self) -> SessionClock {
        self.clock
    }

    /// Copy of the current counters. Lock-free, no side effects.
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            dropped_chunks: self.stats.dropped_chunks(),
            underruns: self.stats.underruns(),
            queued_samples: self.stats.queued_samples(),
        }
    }

    /// Discard all buffered audio and zero the counters.
    ///
    /// Used on explicit session restart only; the buffer is never resized or
    /// recreated mid-session.
    pub fn reset(&self) {
        let mut queue = self.queue.lock().unwrap();
        queue.chunks.clear();
        queue.queued_samples = 0;
        queue.last_sample = 0;
        self.stats.reset();
    }

    fn submit_at(&self, arrival_ms: u64, samples: Vec<i16>, now_ms: u64) {
        if samples.is_empty() {
            debug!("JitterBuffer: ignoring empty chunk");
            return;
        }
        let mut queue = self.queue.lock().unwrap();
        queue.push(SampleChunk::new(arrival_ms, samples));
        let dropped = queue.evict(&self.config, now_ms);
        let queued = queue.queued_samples;
        drop(queue);

        if dropped > 0 {
            self.stats.record_dropped(dropped);
            debug!(
                "JitterBuffer: evicted {} chunk(s) on submit, {} samples queued",
                dropped, queued
            );
        }
        self.stats.record_queued(queued);
    }

    fn fill_block_at(&self, out: &mut [f32], now_ms: u64) {
        let mut queue = self.queue.lock().unwrap();
        let dropped = queue.evict(&self.config, now_ms);

        let mut underruns = 0u64;
        for slot in out.iter_mut() {
            let sample = match queue.next_sample() {
                Some(sample) => sample,
                None => {
                    underruns += 1;
                    queue.last_sample
                }
            };
            *slot = sample as f32 / I16_FULL_SCALE;
        }
        let queued = queue.queued_samples;
        drop(queue);

        if dropped > 0 {
            self.stats.record_dropped(dropped);
        }
        if underruns > 0 {
            self.stats.record_underruns(underruns);
        }
        self.stats.record_queued(queued);
    }
}

impl ChunkSink for JitterBuffer {
    fn submit(&self, arrival_ms: u64, samples: Vec<i16>) {
        self.submit_at(arrival_ms, samples, self.clock.now_ms());
    }
}

impl BlockSource for JitterBuffer {
    fn fill_block(&self, out: &mut [f32]) {
        self.fill_block_at(out, self.clock.now_ms());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JitterConfig {
        JitterConfig {
            sample_rate: 48_000,
            target_latency_ms: 20,
            max_queue_samples: 4_800, // 100ms
        }
    }

    fn ramp(start: i16, len: usize) -> Vec<i16> {
        (0..len).map(|i| start + i as i16).collect()
    }

    /// Sum of unread samples obtained the slow way, for checking the
    /// incremental accounting.
    fn rescan(buffer: &JitterBuffer) -> usize {
        let queue = buffer.queue.lock().unwrap();
        queue.chunks.iter().map(|c| c.remaining()).sum()
    }

    #[test]
    fn test_submit_and_drain_single_chunk() {
        let buffer = JitterBuffer::new(test_config());
        buffer.submit_at(0, vec![16_384; 4], 0);

        let mut out = [0.0f32; 4];
        buffer.fill_block_at(&mut out, 0);

        assert_eq!(out, [0.5; 4]);
        let stats = buffer.stats();
        assert_eq!(stats.queued_samples, 0);
        assert_eq!(stats.underruns, 0);
        assert_eq!(stats.dropped_chunks, 0);
    }

    #[test]
    fn test_queued_samples_matches_rescan() {
        let buffer = JitterBuffer::new(test_config());

        buffer.submit_at(0, ramp(0, 300), 0);
        assert_eq!(buffer.stats().queued_samples, rescan(&buffer));

        buffer.submit_at(5, ramp(1000, 700), 5);
        assert_eq!(buffer.stats().queued_samples, 1000);
        assert_eq!(buffer.stats().queued_samples, rescan(&buffer));

        // A partial read leaves the head chunk half-consumed; the count
        // tracks unread samples, not chunk lengths.
        let mut out = vec![0.0f32; 450];
        buffer.fill_block_at(&mut out, 5);
        assert_eq!(buffer.stats().queued_samples, 550);
        assert_eq!(buffer.stats().queued_samples, rescan(&buffer));
    }

    #[test]
    fn test_size_bound_evicts_oldest_whole_chunks() {
        let buffer = JitterBuffer::new(test_config());

        buffer.submit_at(0, ramp(0, 2000), 0);
        buffer.submit_at(0, ramp(2000, 2000), 0);
        assert_eq!(buffer.stats().dropped_chunks, 0);

        buffer.submit_at(0, ramp(4000, 2000), 0);

        let stats = buffer.stats();
        assert_eq!(stats.dropped_chunks, 1);
        assert_eq!(stats.queued_samples, 4000);
        assert!(stats.queued_samples <= test_config().max_queue_samples);

        // The first chunk is gone; output starts at the second.
        let mut out = [0.0f32; 1];
        buffer.fill_block_at(&mut out, 0);
        assert_eq!(out[0], 2000.0 / I16_FULL_SCALE);
    }

    #[test]
    fn test_age_bound_evicts_stale_head() {
        let buffer = JitterBuffer::new(test_config());

        buffer.submit_at(0, ramp(0, 100), 0);
        buffer.submit_at(35, ramp(100, 100), 35);
        assert_eq!(buffer.stats().dropped_chunks, 0);

        // At t=41 the head is 41ms old, past 2 * target_latency_ms = 40.
        let mut out = [0.0f32; 1];
        buffer.fill_block_at(&mut out, 41);

        assert_eq!(buffer.stats().dropped_chunks, 1);
        assert_eq!(out[0], 100.0 / I16_FULL_SCALE);
    }

    #[test]
    fn test_age_bound_accounts_for_consumed_samples() {
        let buffer = JitterBuffer::new(test_config());

        // 960 samples = 20ms at 48kHz, submitted at t=0.
        buffer.submit_at(0, ramp(0, 960), 0);

        // Consume half: the next unread sample is effectively 10ms younger
        // than the arrival stamp.
        let mut out = vec![0.0f32; 480];
        buffer.fill_block_at(&mut out, 10);

        // At t=45 raw arrival age is 45ms, but the unread tail is 35ms old,
        // still within the 40ms bound.
        let mut out = [0.0f32; 1];
        buffer.fill_block_at(&mut out, 45);
        assert_eq!(buffer.stats().dropped_chunks, 0);
        assert_eq!(out[0], 480.0 / I16_FULL_SCALE);

        // At t=51 the tail crosses the bound and the whole remainder goes.
        buffer.fill_block_at(&mut out, 51);
        assert_eq!(buffer.stats().dropped_chunks, 1);
        assert_eq!(buffer.stats().underruns, 1);
    }

    #[test]
    fn test_underrun_repeats_last_sample() {
        let buffer = JitterBuffer::new(test_config());
        buffer.submit_at(0, vec![7, 9, 11], 0);

        let mut out = [0.0f32; 3];
        buffer.fill_block_at(&mut out, 0);
        assert_eq!(buffer.stats().underruns, 0);

        // Queue is now empty. Every pull repeats the last emitted sample
        // and counts exactly one underrun.
        let mut out = [0.0f32; 5];
        buffer.fill_block_at(&mut out, 0);
        assert_eq!(out, [11.0 / I16_FULL_SCALE; 5]);
        assert_eq!(buffer.stats().underruns, 5);
    }

    #[test]
    fn test_underrun_before_first_chunk_is_silence() {
        let buffer = JitterBuffer::new(test_config());

        let mut out = [1.0f32; 4];
        buffer.fill_block_at(&mut out, 0);

        assert_eq!(out, [0.0; 4]);
        assert_eq!(buffer.stats().underruns, 4);
    }

    #[test]
    fn test_chunks_drain_in_submission_order() {
        let buffer = JitterBuffer::new(test_config());
        buffer.submit_at(0, vec![1, 2], 0);
        buffer.submit_at(1, vec![3, 4, 5], 1);
        buffer.submit_at(2, vec![6], 2);

        let mut out = [0.0f32; 6];
        buffer.fill_block_at(&mut out, 2);

        let expected: Vec<f32> = (1..=6).map(|s| s as f32 / I16_FULL_SCALE).collect();
        assert_eq!(out.to_vec(), expected);
    }

    #[test]
    fn test_fill_spans_chunk_boundary() {
        let buffer = JitterBuffer::new(test_config());
        buffer.submit_at(0, ramp(0, 100), 0);
        buffer.submit_at(1, ramp(100, 100), 1);

        // Pull 150 samples: all of the first chunk plus half the second.
        let mut out = vec![0.0f32; 150];
        buffer.fill_block_at(&mut out, 1);

        assert_eq!(out[99], 99.0 / I16_FULL_SCALE);
        assert_eq!(out[100], 100.0 / I16_FULL_SCALE);
        assert_eq!(buffer.stats().queued_samples, 50);
        assert_eq!(buffer.stats().underruns, 0);
    }

    #[test]
    fn test_burst_trims_oldest_then_drains_in_order() {
        // Three 2000-sample chunks arriving 10ms apart against a 4800-sample
        // ceiling: the burst costs the first chunk, then playback drains the
        // survivors in order and only underruns once they are gone.
        let buffer = JitterBuffer::new(test_config());
        buffer.submit_at(0, ramp(0, 2000), 0);
        buffer.submit_at(10, ramp(2000, 2000), 10);
        buffer.submit_at(20, ramp(4000, 2000), 20);

        let stats = buffer.stats();
        assert!(stats.queued_samples <= 4800);
        assert!(stats.dropped_chunks >= 1);
        assert_eq!(stats.queued_samples, 4000);

        let mut out = vec![0.0f32; 4800];
        buffer.fill_block_at(&mut out, 20);

        // Survivors play back in submission order with no gaps.
        for (i, slot) in out[..4000].iter().enumerate() {
            assert_eq!(*slot, (2000 + i) as f32 / I16_FULL_SCALE, "slot {}", i);
        }
        // Past the end the last sample holds.
        assert!(out[4000..].iter().all(|s| *s == 5999.0 / I16_FULL_SCALE));
        assert_eq!(buffer.stats().underruns, 800);
    }

    #[test]
    fn test_empty_chunk_is_ignored() {
        let buffer = JitterBuffer::new(test_config());
        buffer.submit_at(0, vec![], 0);

        assert_eq!(buffer.stats().queued_samples, 0);

        let mut out = [0.0f32; 1];
        buffer.fill_block_at(&mut out, 0);
        assert_eq!(buffer.stats().underruns, 1);
    }

    #[test]
    fn test_reset_clears_audio_and_counters() {
        let buffer = JitterBuffer::new(test_config());
        buffer.submit_at(0, vec![100; 6000], 0);

        let mut out = [0.0f32; 1];
        buffer.fill_block_at(&mut out, 0);
        let stats = buffer.stats();
        assert!(stats.dropped_chunks > 0 || stats.queued_samples > 0);

        buffer.reset();

        let stats = buffer.stats();
        assert_eq!(stats.dropped_chunks, 0);
        assert_eq!(stats.underruns, 0);
        assert_eq!(stats.queued_samples, 0);

        // The held-over sample is cleared too: post-reset underruns are
        // silence, not leftovers from the previous session.
        let mut out = [1.0f32; 2];
        buffer.fill_block_at(&mut out, 0);
        assert_eq!(out, [0.0; 2]);
    }

    #[test]
    fn test_eviction_terminates_on_all_stale_queue() {
        let buffer = JitterBuffer::new(test_config());
        for i in 0..20 {
            buffer.submit_at(i, vec![i as i16; 10], i);
        }

        // Far in the future every chunk is stale; one pass clears them all.
        let mut out = [0.0f32; 1];
        buffer.fill_block_at(&mut out, 10_000);

        assert_eq!(buffer.stats().dropped_chunks, 20);
        assert_eq!(buffer.stats().queued_samples, 0);
        assert_eq!(buffer.stats().underruns, 1);
    }
}
