//! Rate-adaptive consumption for the jitter buffer.
//!
//! An alternative pull strategy that trades a tiny, continuous pitch
//! deviation for steadier buffer depth. Instead of letting the queue drift
//! until the eviction or underrun policies kick in, the adapter measures how
//! far the buffered depth sits from the target latency and consumes input
//! slightly faster or slower than one sample per output sample, never more
//! than 1% off nominal.
//!
//! The fractional read cursor is resolved with linear interpolation between
//! adjacent input samples, and the interpolated signal is smoothed by a
//! single-pole low-pass filter with cutoff at half the output rate
//! (`RC = 1 / (2 * PI * f_c)`).
//!
//! Exactly one pull strategy feeds the output stream per session: either the
//! buffer directly (the default) or this wrapper. Both implement
//! [`BlockSource`], so the choice is a wiring decision.

use crate::audio::jitter_buffer::JitterBuffer;
use crate::pipeline::BlockSource;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

/// Largest allowed deviation from nominal consumption rate.
const MAX_RATE_ADJUST: f64 = 0.01;

/// Scratch capacity preallocated so typical device block sizes never
/// allocate inside the callback.
const INITIAL_SCRATCH: usize = 4096;

struct AdapterState {
    /// Fractional position between `prev` and `next`, in [0, 1).
    frac: f64,
    prev: f32,
    next: f32,
    /// Low-pass filter state.
    filtered: f32,
    scratch: Vec<f32>,
}

/// Wraps a [`JitterBuffer`] behind the same pull interface, consuming at a
/// depth-corrected rate.
pub struct RateAdapter {
    inner: Arc<JitterBuffer>,
    /// Filter coefficient `dt / (RC + dt)` for the one-pole low-pass.
    alpha: f32,
    state: Mutex<AdapterState>,
}

impl RateAdapter {
    pub fn new(inner: Arc<JitterBuffer>) -> Self {
        let sample_rate = inner.config().sample_rate as f64;
        let cutoff_hz = sample_rate / 2.0;
        let rc = 1.0 / (2.0 * PI * cutoff_hz);
        let dt = 1.0 / sample_rate;
        let alpha = (dt / (rc + dt)) as f32;

        Self {
            inner,
            alpha,
            state: Mutex::new(AdapterState {
                frac: 0.0,
                prev: 0.0,
                next: 0.0,
                filtered: 0.0,
                scratch: vec![0.0; INITIAL_SCRATCH],
            }),
        }
    }

    /// Input samples to consume per output sample for the current depth.
    ///
    /// Proportional control: a full target-latency of excess depth maps to
    /// the +1% ceiling, a fully drained queue to the -1% floor.
    fn current_ratio(&self) -> f64 {
        let config = self.inner.config();
        let queued = self.inner.stats().queued_samples;
        let buffered_ms = queued as f64 * 1000.0 / config.sample_rate as f64;
        let target_ms = config.target_latency_ms as f64;
        let deviation = (buffered_ms - target_ms) / target_ms;
        1.0 + (deviation * MAX_RATE_ADJUST).clamp(-MAX_RATE_ADJUST, MAX_RATE_ADJUST)
    }
}

impl BlockSource for RateAdapter {
    fn fill_block(&self, out: &mut [f32]) {
        let ratio = self.current_ratio();
        let mut state = self.state.lock().unwrap();
        let AdapterState {
            frac,
            prev,
            next,
            filtered,
            scratch,
        } = &mut *state;

        // The cursor crosses exactly floor(frac + ratio * len) input samples
        // over this block; pull them from the buffer in one go.
        let needed = (*frac + ratio * out.len() as f64) as usize;
        if scratch.len() < needed {
            scratch.resize(needed, 0.0);
        }
        self.inner.fill_block(&mut scratch[..needed]);

        let mut idx = 0;
        for slot in out.iter_mut() {
            *frac += ratio;
            while *frac >= 1.0 {
                *frac -= 1.0;
                *prev = *next;
                // Rounding in the accumulated cursor can disagree with
                // `needed` by one; hold the last sample rather than overrun.
                if idx < needed {
                    *next = scratch[idx];
                    idx += 1;
                }
            }
            let interp = *prev + (*next - *prev) * *frac as f32;
            *filtered += (interp - *filtered) * self.alpha;
            *slot = *filtered;
        }
    }
}
