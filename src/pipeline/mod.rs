//! Object-safe traits connecting the emulation side to the audio side.
//!
//! These traits let the two halves of the stream be wired together without
//! either knowing the other's concrete type:
//!
//! - [`ChunkSink`] - Can receive timestamped sample chunks
//! - [`BlockSource`] - Can fill fixed-size output blocks when pulled
//!
//! The emulation loop holds an `Arc<dyn ChunkSink>` and pushes one chunk per
//! emulated frame; the audio callback holds an `Arc<dyn BlockSource>` and
//! pulls one block per callback. [`JitterBuffer`](crate::audio::JitterBuffer)
//! implements both and sits in the middle.

use std::sync::Arc;

/// Passive receiver - accepts sample chunks pushed by a producer.
///
/// `submit` must never block and never fail. A producer running ahead of the
/// consumer is handled by the receiver's own overflow policy, not by
/// rejecting data.
pub trait ChunkSink: Send + Sync {
    /// Hand over one chunk of samples stamped with its submission time
    /// (milliseconds on the session clock).
    fn submit(&self, arrival_ms: u64, samples: Vec<i16>);
}

/// Passive producer - fills an output block when pulled.
///
/// `fill_block` runs on the real-time audio thread. Implementations must
/// fully populate `out`, complete in time bounded by `out.len()`, and never
/// block on I/O or wait for a producer.
pub trait BlockSource: Send + Sync {
    fn fill_block(&self, out: &mut [f32]);
}

impl ChunkSink for Arc<dyn ChunkSink> {
    fn submit(&self, arrival_ms: u64, samples: Vec<i16>) {
        (**self).submit(arrival_ms, samples)
    }
}

impl BlockSource for Arc<dyn BlockSource> {
    fn fill_block(&self, out: &mut [f32]) {
        (**self).fill_block(out)
    }
}
