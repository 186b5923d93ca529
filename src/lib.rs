//! chipstream
//!
//! Streams audio produced by a periodically-stepped emulation into a
//! real-time output device, smoothing irregular producer timing through a
//! bounded jitter buffer with explicit drop and underrun policies.

pub mod audio;
pub mod io;
pub mod pipeline;
