//! Audio data types and buffering between the emulation clock and the
//! device clock.
//!
//! # Data Types
//! - [`chunk::SampleChunk`] - One producer submission: timestamped i16 samples
//!
//! # Buffering
//! - [`jitter_buffer::JitterBuffer`] - Bounded FIFO with size/age eviction and
//!   hold-last-value underrun fill
//! - [`rate_adapter::RateAdapter`] - Optional depth-corrected pull strategy
//!   (linear interpolation plus one-pole low-pass)
//!
//! # Signal sources
//! - [`beeper::Beeper`] - Square-wave frame generator used by the demo and as
//!   a known test signal

pub mod beeper;
pub mod chunk;
pub mod jitter_buffer;
pub mod rate_adapter;

pub use beeper::Beeper;
pub use chunk::SampleChunk;
pub use jitter_buffer::{JitterBuffer, JitterConfig, SessionClock, StatsSnapshot};
pub use rate_adapter::RateAdapter;
