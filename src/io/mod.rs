//! Hardware I/O.
//!
//! Concrete [`BlockSource`](crate::pipeline::BlockSource) consumers that
//! interface with the outside world:
//!
//! - [`Playback`] - Speaker output via cpal, pulling blocks from a source

pub mod audio;

pub use audio::{Playback, PlaybackConfig, ResumeOutcome};
