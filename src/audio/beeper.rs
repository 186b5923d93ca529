//! A square-wave beeper, stepped one emulated frame at a time.
//!
//! Stands in for the emulation engine in the demo and in tests: every call
//! to [`Beeper::frame`] renders the samples for one display frame, the same
//! granularity a real emulator core hands its audio to the stream at.

/// Output level of the beeper when driven, matching the classic
/// single-bit speaker loudness relative to 16-bit full scale.
const BEEPER_VOLUME: i16 = 50 * 256;

pub struct Beeper {
    samples_per_frame: usize,
    /// Phase advance per sample, in cycles.
    phase_inc: f32,
    /// Current position within the square wave, in cycles, [0, 1).
    phase: f32,
}

impl Beeper {
    pub fn new(sample_rate: u32, frame_rate: u32, tone_hz: f32) -> Self {
        Self {
            samples_per_frame: (sample_rate / frame_rate) as usize,
            phase_inc: tone_hz / sample_rate as f32,
            phase: 0.0,
        }
    }

    /// Render the next frame's worth of samples.
    ///
    /// Phase carries over between frames, so consecutive frames join into a
    /// continuous tone.
    pub fn frame(&mut self) -> Vec<i16> {
        let mut samples = Vec::with_capacity(self.samples_per_frame);
        for _ in 0..self.samples_per_frame {
            let level = if self.phase < 0.5 {
                BEEPER_VOLUME
            } else {
                -BEEPER_VOLUME
            };
            samples.push(level);
            self.phase = (self.phase + self.phase_inc) % 1.0;
        }
        samples
    }
}
