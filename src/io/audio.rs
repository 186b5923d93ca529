//! Audio device output using cpal.
//!
//! Provides [`Playback`]: an output stream that pulls blocks from a
//! [`BlockSource`] inside the device's real-time callback. The callback does
//! no allocation in steady state and never waits on the producer side; an
//! empty source is the source's problem to smooth over, not the stream's.

use crate::pipeline::BlockSource;
use anyhow::{Context, Result, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, Stream, StreamConfig};
use dasp_sample::{FromSample, Sample as DaspSample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

fn find_device_by_name<I: Iterator<Item = Device>>(devices: I, name: &str) -> Option<Device> {
    devices
        .filter_map(|d| d.name().ok().map(|n| (d, n)))
        .find(|(_, n)| n == name)
        .map(|(d, _)| d)
}

fn get_output_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();
    match device_name {
        Some(name) => {
            let devices = host
                .output_devices()
                .context("Failed to enumerate output devices")?;
            find_device_by_name(devices, name).context("Output device not found")
        }
        None => host
            .default_output_device()
            .context("No default output device available"),
    }
}

/// Configuration for the output stream.
#[derive(Clone, Default, Debug)]
pub struct PlaybackConfig {
    pub sample_rate: u32,
    pub output_device_name: Option<String>,
}

impl PlaybackConfig {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            output_device_name: None,
        }
    }
}

/// Result of a [`Playback::try_resume`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// The stream was already playing; nothing happened.
    AlreadyRunning,
    /// The stream transitioned from suspended to playing.
    Resumed,
}

/// Resume `play` only if the stream is not already running.
///
/// Idempotent by construction: a second call observes the running flag and
/// skips the platform call entirely. On failure the flag stays down so a
/// later gesture can retry.
fn resume_gate(running: &AtomicBool, play: impl FnOnce() -> Result<()>) -> Result<ResumeOutcome> {
    if running.load(Ordering::Acquire) {
        return Ok(ResumeOutcome::AlreadyRunning);
    }
    play()?;
    running.store(true, Ordering::Release);
    Ok(ResumeOutcome::Resumed)
}

/// Plays audio to an output device, pulling from a [`BlockSource`].
///
/// Dropping the handle tears the stream down; keep it alive for the session.
pub struct Playback {
    stream: Stream,
    running: AtomicBool,
}

impl Playback {
    /// Open the output device and start playing from `source`.
    ///
    /// Failure here (no device, unsupported format) is a one-time setup
    /// error, reported once to the caller. Once the stream is running there
    /// are no fatal errors: degraded output shows up in the source's own
    /// counters instead.
    pub fn start(source: Arc<dyn BlockSource>, config: &PlaybackConfig) -> Result<Self> {
        let device = get_output_device(config.output_device_name.as_deref())?;
        info!(
            "Using output device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let output_config = device
            .default_output_config()
            .context("Failed to get default output config")?;
        debug!("Output config: {output_config:#?}");

        let stream_config = StreamConfig {
            channels: output_config.channels().clamp(1, 2),
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let stream = match output_config.sample_format() {
            SampleFormat::F32 => Self::build_output_stream::<f32>(&device, &stream_config, source)?,
            SampleFormat::I16 => Self::build_output_stream::<i16>(&device, &stream_config, source)?,
            SampleFormat::U16 => Self::build_output_stream::<u16>(&device, &stream_config, source)?,
            format => bail!("Unsupported sample format: {format:?}"),
        };
        stream.play().context("Failed to start output stream")?;
        info!("Audio output started at {}Hz", config.sample_rate);

        Ok(Self {
            stream,
            running: AtomicBool::new(true),
        })
    }

    fn build_output_stream<T>(
        device: &Device,
        config: &StreamConfig,
        source: Arc<dyn BlockSource>,
    ) -> Result<Stream>
    where
        T: cpal::SizedSample,
        T: FromSample<f32>,
    {
        let channels = config.channels as usize;
        // Mono scratch block, fanned out to every device channel. Grown only
        // if the device ever asks for a bigger block.
        let mut scratch: Vec<f32> = vec![0.0; 4096];

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    if scratch.len() < frames {
                        warn!("Output block grew to {} frames", frames);
                        scratch.resize(frames, 0.0);
                    }
                    source.fill_block(&mut scratch[..frames]);

                    for (frame, sample) in data.chunks_mut(channels).zip(&scratch) {
                        let converted = T::from_sample(*sample);
                        for slot in frame {
                            *slot = converted;
                        }
                    }
                },
                |err| error!("An error occurred on the output audio stream: {}", err),
                None,
            )
            .context("Failed to build output stream")?;

        Ok(stream)
    }

    /// Whether the stream is currently playing.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Pause the stream. The source keeps accepting submissions; its own
    /// eviction policy discards what goes stale in the meantime.
    pub fn stop(&self) -> Result<()> {
        self.stream
            .pause()
            .context("Failed to pause output stream")?;
        self.running.store(false, Ordering::Release);
        info!("Audio output stopped");
        Ok(())
    }

    /// Resume a suspended stream. Idempotent: calling while already playing
    /// is a no-op, so hosts can invoke it from any user gesture without
    /// checking state first.
    ///
    /// The stream never resumes itself; only report-and-wait. The host
    /// decides when a resume attempt is appropriate for its platform.
    pub fn try_resume(&self) -> Result<ResumeOutcome> {
        let outcome = resume_gate(&self.running, || {
            self.stream
                .play()
                .context("Failed to resume output stream")
        })?;
        if outcome == ResumeOutcome::Resumed {
            info!("Audio output resumed");
        }
        Ok(outcome)
    }
}
