use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing::{error, info};

use chipstream::audio::{Beeper, JitterBuffer, JitterConfig, RateAdapter};
use chipstream::io::{Playback, PlaybackConfig};
use chipstream::pipeline::{BlockSource, ChunkSink};

const SAMPLE_RATE: u32 = 48_000;
/// Emulated display frames per second; one audio chunk is produced per frame.
const FRAME_RATE: u32 = 50;
const TONE_HZ: f32 = 440.0;
/// Frames submitted before the stream opens, so the queue starts at depth.
const PREROLL_FRAMES: u32 = 2;
const STATS_INTERVAL: Duration = Duration::from_secs(30);

fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    if let Err(e) = run() {
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let adaptive = std::env::args().any(|arg| arg == "--adaptive");

    let buffer = Arc::new(JitterBuffer::new(JitterConfig::new(SAMPLE_RATE)));
    let clock = buffer.clock();

    let mut chip = Beeper::new(SAMPLE_RATE, FRAME_RATE, TONE_HZ);
    for _ in 0..PREROLL_FRAMES {
        buffer.submit(clock.now_ms(), chip.frame());
    }

    // Exactly one pull strategy per session: fixed-ratio by default, the
    // depth-corrected resampler behind --adaptive.
    let source: Arc<dyn BlockSource> = if adaptive {
        info!("Rate-adaptive consumption enabled");
        Arc::new(RateAdapter::new(buffer.clone()))
    } else {
        buffer.clone()
    };
    let _playback = Playback::start(source, &PlaybackConfig::new(SAMPLE_RATE))?;

    // Producer thread: one chunk per emulated frame, with the cadence
    // wobbled a little to imitate host scheduling jitter. The buffer's
    // eviction and underrun policies absorb the irregularity.
    let sink = buffer.clone();
    thread::spawn(move || {
        let frame_us = 1_000_000 / FRAME_RATE as i64;
        let mut rng = rand::thread_rng();
        loop {
            let wobble_us: i64 = rng.gen_range(-2_000..=2_000);
            thread::sleep(Duration::from_micros((frame_us + wobble_us) as u64));
            sink.submit(clock.now_ms(), chip.frame());
        }
    });

    info!("Playing a {}Hz tone; Ctrl-C to quit", TONE_HZ);
    loop {
        thread::sleep(STATS_INTERVAL);
        let stats = buffer.stats();
        info!(
            "Dropped {} Underruns {} Queued {}",
            stats.dropped_chunks, stats.underruns, stats.queued_samples
        );
    }
}
