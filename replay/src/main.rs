//! vdq replay helper
//!
//! Feeds a synthetic decode-order stream through a `DecoderSession` backed by
//! the loopback platform and checks that frames come out in presentation
//! order.

mod gop;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use vdq_common::{DecoderConfig, FourCc, PixelFormat, Pts};
use vdq_decoder::{
    release_frame, DecoderSession, LoopbackConfig, LoopbackDecoder, ParkingLotLockManager,
};

/// Replay a reordered stream through the decode queue
#[derive(Parser, Debug)]
#[command(name = "vdq-replay")]
#[command(about = "Replay a synthetic decode-order stream through a decoder session")]
#[command(version)]
struct Args {
    /// Number of frames to submit
    #[arg(long, default_value = "48", value_parser = clap::value_parser!(u64).range(1..=MAX_FRAMES))]
    frames: u64,

    /// B-frames between anchor frames
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u64).range(0..=MAX_B_FRAMES))]
    b_frames: u64,

    /// Frames kept queued before popping (the decoder's reorder depth)
    #[arg(long, default_value = "4")]
    reorder_window: usize,

    /// Frame duration in pts ticks (90 kHz clock at 30 fps by default)
    #[arg(long, default_value = "3000")]
    frame_duration: Pts,

    /// Number of platform callback threads
    #[arg(long, default_value = "1")]
    threads: usize,

    /// Simulated decode latency per frame, in microseconds
    #[arg(long, default_value = "500")]
    latency_us: u64,

    /// Serialize callbacks through the registered platform lock
    #[arg(long)]
    serialize: bool,

    /// Decoder configuration (JSON); defaults to 1920x1080 2vuy
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output pixel format as a four-character code (2vuy, yuvs, 420v, BGRA),
    /// overriding the config file
    #[arg(long, value_parser = parse_pixel_format)]
    pixel_format: Option<PixelFormat>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

const MAX_FRAMES: u64 = 1_000_000;
const MAX_B_FRAMES: u64 = 16;

fn parse_pixel_format(value: &str) -> Result<PixelFormat, String> {
    let code = FourCc::try_from(value.to_string())?;
    PixelFormat::from_fourcc(code).ok_or_else(|| format!("unsupported pixel format {code}"))
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<DecoderConfig> {
    let Some(path) = path else {
        return Ok(DecoderConfig::new(1920, 1080, PixelFormat::Uyvy422, Vec::new()));
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let mut config = load_config(args.config.as_ref())?;
    if let Some(format) = args.pixel_format {
        config.pixel_format = format;
    }
    let platform = LoopbackDecoder::new(LoopbackConfig {
        callback_threads: args.threads,
        output_format: config.pixel_format,
        latency: Duration::from_micros(args.latency_us),
        serialize_callbacks: args.serialize,
    });

    let mut session = DecoderSession::new(platform, Arc::new(ParkingLotLockManager::new()), config);
    session.create()?;

    let units = gop::synthesize(args.frames, args.b_frames, args.frame_duration);
    let mut presented: Vec<Pts> = Vec::with_capacity(units.len());
    let started = Instant::now();

    for unit in &units {
        session
            .submit(&unit.data, unit.pts)
            .with_context(|| format!("Submit failed for frame {}", unit.display_index))?;

        while session.pending_frames() > args.reorder_window {
            let Some(frame) = session.pop() else { break };
            debug!(
                pts = frame.pts(),
                bytes = frame.image().data().len(),
                frame_bytes = frame.image().frame_size(),
                "Presenting frame"
            );
            presented.push(frame.pts());
            release_frame(frame);
        }
    }

    // End of stream: wait for the decoder to hand back everything, then drain.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let stats = session.stats();
        if stats.frames_queued + stats.frames_dropped >= stats.frames_submitted {
            break;
        }
        if Instant::now() > deadline {
            warn!(?stats, "Timed out waiting for outstanding frames");
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    while let Some(frame) = session.pop() {
        presented.push(frame.pts());
        release_frame(frame);
    }

    let stats = session.stats();
    session.destroy()?;

    let out_of_order = presented.windows(2).filter(|w| w[0] > w[1]).count();
    info!(
        submitted = stats.frames_submitted,
        presented = presented.len(),
        dropped = stats.frames_dropped,
        out_of_order,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Replay finished"
    );

    if out_of_order > 0 {
        bail!(
            "{out_of_order} frames presented out of order; reorder window {} is too small",
            args.reorder_window
        );
    }

    Ok(())
}
