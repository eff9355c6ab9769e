mod console;
mod link;
mod source;
mod tty;

use anyhow::{Context, Result};
use clap::Parser;
use gridcast::core_modules::binarizer::binarize;
use gridcast::{Frame, GridPipeline, PipelineConfig};
use image::RgbaImage;
use link::Link;
use source::FrameSource;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Streams a camera-driven on/off cell grid to a microcontroller.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML pipeline configuration. Built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial device node, e.g. /dev/ttyACM0.
    #[arg(long, required_unless_present = "dry_run")]
    device: Option<PathBuf>,

    /// Camera index passed to OpenCV.
    #[arg(long, default_value_t = 0)]
    camera: i32,

    /// Use a still image instead of the camera.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Print decoded grids instead of writing to a device.
    #[arg(long)]
    dry_run: bool,

    /// Stop after this many frames.
    #[arg(long)]
    frames: Option<u64>,

    /// Override the configured baud rate.
    #[arg(long)]
    baud: Option<u32>,

    /// Save the thresholded version of the last frame as an image.
    #[arg(long)]
    preview: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    let (pipeline, handle) = GridPipeline::new(config).context("invalid pipeline configuration")?;

    let link = match (&args.device, args.dry_run) {
        (_, true) => Link::dry_run(),
        (Some(device), false) => Link::serial(device.clone()),
        (None, false) => anyhow::bail!("--device is required unless --dry-run is set"),
    };

    std::thread::Builder::new()
        .name("console".into())
        .spawn(move || console::run(handle))
        .context("starting the tuning console")?;

    let stop = Arc::new(AtomicBool::new(false));
    let ctrl_c_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            ctrl_c_stop.store(true, Ordering::Relaxed);
        }
    });

    tokio::task::spawn_blocking(move || stream(pipeline, link, &args, &stop))
        .await
        .context("frame loop panicked")?
}

/// The frame loop: one pipeline tick per captured frame until the source
/// ends, the frame limit is reached or the user interrupts.
fn stream(
    mut pipeline: GridPipeline,
    mut link: Link,
    args: &Args,
    stop: &AtomicBool,
) -> Result<()> {
    let mut source = match &args.image {
        Some(path) => FrameSource::still(path)?,
        None => FrameSource::camera(args.camera)?,
    };
    pipeline.connect(&mut link).context("opening the serial link")?;

    let started = Instant::now();
    let mut sent = 0u64;
    let mut last_image: Option<RgbaImage> = None;

    while !stop.load(Ordering::Relaxed)
        && args
            .frames
            .is_none_or(|limit| pipeline.frames_processed() < limit)
    {
        let Some(image) = source.next_frame()? else {
            info!("video source ended");
            break;
        };
        let report = pipeline.tick(&Frame::from(&image), &mut link, Instant::now());
        if report.outcome.is_sent() {
            sent += 1;
        }
        for payload in link.take_dry_run_payloads() {
            print_payload(&pipeline, &payload);
        }
        last_image = Some(image);
    }

    pipeline.teardown(&mut link);
    info!(
        frames = pipeline.frames_processed(),
        sent,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "stream finished"
    );

    if let (Some(path), Some(image)) = (&args.preview, last_image) {
        let threshold = pipeline.tuning().binarize_threshold;
        binarize(&Frame::from(&image), threshold)
            .into_image()
            .save(path)
            .with_context(|| format!("saving preview to {}", path.display()))?;
        info!(path = %path.display(), "thresholded preview saved");
    }
    Ok(())
}

/// Decodes a dry-run payload the way the device would and draws it.
fn print_payload(pipeline: &GridPipeline, payload: &[u8]) {
    let grid = &pipeline.config().grid;
    match pipeline.encoding().decode(payload, grid.rows, grid.cols) {
        Ok(decoded) => {
            println!("-- {} bytes, {} active", payload.len(), decoded.active_count());
            print!("{}", decoded.render_ascii('#', '.'));
        }
        Err(err) => warn!(%err, "payload does not decode"),
    }
}
