// Dump what an animated GIF filter draws on consecutive output frames

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use clip_composer::{overlay::TextureOverlay, types::Size, GifOverlay};

#[derive(Parser)]
#[command(
    name = "overlay-preview",
    version,
    about = "Write the bitmaps a GIF filter returns per query as PNGs"
)]
struct Args {
    /// Animated GIF to preview
    gif: PathBuf,

    /// Number of queries to make
    #[arg(short = 'n', long, default_value_t = 12)]
    count: usize,

    /// Directory the PNGs are written to
    #[arg(short, long, default_value = "overlay_preview")]
    output: PathBuf,

    /// Render width the overlay reports
    #[arg(long, default_value_t = 1080)]
    width: u32,

    /// Render height the overlay reports
    #[arg(long, default_value_t = 1920)]
    height: u32,

    /// Frame rate used to derive the presentation timestamps
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    println!("🎞️  Previewing {:?}", args.gif);

    let mut overlay = GifOverlay::open(&args.gif, Size::new(args.width, args.height))
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("   Frames: {}", overlay.frame_count());
    println!("   Loop duration: {}ms", overlay.source().loop_duration().as_millis());

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("cannot create {:?}", args.output))?;

    for n in 0..args.count {
        let presentation_time_us = (n as f64 * 1_000_000.0 / args.fps) as i64;
        let bitmap = overlay.bitmap(presentation_time_us);
        let (width, height) = bitmap.dimensions();

        let path = args.output.join(format!("query_{:04}.png", n));
        bitmap
            .save(&path)
            .with_context(|| format!("cannot write {:?}", path))?;

        info!(
            "Query {} at {}us -> {}x{}{} (shown {})",
            n,
            presentation_time_us,
            width,
            height,
            if (width, height) == (1, 1) { " fallback" } else { "" },
            overlay.shown_count()
        );
    }

    println!("   📁 {} bitmaps written to {:?}", args.count, args.output);
    Ok(())
}
