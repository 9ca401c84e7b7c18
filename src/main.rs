use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};

use clip_composer::{
    config::Config, EditingSession, EditorError, ExportHandle, ExportOutcome, FfmpegTransformer,
};

#[derive(Parser)]
#[command(
    name = "clip-composer",
    version,
    about = "Assemble vertical videos from clips, stills, soundtracks and GIF filters",
    long_about = "Clip-Composer builds portrait video exports from picked media. \
                  Rendering is delegated to ffmpeg."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory the export is written to (defaults to the system temp dir)
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// ffmpeg binary to render with
    #[arg(long, global = true)]
    ffmpeg: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Two videos split top and bottom with a sticker on top
    Layout {
        /// Video shown (looping) in the top half
        #[arg(long)]
        video1: PathBuf,

        /// Video shown (looping) in the bottom half
        #[arg(long)]
        video2: PathBuf,

        /// Sticker image
        #[arg(long)]
        image: PathBuf,
    },

    /// Two video segments then a still image, over an audio track
    Timeline {
        #[arg(long)]
        video1: PathBuf,

        #[arg(long)]
        video2: PathBuf,

        #[arg(long)]
        image: PathBuf,

        /// Soundtrack (MP3, AAC, WAV...)
        #[arg(long)]
        audio: PathBuf,
    },

    /// A still image with an animated GIF filter on top
    AnimatedFilter {
        #[arg(long)]
        image: PathBuf,

        /// Animated GIF drawn over the whole frame
        #[arg(long)]
        gif: PathBuf,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Destination of the TOML file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    info!("Starting Clip-Composer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path).map_err(user_error)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    if let Some(dir) = cli.output_dir {
        config.output.directory = Some(dir);
    }
    if let Some(binary) = cli.ffmpeg {
        config.ffmpeg.binary = binary;
    }

    let transformer = Arc::new(FfmpegTransformer::new(config.ffmpeg.clone()));
    let session = EditingSession::new(transformer, config);

    let handle = match cli.command {
        Command::Layout {
            video1,
            video2,
            image,
        } => session.process_layout(&video1, &video2, &image).await,
        Command::Timeline {
            video1,
            video2,
            image,
            audio,
        } => {
            session
                .process_timeline(&video1, &video2, &image, &audio)
                .await
        }
        Command::AnimatedFilter { image, gif } => {
            session.process_animated_filter(&image, &gif).await
        }
        Command::InitConfig { path } => {
            session.config().save_to_file(&path).map_err(user_error)?;
            info!("Default configuration written to {:?}", path);
            return Ok(());
        }
    }
    .map_err(user_error)?;

    run_to_completion(&session, handle).await
}

/// Wait for the export, turning Ctrl-C into a cancellation
async fn run_to_completion(session: &EditingSession, handle: ExportHandle) -> Result<()> {
    let output_path = handle.output_path().to_path_buf();
    let wait = handle.wait();
    tokio::pin!(wait);

    let outcome = tokio::select! {
        outcome = &mut wait => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling export");
            session.cancel();
            wait.await
        }
    };

    match outcome {
        ExportOutcome::Completed(result) => {
            info!(
                "✅ Export complete: {:.1}MB, {}",
                result.file_size_bytes as f64 / 1024.0 / 1024.0,
                result.video_mime_type.as_str()
            );
            println!("{}", result.output_path.display());
            Ok(())
        }
        ExportOutcome::Cancelled => {
            discard(&output_path);
            anyhow::bail!("Export cancelled")
        }
        ExportOutcome::Failed(failure) => {
            discard(&output_path);
            Err(user_error(failure.into()))
        }
    }
}

fn discard(path: &std::path::Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Failed to remove unfinished output {:?}: {}", path, e);
    }
}

fn user_error(error: EditorError) -> anyhow::Error {
    anyhow::anyhow!(error.user_message())
}
