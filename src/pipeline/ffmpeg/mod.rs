//! [`Transformer`] backed by an external `ffmpeg` binary.
//!
//! One export runs at a time. The composition is turned into a single
//! ffmpeg command line (see [`graph`]), overlays are rendered to PNG frames
//! in a temporary directory, and progress is read from ffmpeg's
//! `-progress` stream.

pub mod graph;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task;
use tracing::{debug, info, warn};

use crate::composition::Composition;
use crate::config::FfmpegConfig;
use crate::error::{PipelineErrorCode, PipelineFailure, Result};
use crate::pipeline::{ExportListener, ExportResult, ProgressState, Transformer};

/// Lines of ffmpeg's stderr kept for failure messages
const STDERR_TAIL_LINES: usize = 20;

/// State shared between the transformer and its running export
#[derive(Default)]
struct ExportShared {
    encoding: AtomicBool,
    percent: AtomicU8,
    cancelled: AtomicBool,
    cancel: Notify,
}

/// Why an export stopped short of completion
enum Stop {
    Cancelled,
    Failed(PipelineFailure),
}

impl From<PipelineFailure> for Stop {
    fn from(failure: PipelineFailure) -> Self {
        Stop::Failed(failure)
    }
}

pub struct FfmpegTransformer {
    config: FfmpegConfig,
    current: Arc<Mutex<Option<Arc<ExportShared>>>>,
}

impl FfmpegTransformer {
    pub fn new(config: FfmpegConfig) -> Self {
        Self {
            config,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether the configured binary answers `-version`
    pub async fn check_available(&self) -> bool {
        check_binary(&self.config.binary).await
    }
}

impl Default for FfmpegTransformer {
    fn default() -> Self {
        Self::new(FfmpegConfig::default())
    }
}

impl Transformer for FfmpegTransformer {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn start(
        &self,
        composition: Composition,
        output_path: &Path,
        listener: ExportListener,
    ) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| {
            PipelineFailure::new(
                PipelineErrorCode::Unavailable,
                "exports must be started from within a tokio runtime",
            )
        })?;

        let shared = {
            let mut current = lock(&self.current);
            if current.is_some() {
                return Err(PipelineFailure::new(
                    PipelineErrorCode::Unavailable,
                    "another export is already running",
                )
                .into());
            }
            let shared = Arc::new(ExportShared::default());
            *current = Some(Arc::clone(&shared));
            shared
        };

        let job = ExportJob {
            config: self.config.clone(),
            output_path: output_path.to_path_buf(),
            shared,
            current: Arc::clone(&self.current),
        };
        runtime.spawn(job.run(composition, listener));
        Ok(())
    }

    fn progress(&self) -> ProgressState {
        match lock(&self.current).as_ref() {
            None => ProgressState::NotStarted,
            Some(shared) if !shared.encoding.load(Ordering::Acquire) => {
                ProgressState::WaitingForAvailability
            }
            Some(shared) => ProgressState::Available(shared.percent.load(Ordering::Acquire)),
        }
    }

    fn cancel(&self) {
        if let Some(shared) = lock(&self.current).as_ref() {
            info!("Cancelling ffmpeg export");
            shared.cancelled.store(true, Ordering::Release);
            shared.cancel.notify_one();
        }
    }
}

struct ExportJob {
    config: FfmpegConfig,
    output_path: PathBuf,
    shared: Arc<ExportShared>,
    current: Arc<Mutex<Option<Arc<ExportShared>>>>,
}

impl ExportJob {
    async fn run(self, composition: Composition, listener: ExportListener) {
        let started = Instant::now();
        let outcome = self.export(composition).await;

        // Cleared before reporting so the listener may start the next export
        *lock(&self.current) = None;

        match outcome {
            Ok(result) => {
                info!(
                    "Export finished in {:.1}s: {} ({}KB)",
                    started.elapsed().as_secs_f32(),
                    result.output_path.display(),
                    result.file_size_bytes / 1024
                );
                listener.on_completed(result);
            }
            Err(Stop::Cancelled) => {
                info!("Export cancelled after {:.1}s", started.elapsed().as_secs_f32());
                listener.on_cancelled();
            }
            Err(Stop::Failed(failure)) => {
                warn!("Export failed: {}", failure);
                listener.on_error(failure);
            }
        }
    }

    fn check_cancelled(&self) -> std::result::Result<(), Stop> {
        if self.shared.cancelled.load(Ordering::Acquire) {
            Err(Stop::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn export(
        &self,
        mut composition: Composition,
    ) -> std::result::Result<ExportResult, Stop> {
        if !check_binary(&self.config.binary).await {
            return Err(PipelineFailure::new(
                PipelineErrorCode::Unavailable,
                format!("ffmpeg not found at {}", self.config.binary.display()),
            )
            .into());
        }
        self.check_cancelled()?;

        let frames_dir = tempfile::Builder::new()
            .prefix("clip_composer_frames_")
            .tempdir()
            .map_err(|e| io_failure("cannot create frame directory", e))?;

        let encoder = composition.encoder;
        let render_threads = self.config.render_threads;
        let crf = self.config.crf;
        let output = self.output_path.clone();
        let frames_path = frames_dir.path().to_path_buf();

        let plan = task::spawn_blocking(move || {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(render_threads)
                .build()
                .map_err(|e| {
                    PipelineFailure::new(
                        PipelineErrorCode::Processing,
                        format!("cannot start render threads: {}", e),
                    )
                })?;
            graph::build(&mut composition, &output, &frames_path, &pool, crf)
        })
        .await
        .map_err(|e| {
            PipelineFailure::new(
                PipelineErrorCode::Processing,
                format!("render task failed: {}", e),
            )
        })??;
        self.check_cancelled()?;

        debug!("ffmpeg {}", plan.args.join(" "));
        let mut child = Command::new(&self.config.binary)
            .args(["-hide_banner", "-nostats", "-loglevel", "error", "-progress", "pipe:1"])
            .args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PipelineFailure::new(
                    PipelineErrorCode::Unavailable,
                    format!("cannot spawn {}: {}", self.config.binary.display(), e),
                )
            })?;

        let stderr = child.stderr.take().map(|stderr| tokio::spawn(read_tail(stderr)));
        let stdout = child.stdout.take().ok_or_else(|| {
            PipelineFailure::new(PipelineErrorCode::Processing, "ffmpeg progress pipe missing")
        })?;

        self.shared.encoding.store(true, Ordering::Release);
        info!("Encoding {}ms of video to {}", plan.duration_ms, self.output_path.display());

        let total_us = plan.duration_ms * 1_000;
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = self.shared.cancel.notified() => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill ffmpeg: {}", e);
                    }
                    return Err(Stop::Cancelled);
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(out_time_us) = parse_out_time_us(&line) {
                            let percent = progress_percent(out_time_us, total_us);
                            self.shared.percent.store(percent, Ordering::Release);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Lost ffmpeg progress stream: {}", e);
                        break;
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| io_failure("cannot wait for ffmpeg", e))?;
        self.check_cancelled()?;

        if !status.success() {
            let tail = match stderr {
                Some(handle) => handle.await.unwrap_or_default(),
                None => String::new(),
            };
            return Err(PipelineFailure::new(
                PipelineErrorCode::Processing,
                format!("ffmpeg exited with {}: {}", status, tail.trim()),
            )
            .into());
        }

        let metadata = tokio::fs::metadata(&self.output_path)
            .await
            .map_err(|e| io_failure("output missing after export", e))?;

        Ok(ExportResult {
            output_path: self.output_path.clone(),
            duration_ms: Some(plan.duration_ms),
            file_size_bytes: metadata.len(),
            video_mime_type: encoder.video_mime_type,
            audio_mime_type: plan.has_audio.then_some(encoder.audio_mime_type),
        })
    }
}

async fn check_binary(binary: &Path) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Read a stream to its end, keeping the last few lines
async fn read_tail<R: AsyncRead + Unpin>(stream: R) -> String {
    let mut text = String::new();
    let mut reader = BufReader::new(stream);
    if let Err(e) = reader.read_to_string(&mut text).await {
        debug!("ffmpeg stderr unreadable: {}", e);
    }

    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Encoded position from a `-progress` line, in microseconds
///
/// `out_time_ms` carries microseconds as well despite its name.
fn parse_out_time_us(line: &str) -> Option<u64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => value.parse().ok(),
        _ => None,
    }
}

/// Share of `total_us` covered, held below 100 until ffmpeg exits
fn progress_percent(out_time_us: u64, total_us: u64) -> u8 {
    if total_us == 0 {
        return 0;
    }
    (out_time_us.saturating_mul(100) / total_us).min(99) as u8
}

fn io_failure(context: &str, error: std::io::Error) -> PipelineFailure {
    PipelineFailure::new(PipelineErrorCode::Io, format!("{}: {}", context, error))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{ClippingConfiguration, EditedMediaItem, MediaItem, Sequence};
    use crate::pipeline::ExportOutcome;
    use crate::types::Size;

    fn missing_binary() -> FfmpegTransformer {
        FfmpegTransformer::new(FfmpegConfig {
            binary: PathBuf::from("/nonexistent/ffmpeg"),
            ..FfmpegConfig::default()
        })
    }

    fn composition() -> Composition {
        Composition::new(
            vec![Sequence::new(vec![EditedMediaItem::new(
                MediaItem::new("a.mp4").with_clipping(ClippingConfiguration::new(0, 1_000)),
            )])],
            Size::new(64, 64),
        )
    }

    #[test]
    fn test_parse_progress_lines() {
        assert_eq!(parse_out_time_us("out_time_us=1500000"), Some(1_500_000));
        assert_eq!(parse_out_time_us("out_time_ms=2000000\n"), Some(2_000_000));
        assert_eq!(parse_out_time_us("out_time_us=N/A"), None);
        assert_eq!(parse_out_time_us("frame=12"), None);
        assert_eq!(parse_out_time_us("progress=end"), None);
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 20_000_000), 0);
        assert_eq!(progress_percent(5_000_000, 20_000_000), 25);
        assert_eq!(progress_percent(25_000_000, 20_000_000), 99);
        assert_eq!(progress_percent(10, 0), 0);
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let transformer = missing_binary();
        let (listener, _receiver) = ExportListener::channel();

        let result = transformer.start(composition(), Path::new("out.mp4"), listener);
        assert!(result.is_err());
        assert_eq!(transformer.progress(), ProgressState::NotStarted);
    }

    #[tokio::test]
    async fn test_idle_transformer() {
        let transformer = missing_binary();
        assert_eq!(transformer.progress(), ProgressState::NotStarted);
        transformer.cancel();
        assert_eq!(transformer.progress(), ProgressState::NotStarted);
        assert!(!transformer.check_available().await);
    }

    #[tokio::test]
    async fn test_missing_binary_reports_unavailable() {
        let transformer = missing_binary();
        let (listener, receiver) = ExportListener::channel();

        transformer
            .start(composition(), Path::new("out.mp4"), listener)
            .unwrap();
        // The export task has not been polled yet on this runtime
        assert_eq!(transformer.progress(), ProgressState::WaitingForAvailability);

        let (second, _second_receiver) = ExportListener::channel();
        assert!(transformer
            .start(composition(), Path::new("other.mp4"), second)
            .is_err());

        match receiver.await.unwrap() {
            ExportOutcome::Failed(failure) => {
                assert_eq!(failure.code, PipelineErrorCode::Unavailable)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(transformer.progress(), ProgressState::NotStarted);
    }

    #[tokio::test]
    async fn test_read_tail_keeps_last_lines() {
        let text: String = (0..50).map(|n| format!("line {}\n", n)).collect();
        let tail = read_tail(text.as_bytes()).await;

        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 49"));
    }
}
