//! The editing session: builds export jobs, hands them to a [`Transformer`]
//! and follows them to their outcome.
//!
//! At most one export runs per session. Each `process_*` call returns an
//! [`ExportHandle`] carrying the output path, live progress and the
//! terminal [`ExportOutcome`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, watch};
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::composition::{jobs, Composition};
use crate::config::Config;
use crate::error::{EditorError, PipelineErrorCode, PipelineFailure, Result, SessionError};
use crate::overlay::{GifOverlay, StaticOverlay};
use crate::pipeline::{ExportListener, ExportOutcome, ProgressState, Transformer};
use crate::staging;

/// Lifecycle of the session's current (or last) export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl From<&ExportOutcome> for SessionState {
    fn from(outcome: &ExportOutcome) -> Self {
        match outcome {
            ExportOutcome::Completed(_) => SessionState::Completed,
            ExportOutcome::Cancelled => SessionState::Cancelled,
            ExportOutcome::Failed(_) => SessionState::Failed,
        }
    }
}

#[derive(Debug)]
struct Active {
    state: SessionState,
    output_path: Option<PathBuf>,
    /// Running flag of the current export, shared with its poller and relay
    job: Option<Arc<AtomicBool>>,
    started: bool,
    cancel_requested: bool,
}

/// Handle on one submitted export
#[derive(Debug)]
pub struct ExportHandle {
    output_path: PathBuf,
    progress: watch::Receiver<ProgressState>,
    outcome: JoinHandle<ExportOutcome>,
}

impl ExportHandle {
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Latest progress answer published by the poller
    pub fn progress(&self) -> ProgressState {
        *self.progress.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.progress.clone()
    }

    /// Wait for the terminal outcome
    pub async fn wait(self) -> ExportOutcome {
        self.outcome.await.unwrap_or_else(|e| {
            ExportOutcome::Failed(PipelineFailure::new(
                PipelineErrorCode::Unspecified,
                format!("outcome relay failed: {}", e),
            ))
        })
    }
}

/// Orchestrates export jobs on top of a [`Transformer`]
pub struct EditingSession {
    transformer: Arc<dyn Transformer>,
    config: Config,
    active: Arc<Mutex<Active>>,
}

impl EditingSession {
    pub fn new(transformer: Arc<dyn Transformer>, config: Config) -> Self {
        Self {
            transformer,
            config,
            active: Arc::new(Mutex::new(Active {
                state: SessionState::Idle,
                output_path: None,
                job: None,
                started: false,
                cancel_requested: false,
            })),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        lock(&self.active).state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Two videos split top and bottom with a sticker image on top
    pub async fn process_layout(
        &self,
        video1: &Path,
        video2: &Path,
        image: &Path,
    ) -> Result<ExportHandle> {
        self.launch("layout", async {
            let video1 = self.stage(video1).await;
            let video2 = self.stage(video2).await;
            let image = self.stage(image).await;

            let bound = self.config.layout.image_bound;
            let sticker = blocking(move || StaticOverlay::load_scaled(&image, bound)).await?;

            Ok(jobs::layout(
                &video1,
                &video2,
                sticker,
                &self.config.layout,
                &self.config.output,
            ))
        })
        .await
    }

    /// Two video segments and a still image over an audio track
    pub async fn process_timeline(
        &self,
        video1: &Path,
        video2: &Path,
        image: &Path,
        audio: &Path,
    ) -> Result<ExportHandle> {
        self.launch("timeline", async {
            let video1 = self.stage(video1).await;
            let video2 = self.stage(video2).await;
            let image = self.stage(image).await;
            let audio = self.stage(audio).await;

            Ok(jobs::timeline(
                &video1,
                &video2,
                &image,
                &audio,
                &self.config.timeline,
                &self.config.output,
            ))
        })
        .await
    }

    /// A still image with an animated GIF filter on top
    pub async fn process_animated_filter(
        &self,
        image: &Path,
        gif_filter: &Path,
    ) -> Result<ExportHandle> {
        self.launch("animated filter", async {
            let image = self.stage(image).await;
            let gif_filter = self.stage(gif_filter).await;

            let size = self.config.output.size;
            let filter = blocking(move || GifOverlay::open(&gif_filter, size)).await?;

            Ok(jobs::animated_filter(
                &image,
                filter,
                &self.config.animated_filter,
                &self.config.output,
            ))
        })
        .await
    }

    /// Ask the running export to stop; no-op when nothing runs.
    ///
    /// A job still staging or decoding its inputs is never handed to the
    /// transformer and resolves as [`ExportOutcome::Cancelled`].
    pub fn cancel(&self) {
        let started = {
            let mut active = lock(&self.active);
            if active.state != SessionState::Running {
                debug!("Cancel ignored: no export running");
                return;
            }
            active.cancel_requested = true;
            active.started
        };

        if started {
            info!("Cancelling export");
            self.transformer.cancel();
        } else {
            info!("Cancelling export before it starts");
        }
    }

    async fn launch<F>(&self, job: &str, build: F) -> Result<ExportHandle>
    where
        F: Future<Output = Result<Composition>>,
    {
        let running = self.claim()?;

        let submitted = match build.await {
            Ok(composition) => self.submit(job, composition, Arc::clone(&running)),
            Err(e) => Err(e),
        };

        if let Err(e) = &submitted {
            warn!("{} export did not start: {}", job, e);
            lock(&self.active).state = SessionState::Failed;
            running.store(false, Ordering::Release);
        }
        submitted
    }

    fn claim(&self) -> Result<Arc<AtomicBool>> {
        let mut active = lock(&self.active);
        if active.state == SessionState::Running {
            let output = active
                .output_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            return Err(SessionError::Busy { output }.into());
        }

        let running = Arc::new(AtomicBool::new(true));
        active.state = SessionState::Running;
        active.output_path = None;
        active.job = Some(Arc::clone(&running));
        active.started = false;
        active.cancel_requested = false;
        Ok(running)
    }

    fn submit(
        &self,
        job: &str,
        composition: Composition,
        running: Arc<AtomicBool>,
    ) -> Result<ExportHandle> {
        let output_path = self.create_output()?;
        let (listener, receiver) = ExportListener::channel();
        let (progress_tx, progress_rx) = watch::channel(ProgressState::NotStarted);

        let cancelled_early = {
            let mut active = lock(&self.active);
            active.output_path = Some(output_path.clone());
            active.cancel_requested
        };

        if cancelled_early {
            info!("{} export cancelled before it started", job);
            listener.on_cancelled();
        } else {
            info!(
                "🎬 Starting {} export ({:?}ms) on {} -> {:?}",
                job,
                composition.duration_ms(),
                self.transformer.name(),
                output_path
            );
            self.transformer.start(composition, &output_path, listener)?;

            // A cancel that landed while starting was not forwarded yet
            let cancel_pending = {
                let mut active = lock(&self.active);
                active.started = true;
                active.cancel_requested
            };
            if cancel_pending {
                info!("Cancelling export");
                self.transformer.cancel();
            }

            tokio::spawn(poll_progress(
                Arc::clone(&self.transformer),
                Arc::clone(&running),
                self.config.session.progress_interval(),
                progress_tx,
            ));
        }

        let outcome = tokio::spawn(relay_outcome(
            receiver,
            Arc::clone(&self.active),
            running,
            Instant::now(),
        ));

        Ok(ExportHandle {
            output_path,
            progress: progress_rx,
            outcome,
        })
    }

    /// Reserve a fresh `output<random>.<ext>` file for the next export
    fn create_output(&self) -> Result<PathBuf> {
        let dir = self
            .config
            .output
            .directory
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&dir)?;

        let suffix = format!(".{}", self.config.output.container_extension);
        let file = tempfile::Builder::new()
            .prefix("output")
            .suffix(&suffix)
            .tempfile_in(&dir)?;
        let (_, path) = file.keep().map_err(|e| EditorError::Io(e.error))?;
        Ok(path)
    }

    async fn stage(&self, source: &Path) -> PathBuf {
        match &self.config.session.staging_directory {
            Some(dir) => staging::stage_asset(source, dir).await,
            None => source.to_path_buf(),
        }
    }
}

/// Run a decoding step off the async worker threads
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(|e| EditorError::generic(format!("decoding task failed: {}", e)))?
}

async fn poll_progress(
    transformer: Arc<dyn Transformer>,
    running: Arc<AtomicBool>,
    period: Duration,
    progress: watch::Sender<ProgressState>,
) {
    let mut ticker = tokio::time::interval(period);

    loop {
        ticker.tick().await;
        if !running.load(Ordering::Acquire) {
            break;
        }

        let state = transformer.progress();
        progress.send_replace(state);

        match state {
            ProgressState::Available(percent) => info!("PROGRESS = {}%", percent),
            ProgressState::NotStarted => {
                debug!("Pipeline reports no export, progress polling stopped");
                break;
            }
            other => debug!("Progress: {:?}", other),
        }
    }
}

async fn relay_outcome(
    receiver: oneshot::Receiver<ExportOutcome>,
    active: Arc<Mutex<Active>>,
    running: Arc<AtomicBool>,
    started: Instant,
) -> ExportOutcome {
    let outcome = receiver.await.unwrap_or_else(|_| {
        warn!("Pipeline dropped the export listener without an outcome");
        ExportOutcome::Cancelled
    });

    {
        let mut active = lock(&active);
        if active.job.as_ref().is_some_and(|job| Arc::ptr_eq(job, &running)) {
            active.state = SessionState::from(&outcome);
        }
    }
    running.store(false, Ordering::Release);

    match &outcome {
        ExportOutcome::Completed(result) => info!(
            "🎉 DONE -> {} seconds ({})",
            started.elapsed().as_secs(),
            result.output_path.display()
        ),
        ExportOutcome::Cancelled => info!(
            "Export cancelled after {} seconds",
            started.elapsed().as_secs()
        ),
        ExportOutcome::Failed(failure) => warn!("Export failed: {}", failure),
    }

    outcome
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
