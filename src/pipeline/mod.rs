//! # Transformation pipeline
//!
//! The editor never decodes, composites or encodes media itself. It hands a
//! [`Composition`] to a [`Transformer`] and observes it:
//!
//! - the terminal outcome arrives once through the per-job [`ExportListener`]
//! - progress is polled with [`Transformer::progress`]
//! - [`Transformer::cancel`] asks the running export to stop
//!
//! [`FfmpegTransformer`] is the bundled implementation.

pub mod ffmpeg;

pub use ffmpeg::FfmpegTransformer;

use std::path::{Path, PathBuf};

use tokio::sync::oneshot;
use tracing::debug;

use crate::composition::Composition;
use crate::error::{PipelineFailure, Result};
use crate::types::{AudioMimeType, VideoMimeType};

/// Answer to a progress query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    /// No export is running
    NotStarted,
    /// An export is running but has not produced output yet
    WaitingForAvailability,
    /// Percentage of the output written, 0 to 100
    Available(u8),
    /// An export is running but cannot report how far along it is
    Unavailable,
}

/// Summary of a finished export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    pub output_path: PathBuf,
    pub duration_ms: Option<u64>,
    pub file_size_bytes: u64,
    pub video_mime_type: VideoMimeType,
    /// `None` when the output has no audio track
    pub audio_mime_type: Option<AudioMimeType>,
}

/// Terminal outcome of one export
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Completed(ExportResult),
    Cancelled,
    Failed(PipelineFailure),
}

impl ExportOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Per-job callback the pipeline reports the terminal outcome through
///
/// Consumed by the first report. Dropping it without reporting counts as a
/// cancellation.
#[derive(Debug)]
pub struct ExportListener {
    sender: oneshot::Sender<ExportOutcome>,
}

impl ExportListener {
    /// Listener plus the receiving end the caller awaits
    pub fn channel() -> (Self, oneshot::Receiver<ExportOutcome>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    pub fn on_completed(self, result: ExportResult) {
        self.report(ExportOutcome::Completed(result));
    }

    pub fn on_error(self, failure: PipelineFailure) {
        self.report(ExportOutcome::Failed(failure));
    }

    pub fn on_cancelled(self) {
        self.report(ExportOutcome::Cancelled);
    }

    fn report(self, outcome: ExportOutcome) {
        if self.sender.send(outcome).is_err() {
            debug!("Export outcome dropped: nobody is listening");
        }
    }
}

/// A media transformation pipeline
pub trait Transformer: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Begin exporting `composition` to `output_path`
    ///
    /// Returns once the export is underway; the outcome is reported through
    /// `listener`. An error here means the export never started and the
    /// listener has been dropped.
    fn start(
        &self,
        composition: Composition,
        output_path: &Path,
        listener: ExportListener,
    ) -> Result<()>;

    /// Progress of the running export
    fn progress(&self) -> ProgressState;

    /// Ask the running export to stop; no-op when idle
    fn cancel(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineErrorCode;

    #[tokio::test]
    async fn test_listener_reports_once() {
        let (listener, receiver) = ExportListener::channel();
        listener.on_error(PipelineFailure::new(PipelineErrorCode::Io, "gone"));

        let outcome = receiver.await.unwrap();
        assert!(matches!(outcome, ExportOutcome::Failed(f) if f.message == "gone"));
    }

    #[tokio::test]
    async fn test_dropped_listener_closes_channel() {
        let (listener, receiver) = ExportListener::channel();
        drop(listener);
        assert!(receiver.await.is_err());
    }

    #[test]
    fn test_report_without_receiver_does_not_panic() {
        let (listener, receiver) = ExportListener::channel();
        drop(receiver);
        listener.on_cancelled();
    }
}
