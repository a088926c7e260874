mod error;
mod types;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info, warn};

use crate::chunks::{discover_chunks, ChunkMerger};
use crate::config::ConverterConfig;
use crate::report::{ErrorReport, ErrorReporter, TracingReporter};
use crate::task::{parse_task, VideoTask};
use crate::transcode::{CommandExecutor, Transcoder};

pub use error::{CleanupError, PipelineError, PipelineResult};
pub use types::{TaskRun, TaskState};

/// Pipeline position plus the data the next stage needs.
enum Step {
    Parsing,
    Merging(VideoTask),
    PreparingOutput(VideoTask),
    Transcoding { task: VideoTask, output_dir: PathBuf },
    CleaningUp(VideoTask),
    Done,
}

impl Step {
    fn state(&self) -> TaskState {
        match self {
            Step::Parsing => TaskState::Parsing,
            Step::Merging(_) => TaskState::Merging,
            Step::PreparingOutput(_) => TaskState::PreparingOutput,
            Step::Transcoding { .. } => TaskState::Transcoding,
            Step::CleaningUp(_) => TaskState::CleaningUp,
            Step::Done => TaskState::Done,
        }
    }
}

/// Turns one task payload into a DASH package: merge chunks, transcode,
/// remove the merged file.
///
/// Failures never escape: each one ends the task in [`TaskState::Failed`] and
/// produces exactly one [`ErrorReport`] for the configured reporter.
#[derive(Clone)]
pub struct VideoConverter {
    config: Arc<ConverterConfig>,
    merger: ChunkMerger,
    transcoder: Transcoder,
    reporter: Arc<dyn ErrorReporter>,
}

impl fmt::Debug for VideoConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoConverter")
            .field("config", &self.config)
            .field("merger", &self.merger)
            .field("transcoder", &self.transcoder)
            .finish()
    }
}

impl VideoConverter {
    pub fn new(config: ConverterConfig) -> Self {
        let merger = ChunkMerger::new(config.chunks.copy_buffer_bytes);
        let transcoder = Transcoder::new(&config.transcoder);
        Self {
            config: Arc::new(config),
            merger,
            transcoder,
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.transcoder = self.transcoder.with_executor(executor);
        self
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn merged_file(&self, task_dir: &Path) -> PathBuf {
        self.config.merged_file(task_dir)
    }

    /// Processes one payload. The outcome is only visible through the reporter
    /// and the filesystem.
    pub async fn handle(&self, payload: &[u8]) {
        let _ = self.run(payload).await;
    }

    /// Processes one payload and returns the full state trace.
    pub async fn run(&self, payload: &[u8]) -> TaskRun {
        let mut run = TaskRun::default();
        let mut step = Step::Parsing;
        loop {
            let state = step.state();
            run.states.push(state);
            if state.is_terminal() {
                break;
            }
            match self.advance(step, payload, &mut run).await {
                Ok(next) => step = next,
                Err(error) => {
                    run.states.push(TaskState::Failed);
                    self.report_failure(run.video_id, &error);
                    run.error = Some(error);
                    break;
                }
            }
        }
        run
    }

    async fn advance(
        &self,
        step: Step,
        payload: &[u8],
        run: &mut TaskRun,
    ) -> PipelineResult<Step> {
        match step {
            Step::Parsing => {
                let task = parse_task(payload).map_err(|err| {
                    run.video_id = err.video_id;
                    err
                })?;
                run.video_id = Some(task.video_id);
                run.task = Some(task.clone());
                Ok(Step::Merging(task))
            }
            Step::Merging(task) => {
                let merged = self.merged_file(&task.path);
                info!(video_id = task.video_id, merged_file = %merged.display(), "Merging chunks");
                let chunks = discover_chunks(&task.path, &self.config.chunks.extension).await?;
                info!(video_id = task.video_id, chunks = chunks.len(), "found chunks");
                if chunks.is_empty() {
                    warn!(
                        video_id = task.video_id,
                        path = %task.path.display(),
                        "no chunks found, merged file will be empty"
                    );
                }
                run.merge = Some(self.merger.merge(&chunks, &merged).await?);
                Ok(Step::PreparingOutput(task))
            }
            Step::PreparingOutput(task) => {
                let output_dir = self.transcoder.prepare_output(&task.path).await?;
                Ok(Step::Transcoding { task, output_dir })
            }
            Step::Transcoding { task, output_dir } => {
                info!(
                    video_id = task.video_id,
                    path = %task.path.display(),
                    "Converting video to mpeg-dash"
                );
                let outcome = self
                    .transcoder
                    .transcode(&self.merged_file(&task.path), &output_dir)
                    .await?;
                info!(
                    video_id = task.video_id,
                    path = %output_dir.display(),
                    "Finished converting video to mpeg"
                );
                run.manifest = Some(outcome.manifest);
                Ok(Step::CleaningUp(task))
            }
            Step::CleaningUp(task) => {
                let merged = self.merged_file(&task.path);
                fs::remove_file(&merged)
                    .await
                    .map_err(|source| CleanupError {
                        path: merged.clone(),
                        source,
                    })?;
                info!(
                    video_id = task.video_id,
                    merged_file = %merged.display(),
                    "removed merged file"
                );
                Ok(Step::Done)
            }
            Step::Done => Ok(Step::Done),
        }
    }

    fn report_failure(&self, video_id: Option<i64>, error: &PipelineError) {
        debug!(
            video_id = ?video_id,
            stage = %error.stage(),
            "task failed"
        );
        let report = ErrorReport::new(video_id, error.description(), error.to_string());
        self.reporter.report(&report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;
    use tempfile::TempDir;

    fn converter() -> (VideoConverter, Arc<MemoryReporter>) {
        let reporter = Arc::new(MemoryReporter::new());
        let converter =
            VideoConverter::new(ConverterConfig::default()).with_reporter(reporter.clone());
        (converter, reporter)
    }

    #[tokio::test]
    async fn malformed_payload_fails_in_parsing() {
        let (converter, reporter) = converter();
        let run = converter.run(b"{not json").await;

        assert_eq!(run.states, vec![TaskState::Parsing, TaskState::Failed]);
        assert_eq!(run.failed_during(), Some(TaskState::Parsing));
        assert!(matches!(run.error, Some(PipelineError::Decode(_))));
        assert!(run.task.is_none());

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].error, "Failed to unmarshal json");
        assert_eq!(reports[0].video_id, None);
    }

    #[tokio::test]
    async fn unreadable_directory_fails_in_merging() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let payload = serde_json::json!({ "video_id": 5, "path": missing }).to_string();
        let (converter, reporter) = converter();

        let run = converter.run(payload.as_bytes()).await;
        assert_eq!(run.failed_during(), Some(TaskState::Merging));
        assert!(matches!(run.error, Some(PipelineError::Discovery(_))));
        assert_eq!(run.video_id, Some(5));
        assert!(!missing.join("merged.mp4").exists());

        let reports = reporter.reports();
        assert_eq!(reports[0].error, "Failed to find chunks");
        assert_eq!(reports[0].video_id, Some(5));
    }

    #[test]
    fn every_error_maps_to_its_state() {
        let err = PipelineError::from(CleanupError {
            path: PathBuf::from("/tmp/merged.mp4"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert_eq!(err.stage(), TaskState::CleaningUp);
        assert_eq!(err.description(), "Failed to remove merged file");
        assert!(err.to_string().contains("/tmp/merged.mp4"));
    }
}
