use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::chunks::MergeSummary;
use crate::task::VideoTask;

use super::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Parsing,
    Merging,
    PreparingOutput,
    Transcoding,
    CleaningUp,
    Done,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Parsing => "parsing",
            TaskState::Merging => "merging",
            TaskState::PreparingOutput => "preparing_output",
            TaskState::Transcoding => "transcoding",
            TaskState::CleaningUp => "cleaning_up",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trace of one task through the pipeline.
///
/// `states` lists every state entered, in order, ending in `Done` or `Failed`.
/// On failure `error` holds the cause and `task`/`video_id` hold whatever was
/// known about the task at that point.
#[derive(Debug, Default)]
pub struct TaskRun {
    pub video_id: Option<i64>,
    pub task: Option<VideoTask>,
    pub states: Vec<TaskState>,
    pub merge: Option<MergeSummary>,
    pub manifest: Option<PathBuf>,
    pub error: Option<PipelineError>,
}

impl TaskRun {
    pub fn state(&self) -> TaskState {
        self.states.last().copied().unwrap_or(TaskState::Parsing)
    }

    pub fn is_success(&self) -> bool {
        self.state() == TaskState::Done
    }

    /// The last non-terminal state before `Failed`, if the run failed.
    pub fn failed_during(&self) -> Option<TaskState> {
        match self.states.as_slice() {
            [.., previous, TaskState::Failed] => Some(*previous),
            _ => None,
        }
    }
}
