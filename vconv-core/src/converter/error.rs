use std::path::PathBuf;

use thiserror::Error;

use crate::chunks::{DiscoveryError, MergeError};
use crate::task::DecodeError;
use crate::transcode::{OutputDirError, TranscodeError};

use super::types::TaskState;

#[derive(Debug, Error)]
#[error("failed to remove merged file {path}: {source}")]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    OutputDir(#[from] OutputDirError),
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error(transparent)]
    Cleanup(#[from] CleanupError),
}

impl PipelineError {
    /// Stage description used as the `error` field of failure reports.
    pub fn description(&self) -> &'static str {
        match self {
            PipelineError::Decode(_) => "Failed to unmarshal json",
            PipelineError::Discovery(_) => "Failed to find chunks",
            PipelineError::Merge(_) => "Failed to merge chunks",
            PipelineError::OutputDir(_) => "Failed to create directory",
            PipelineError::Transcode(_) => "Failed to convert video to mpeg",
            PipelineError::Cleanup(_) => "Failed to remove merged file",
        }
    }

    /// The state whose work produced this error.
    pub fn stage(&self) -> TaskState {
        match self {
            PipelineError::Decode(_) => TaskState::Parsing,
            PipelineError::Discovery(_) | PipelineError::Merge(_) => TaskState::Merging,
            PipelineError::OutputDir(_) => TaskState::PreparingOutput,
            PipelineError::Transcode(_) => TaskState::Transcoding,
            PipelineError::Cleanup(_) => TaskState::CleaningUp,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
