use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tracing::info;

use crate::config::TranscoderSection;

#[derive(Debug, Error)]
#[error("failed to create output directory {path}: {source}")]
pub struct OutputDirError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to launch {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("command failed ({command}, status {status:?}): {output}")]
    CommandFailure {
        command: String,
        status: Option<i32>,
        output: String,
    },
}

impl TranscodeError {
    /// Combined stdout/stderr captured from the failed run, if it got that far.
    pub fn output(&self) -> Option<&str> {
        match self {
            TranscodeError::Spawn { .. } => None,
            TranscodeError::CommandFailure { output, .. } => Some(output),
        }
    }
}

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> io::Result<Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, program: &Path, args: &[String]) -> io::Result<Output> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
    }
}

#[derive(Debug, Clone)]
pub struct TranscodeOutcome {
    pub manifest: PathBuf,
    pub output: String,
}

/// Drives the external packager that turns a merged file into a DASH manifest
/// plus segments.
#[derive(Clone)]
pub struct Transcoder {
    program: PathBuf,
    format: String,
    output_dir: String,
    manifest: String,
    extra_args: Vec<String>,
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for Transcoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transcoder")
            .field("program", &self.program)
            .field("format", &self.format)
            .field("output_dir", &self.output_dir)
            .field("manifest", &self.manifest)
            .field("extra_args", &self.extra_args)
            .finish()
    }
}

impl Transcoder {
    pub fn new(section: &TranscoderSection) -> Self {
        Self {
            program: section.program.clone(),
            format: section.format.clone(),
            output_dir: section.output_dir.clone(),
            manifest: section.manifest.clone(),
            extra_args: section.extra_args.clone(),
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn output_dir(&self, task_dir: &Path) -> PathBuf {
        task_dir.join(&self.output_dir)
    }

    pub fn manifest_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(&self.manifest)
    }

    pub fn build_args(&self, merged: &Path, manifest: &Path) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.push("-i".to_string());
        args.push(merged.to_string_lossy().to_string());
        args.push("-f".to_string());
        args.push(self.format.clone());
        args.push(manifest.to_string_lossy().to_string());
        args
    }

    /// Creates `<task_dir>/<output_dir>` and any missing parents.
    pub async fn prepare_output(&self, task_dir: &Path) -> Result<PathBuf, OutputDirError> {
        let output_dir = self.output_dir(task_dir);
        info!(path = %output_dir.display(), "creating output directory");
        fs::create_dir_all(&output_dir)
            .await
            .map_err(|source| OutputDirError {
                path: output_dir.clone(),
                source,
            })?;
        Ok(output_dir)
    }

    /// Runs the packager once. A non-zero exit is returned as an error with the
    /// captured output; it is never retried here.
    pub async fn transcode(
        &self,
        merged: &Path,
        output_dir: &Path,
    ) -> Result<TranscodeOutcome, TranscodeError> {
        let manifest = self.manifest_path(output_dir);
        let args = self.build_args(merged, &manifest);
        info!(
            program = %self.program.display(),
            input = %merged.display(),
            manifest = %manifest.display(),
            "starting transcode"
        );
        let output = self
            .executor
            .run(&self.program, &args)
            .await
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let combined = combined_output(&output);
        if !output.status.success() {
            return Err(TranscodeError::CommandFailure {
                command: format!("{} {}", self.program.display(), args.join(" ")),
                status: output.status.code(),
                output: combined,
            });
        }

        info!(manifest = %manifest.display(), "finished transcode");
        Ok(TranscodeOutcome {
            manifest,
            output: combined,
        })
    }
}

fn combined_output(output: &Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}
