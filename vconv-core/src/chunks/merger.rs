use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{debug, info};

const DEFAULT_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("failed to create output file {path}: {source}")]
    CreateDestination { path: PathBuf, source: io::Error },
    #[error("failed to open chunk {path}: {source}")]
    OpenChunk { path: PathBuf, source: io::Error },
    #[error("failed to copy chunk {path}: {source}")]
    CopyChunk { path: PathBuf, source: io::Error },
    #[error("failed to finalize output file {path}: {source}")]
    Finalize { path: PathBuf, source: io::Error },
}

impl MergeError {
    /// The chunk or destination the failure is attributed to.
    pub fn path(&self) -> &Path {
        match self {
            MergeError::CreateDestination { path, .. }
            | MergeError::OpenChunk { path, .. }
            | MergeError::CopyChunk { path, .. }
            | MergeError::Finalize { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub destination: PathBuf,
    pub chunks: usize,
    pub bytes: u64,
}

/// Streams ordered chunk files into a single destination file.
///
/// Only one chunk is open at a time and data moves through a fixed-size buffer,
/// so memory use does not grow with chunk size. A failed merge leaves whatever
/// was already written in place.
#[derive(Debug, Clone)]
pub struct ChunkMerger {
    buffer_bytes: usize,
}

impl Default for ChunkMerger {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_BYTES)
    }
}

impl ChunkMerger {
    pub fn new(buffer_bytes: usize) -> Self {
        Self {
            buffer_bytes: buffer_bytes.max(1),
        }
    }

    pub async fn merge<P>(
        &self,
        chunks: &[P],
        destination: &Path,
    ) -> Result<MergeSummary, MergeError>
    where
        P: AsRef<Path>,
    {
        info!(
            destination = %destination.display(),
            chunks = chunks.len(),
            "merging chunks"
        );
        let mut output = File::create(destination).await.map_err(|source| {
            MergeError::CreateDestination {
                path: destination.to_path_buf(),
                source,
            }
        })?;

        let mut bytes = 0u64;
        for chunk in chunks {
            let chunk = chunk.as_ref();
            debug!(chunk = %chunk.display(), "appending chunk");
            let input = File::open(chunk)
                .await
                .map_err(|source| MergeError::OpenChunk {
                    path: chunk.to_path_buf(),
                    source,
                })?;
            let mut reader = BufReader::with_capacity(self.buffer_bytes, input);
            bytes += tokio::io::copy_buf(&mut reader, &mut output)
                .await
                .map_err(|source| MergeError::CopyChunk {
                    path: chunk.to_path_buf(),
                    source,
                })?;
        }

        output
            .flush()
            .await
            .map_err(|source| MergeError::Finalize {
                path: destination.to_path_buf(),
                source,
            })?;

        Ok(MergeSummary {
            destination: destination.to_path_buf(),
            chunks: chunks.len(),
            bytes,
        })
    }
}

/// Merges with the default copy buffer.
pub async fn merge_chunks<P>(chunks: &[P], destination: &Path) -> Result<MergeSummary, MergeError>
where
    P: AsRef<Path>,
{
    ChunkMerger::default().merge(chunks, destination).await
}
