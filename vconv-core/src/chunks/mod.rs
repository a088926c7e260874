//! Chunk discovery, ordering and reassembly.
//!
//! Uploaded videos arrive as a directory of `*.chunk` files whose names embed a
//! decimal sequence number (`0.chunk`, `part-12.chunk`, ...). The first run of
//! digits in the base name is the ordering key; names without digits get
//! [`SENTINEL_KEY`] and sort before every numbered chunk.

mod merger;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

pub use merger::{merge_chunks, ChunkMerger, MergeError, MergeSummary};

/// Ordering key for chunk names without any digit run.
pub const SENTINEL_KEY: i64 = -1;

#[derive(Debug, Error)]
#[error("failed to list chunk directory {path}: {source}")]
pub struct DiscoveryError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEntry {
    pub key: i64,
    pub path: PathBuf,
}

fn digit_run() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"[0-9]+").expect("valid regex"))
}

/// Extracts the ordering key from the base name of `path`.
///
/// Returns [`SENTINEL_KEY`] when the name has no digits or the first digit run
/// does not fit in an `i64`.
pub fn sequence_key(path: &Path) -> i64 {
    let Some(name) = path.file_name() else {
        return SENTINEL_KEY;
    };
    let name = name.to_string_lossy();
    digit_run()
        .find(&name)
        .and_then(|found| found.as_str().parse::<i64>().ok())
        .unwrap_or(SENTINEL_KEY)
}

/// Orders chunk paths by sequence key. Equal keys fall back to the file name
/// so the result never depends on directory enumeration order.
pub fn order_chunks<I>(paths: I) -> Vec<ChunkEntry>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut entries: Vec<ChunkEntry> = paths
        .into_iter()
        .map(|path| ChunkEntry {
            key: sequence_key(&path),
            path,
        })
        .collect();
    entries.sort_by(|a, b| {
        a.key
            .cmp(&b.key)
            .then_with(|| a.path.file_name().cmp(&b.path.file_name()))
    });
    entries
}

/// Lists the chunk files of `dir` (names ending in `.<extension>`) in merge order.
pub async fn resolve_chunks(
    dir: &Path,
    extension: &str,
) -> Result<Vec<ChunkEntry>, DiscoveryError> {
    let suffix = format!(".{}", extension.trim_start_matches('.'));
    let listing_error = |source: io::Error| DiscoveryError {
        path: dir.to_path_buf(),
        source,
    };

    let mut reader = fs::read_dir(dir).await.map_err(listing_error)?;
    let mut matches = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(listing_error)? {
        if !entry.file_name().to_string_lossy().ends_with(&suffix) {
            continue;
        }
        let path = entry.path();
        // Follows symlinks, so a link to a directory is skipped like the directory
        // itself. A dangling link is kept and fails when the merger opens it.
        if let Ok(metadata) = fs::metadata(&path).await {
            if metadata.is_dir() {
                continue;
            }
        }
        matches.push(path);
    }

    let ordered = order_chunks(matches);
    debug!(dir = %dir.display(), chunks = ordered.len(), "resolved chunk order");
    Ok(ordered)
}

/// Same as [`resolve_chunks`] but yields only the ordered paths.
pub async fn discover_chunks(
    dir: &Path,
    extension: &str,
) -> Result<Vec<PathBuf>, DiscoveryError> {
    Ok(resolve_chunks(dir, extension)
        .await?
        .into_iter()
        .map(|entry| entry.path)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(entries: &[ChunkEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|entry| entry.path.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn key_is_first_digit_run_of_base_name() {
        assert_eq!(sequence_key(Path::new("/uploads/7/12.chunk")), 12);
        assert_eq!(sequence_key(Path::new("part-003-of-9.chunk")), 3);
        assert_eq!(sequence_key(Path::new("/tmp/99/video.chunk")), SENTINEL_KEY);
        assert_eq!(sequence_key(Path::new("chunk")), SENTINEL_KEY);
    }

    #[test]
    fn oversized_digit_run_degrades_to_sentinel() {
        assert_eq!(
            sequence_key(Path::new("99999999999999999999999.chunk")),
            SENTINEL_KEY
        );
    }

    #[test]
    fn ordering_is_numeric_not_lexicographic() {
        let ordered = order_chunks(
            ["10.chunk", "2.chunk", "1.chunk", "header.chunk"]
                .into_iter()
                .map(PathBuf::from),
        );
        assert_eq!(
            names(&ordered),
            vec!["header.chunk", "1.chunk", "2.chunk", "10.chunk"]
        );
        assert_eq!(ordered[0].key, SENTINEL_KEY);
    }

    #[test]
    fn ties_are_broken_by_file_name() {
        let forward = order_chunks(["b-1.chunk", "a-1.chunk"].into_iter().map(PathBuf::from));
        let backward = order_chunks(["a-1.chunk", "b-1.chunk"].into_iter().map(PathBuf::from));
        assert_eq!(names(&forward), vec!["a-1.chunk", "b-1.chunk"]);
        assert_eq!(forward, backward);
    }

    #[tokio::test]
    async fn resolve_filters_by_suffix_and_skips_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("1.chunk"), b"b").unwrap();
        std::fs::write(dir.path().join("0.chunk"), b"a").unwrap();
        std::fs::write(dir.path().join("2.chunk.partial"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("3.chunk")).unwrap();

        let ordered = resolve_chunks(dir.path(), "chunk").await.unwrap();
        assert_eq!(names(&ordered), vec!["0.chunk", "1.chunk"]);

        let dotted = discover_chunks(dir.path(), ".chunk").await.unwrap();
        assert_eq!(dotted.len(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_directory_is_skipped_like_a_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("0.chunk"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("nested"), dir.path().join("3.chunk"))
            .unwrap();

        let ordered = resolve_chunks(dir.path(), "chunk").await.unwrap();
        assert_eq!(names(&ordered), vec!["0.chunk"]);
    }

    #[tokio::test]
    async fn empty_directory_yields_no_chunks() {
        let dir = TempDir::new().unwrap();
        let ordered = discover_chunks(dir.path(), "chunk").await.unwrap();
        assert!(ordered.is_empty());
    }

    #[tokio::test]
    async fn missing_directory_is_discovery_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let err = discover_chunks(&missing, "chunk").await.unwrap_err();
        assert_eq!(err.path, missing);
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }
}
