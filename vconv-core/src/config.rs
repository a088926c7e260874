use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const DEFAULT_CHUNK_EXTENSION: &str = "chunk";
pub const DEFAULT_MERGED_FILE: &str = "merged.mp4";
pub const DEFAULT_OUTPUT_DIR: &str = "mpeg-dash";
pub const DEFAULT_MANIFEST: &str = "output.mpd";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ConverterConfig {
    pub chunks: ChunksSection,
    pub transcoder: TranscoderSection,
    pub reporting: ReportingSection,
}

impl ConverterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunks.copy_buffer_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "chunks.copy_buffer_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.chunks.extension.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "chunks.extension",
                reason: "must not be empty".to_string(),
            });
        }
        if self.transcoder.program.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "transcoder.program",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn merged_file(&self, task_dir: &Path) -> PathBuf {
        task_dir.join(&self.chunks.merged_file)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunksSection {
    pub extension: String,
    pub merged_file: String,
    pub copy_buffer_bytes: usize,
}

impl Default for ChunksSection {
    fn default() -> Self {
        Self {
            extension: DEFAULT_CHUNK_EXTENSION.to_string(),
            merged_file: DEFAULT_MERGED_FILE.to_string(),
            copy_buffer_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscoderSection {
    pub program: PathBuf,
    pub format: String,
    pub output_dir: String,
    pub manifest: String,
    pub extra_args: Vec<String>,
}

impl Default for TranscoderSection {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            format: "dash".to_string(),
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            manifest: DEFAULT_MANIFEST.to_string(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportingSection {
    pub failure_log: Option<PathBuf>,
}

pub fn load_converter_config<P: AsRef<Path>>(path: P) -> Result<ConverterConfig> {
    let config: ConverterConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
