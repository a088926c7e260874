use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vconv_core::{
    load_converter_config, resolve_chunks, ChunkMerger, CompositeReporter, ConverterConfig,
    DiscoveryError, ErrorReporter, JsonLinesReporter, MergeError, TaskRun, TracingReporter,
    VideoConverter,
};

pub const DEFAULT_CONFIG_PATH: &str = "configs/converter.toml";

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] vconv_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    Discovery(#[from] DiscoveryError),
    #[error("{0}")]
    Merge(#[from] MergeError),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked upload to MPEG-DASH converter", long_about = None)]
pub struct Cli {
    /// Path to converter.toml (defaults to configs/converter.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process one task: merge chunks, package as MPEG-DASH, remove the merged file
    Handle(HandleArgs),
    /// Show the order in which a directory's chunks would be merged
    Chunks(ChunksArgs),
    /// Merge a directory's chunks without transcoding
    Merge(MergeArgs),
}

#[derive(Args, Debug)]
pub struct HandleArgs {
    /// Task payload, e.g. '{"video_id": 1, "path": "/media/uploads/1"}'.
    /// Read from stdin when neither --payload nor --payload-file is given.
    #[arg(long, conflicts_with = "payload_file")]
    pub payload: Option<String>,
    /// File holding the task payload
    #[arg(long)]
    pub payload_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ChunksArgs {
    /// Directory holding the chunk files
    pub dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Directory holding the chunk files
    pub dir: PathBuf,
    /// Destination file (defaults to the configured merged file inside DIR)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Installs the stderr `fmt` subscriber, honouring `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let context = AppContext::new(config);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match &cli.command {
        Commands::Handle(args) => {
            let payload = read_payload(args)?;
            let summary = runtime.block_on(context.handle(&payload));
            render(&summary, cli.format)?;
        }
        Commands::Chunks(args) => {
            let list = runtime.block_on(context.chunk_list(&args.dir))?;
            render(&list, cli.format)?;
        }
        Commands::Merge(args) => {
            let result = runtime.block_on(context.merge(&args.dir, args.output.as_deref()))?;
            render(&result, cli.format)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ConverterConfig> {
    match path {
        Some(path) => Ok(load_converter_config(path)?),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                Ok(load_converter_config(default_path)?)
            } else {
                debug!("no config file found, using built-in defaults");
                Ok(ConverterConfig::default())
            }
        }
    }
}

/// Blank payloads are passed through so the converter reports them like any
/// other undecodable task.
fn read_payload(args: &HandleArgs) -> Result<Vec<u8>> {
    if let Some(payload) = &args.payload {
        Ok(payload.clone().into_bytes())
    } else if let Some(path) = &args.payload_file {
        Ok(std::fs::read(path)?)
    } else {
        let mut buffer = Vec::new();
        std::io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: ConverterConfig,
    converter: VideoConverter,
}

impl AppContext {
    fn new(config: ConverterConfig) -> Self {
        let mut reporters = CompositeReporter::new().with(Arc::new(TracingReporter));
        if let Some(path) = &config.reporting.failure_log {
            reporters = reporters.with(Arc::new(JsonLinesReporter::new(path.clone())));
        }
        let reporter: Arc<dyn ErrorReporter> = Arc::new(reporters);
        let converter = VideoConverter::new(config.clone()).with_reporter(reporter);
        Self { config, converter }
    }

    async fn handle(&self, payload: &[u8]) -> TaskSummary {
        TaskSummary::from(self.converter.run(payload).await)
    }

    async fn chunk_list(&self, dir: &Path) -> Result<ChunkList> {
        let entries = resolve_chunks(dir, &self.config.chunks.extension).await?;
        let rows = entries
            .into_iter()
            .map(|entry| ChunkRow {
                key: entry.key,
                path: entry.path,
            })
            .collect();
        Ok(ChunkList {
            dir: dir.to_path_buf(),
            rows,
        })
    }

    async fn merge(&self, dir: &Path, output: Option<&Path>) -> Result<MergeResult> {
        let destination = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.merged_file(dir));
        let chunks: Vec<PathBuf> = resolve_chunks(dir, &self.config.chunks.extension)
            .await?
            .into_iter()
            .map(|entry| entry.path)
            .collect();
        let summary = ChunkMerger::new(self.config.chunks.copy_buffer_bytes)
            .merge(&chunks, &destination)
            .await?;
        Ok(MergeResult {
            destination: summary.destination,
            chunks: summary.chunks,
            bytes: summary.bytes,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct TaskSummary {
    pub video_id: Option<i64>,
    pub state: String,
    pub states: Vec<String>,
    pub failed_during: Option<String>,
    pub error: Option<String>,
    pub details: Option<String>,
    pub manifest: Option<PathBuf>,
    pub merged_chunks: Option<usize>,
    pub merged_bytes: Option<u64>,
}

impl From<TaskRun> for TaskSummary {
    fn from(run: TaskRun) -> Self {
        Self {
            video_id: run.video_id,
            state: run.state().to_string(),
            states: run.states.iter().map(ToString::to_string).collect(),
            failed_during: run.failed_during().map(|state| state.to_string()),
            error: run.error.as_ref().map(|err| err.description().to_string()),
            details: run.error.as_ref().map(ToString::to_string),
            manifest: run.manifest,
            merged_chunks: run.merge.as_ref().map(|summary| summary.chunks),
            merged_bytes: run.merge.as_ref().map(|summary| summary.bytes),
        }
    }
}

impl DisplayFallback for TaskSummary {
    fn display(&self) -> String {
        let video = self
            .video_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut lines = vec![format!(
            "video={video} state={state} path={path}",
            state = self.state,
            path = self.states.join(" -> ")
        )];
        if let (Some(chunks), Some(bytes)) = (self.merged_chunks, self.merged_bytes) {
            lines.push(format!("merged {chunks} chunks ({bytes} bytes)"));
        }
        if let Some(manifest) = &self.manifest {
            lines.push(format!("manifest {}", manifest.display()));
        }
        if let (Some(error), Some(details)) = (&self.error, &self.details) {
            lines.push(format!("{error}: {details}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ChunkList {
    pub dir: PathBuf,
    pub rows: Vec<ChunkRow>,
}

#[derive(Debug, Serialize)]
pub struct ChunkRow {
    pub key: i64,
    pub path: PathBuf,
}

impl DisplayFallback for ChunkList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return format!("no chunks in {}", self.dir.display());
        }
        let mut lines = Vec::new();
        for (position, row) in self.rows.iter().enumerate() {
            lines.push(format!(
                "#{position} key={key} {path}",
                key = row.key,
                path = row.path.display()
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct MergeResult {
    pub destination: PathBuf,
    pub chunks: usize,
    pub bytes: u64,
}

impl DisplayFallback for MergeResult {
    fn display(&self) -> String {
        format!(
            "merged {} chunks ({} bytes) into {}",
            self.chunks,
            self.bytes,
            self.destination.display()
        )
    }
}
