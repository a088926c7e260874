pub mod chunks;
pub mod config;
pub mod converter;
pub mod error;
pub mod report;
pub mod task;
pub mod transcode;

pub use chunks::{
    discover_chunks, merge_chunks, order_chunks, resolve_chunks, sequence_key, ChunkEntry,
    ChunkMerger, DiscoveryError, MergeError, MergeSummary, SENTINEL_KEY,
};
pub use config::{load_converter_config, ConverterConfig};
pub use converter::{CleanupError, PipelineError, TaskRun, TaskState, VideoConverter};
pub use error::{ConfigError, Result};
pub use report::{
    CompositeReporter, ErrorReport, ErrorReporter, JsonLinesReporter, MemoryReporter,
    TracingReporter,
};
pub use task::{parse_task, DecodeError, VideoTask};
pub use transcode::{
    CommandExecutor, OutputDirError, SystemCommandExecutor, TranscodeError, TranscodeOutcome,
    Transcoder,
};
