pub mod export;
pub mod generator;
pub mod job;
pub mod prompts;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod system;
pub mod targets;

#[cfg(test)]
pub(crate) mod testing;

pub use export::{DEFAULT_EXPORT_INTERVAL, ExportBatch, ExportConfig, ExportDispatcher, ExportTarget};
pub use generator::RemoteGenerator;
pub use job::{JobEvent, JobRecord, JobState, JobStatus, UNKNOWN_FAILURE};
pub use prompts::PromptSet;
pub use queue::{JobQueue, QueuedJob};
pub use retry::{RetryController, RetryDecision, RetryOutcome, RetryPolicy, RetryRejection};
pub use scheduler::{BatchRun, BatchScheduler, BatchSummary, DEFAULT_CONCURRENCY_LIMIT, SchedulerConfig};
pub use state::{BatchSnapshot, BatchStore, Phase, Progress};
pub use system::{HeadshotConfig, HeadshotSys};
pub use targets::file::FileExportTarget;
